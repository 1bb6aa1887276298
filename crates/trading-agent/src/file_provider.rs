use std::path::PathBuf;

use analysis_core::{AnalysisError, Bar, BarProvider, Interval};
use async_trait::async_trait;

/// Reads bars from `<dir>/<SYMBOL>_<interval>.json`, one JSON array per file.
pub struct FileBarProvider {
    dir: PathBuf,
}

impl FileBarProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, symbol: &str, interval: Interval) -> PathBuf {
        self.dir.join(format!("{}_{}.json", symbol, interval.as_str()))
    }
}

#[async_trait]
impl BarProvider for FileBarProvider {
    async fn fetch(
        &self,
        symbol: &str,
        interval: Interval,
        lookback: chrono::Duration,
    ) -> Result<Vec<Bar>, AnalysisError> {
        let path = self.path_for(symbol, interval);

        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No bar file at {}", path.display());
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(AnalysisError::ProviderError(format!(
                    "reading {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let mut bars: Vec<Bar> = serde_json::from_slice(&raw).map_err(|e| {
            AnalysisError::InvalidData(format!("parsing {}: {}", path.display(), e))
        })?;
        bars.sort_by_key(|b| b.timestamp);

        if let Some(newest) = bars.last().map(|b| b.timestamp) {
            let cutoff = newest - lookback;
            bars.retain(|b| b.timestamp >= cutoff);
        }

        Ok(bars)
    }

    fn name(&self) -> &str {
        "file"
    }
}
