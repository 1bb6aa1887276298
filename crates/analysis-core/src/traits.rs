use async_trait::async_trait;

use crate::{AnalysisError, Bar, Interval};

/// Source of price history for the market analyzer.
///
/// Implementations return bars oldest-first. An empty series is a valid
/// answer and means "nothing available right now".
#[async_trait]
pub trait BarProvider: Send + Sync {
    async fn fetch(
        &self,
        symbol: &str,
        interval: Interval,
        lookback: chrono::Duration,
    ) -> Result<Vec<Bar>, AnalysisError>;

    /// Provider name for logging
    fn name(&self) -> &str {
        "bar-provider"
    }
}
