use std::sync::Arc;
use std::time::Duration;

use analysis_core::{
    AnalysisError, Bar, BarProvider, IndicatorSnapshot, Interval, MarketState, Sentiment, Trend,
    TrendDirection,
};
use chrono::Utc;

use crate::snapshot::indicator_snapshot;

pub const NO_MARKET_DATA: &str = "No market data available";

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Derives sentiment, trend, volatility and confidence for a symbol from
/// its indicator snapshot.
///
/// `analyze` never fails: a missing provider, an empty series, a provider
/// error or a timeout all come back as a degraded [`MarketState`].
pub struct MarketAnalyzer {
    provider: Option<Arc<dyn BarProvider>>,
    fetch_timeout: Duration,
}

impl MarketAnalyzer {
    pub fn new(provider: Arc<dyn BarProvider>) -> Self {
        Self {
            provider: Some(provider),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Analyzer with no data source; every analysis is degraded.
    pub fn without_provider() -> Self {
        Self {
            provider: None,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    pub async fn analyze(&self, symbol: &str, timeframe: &str) -> MarketState {
        let interval = Interval::resolve(timeframe);

        let bars = match self.fetch_bars(symbol, interval).await {
            Ok(bars) if !bars.is_empty() => bars,
            Ok(_) => {
                tracing::warn!("No market data available for {} ({})", symbol, interval);
                return MarketState::degraded(symbol, timeframe, NO_MARKET_DATA);
            }
            Err(e) => {
                tracing::warn!("Market data unavailable for {} ({}): {}", symbol, interval, e);
                return MarketState::degraded(symbol, timeframe, NO_MARKET_DATA);
            }
        };

        match analyze_bars(symbol, timeframe, &bars) {
            Ok(state) => state,
            Err(e) => {
                tracing::error!("Error in market analysis for {}: {}", symbol, e);
                MarketState::degraded(symbol, timeframe, e.to_string())
            }
        }
    }

    async fn fetch_bars(&self, symbol: &str, interval: Interval) -> Result<Vec<Bar>, AnalysisError> {
        let provider = self.provider.as_ref().ok_or(AnalysisError::NoData)?;

        match tokio::time::timeout(
            self.fetch_timeout,
            provider.fetch(symbol, interval, interval.lookback()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(AnalysisError::Timeout(self.fetch_timeout)),
        }
    }
}

/// Full analysis of an already-fetched bar series.
pub fn analyze_bars(symbol: &str, timeframe: &str, bars: &[Bar]) -> Result<MarketState, AnalysisError> {
    let last = bars.last().ok_or(AnalysisError::NoData)?;
    if !last.close.is_finite() {
        return Err(AnalysisError::InvalidData(format!(
            "last close for {} is not a number",
            symbol
        )));
    }

    let indicators = indicator_snapshot(bars);
    Ok(analyze_snapshot(symbol, timeframe, indicators, Some(last.close)))
}

/// Build a market state from a precomputed snapshot.
pub fn analyze_snapshot(
    symbol: &str,
    timeframe: &str,
    indicators: IndicatorSnapshot,
    close_price: Option<f64>,
) -> MarketState {
    let sentiment = analyze_sentiment(&indicators);
    let trend = analyze_trend(&indicators);
    let volatility = analyze_volatility(&indicators);
    let confidence = calculate_confidence(sentiment, &trend, &indicators);

    MarketState {
        symbol: symbol.to_string(),
        timeframe: timeframe.to_string(),
        timestamp: Utc::now(),
        sentiment,
        trend,
        volatility,
        indicators,
        confidence,
        close_price,
        error: None,
    }
}

/// Additive vote over RSI, MACD histogram and the EMA-50/200 cross.
/// Absent indicators do not vote.
pub fn analyze_sentiment(indicators: &IndicatorSnapshot) -> Sentiment {
    let mut score = 0i32;

    if let Some(rsi) = indicators.rsi {
        score += if rsi > 50.0 { 1 } else { -1 };
    }

    if let Some(macd) = &indicators.macd {
        score += if macd.hist > 0.0 { 1 } else { -1 };
    }

    if let (Some(ema_50), Some(ema_200)) = (indicators.ema_50, indicators.ema_200) {
        score += if ema_50 > ema_200 { 1 } else { -1 };
    }

    match score {
        s if s > 0 => Sentiment::Bullish,
        s if s < 0 => Sentiment::Bearish,
        _ => Sentiment::Neutral,
    }
}

pub fn analyze_trend(indicators: &IndicatorSnapshot) -> Trend {
    match (indicators.ema_50, indicators.ema_200) {
        (Some(ema_50), Some(ema_200)) => Trend {
            direction: if ema_50 > ema_200 {
                TrendDirection::Up
            } else {
                TrendDirection::Down
            },
            strength: 0.7,
        },
        _ => Trend {
            direction: TrendDirection::Sideways,
            strength: 0.5,
        },
    }
}

/// Bollinger bandwidth scaled into [0, 1]; 0.5 when bands are unavailable.
pub fn analyze_volatility(indicators: &IndicatorSnapshot) -> f64 {
    if let Some(bb) = &indicators.bollinger {
        if bb.middle > 0.0 {
            let bandwidth = (bb.upper - bb.lower) / bb.middle;
            if bandwidth.is_finite() {
                return (bandwidth * 10.0).clamp(0.0, 1.0);
            }
        }
    }
    0.5
}

pub fn calculate_confidence(sentiment: Sentiment, trend: &Trend, indicators: &IndicatorSnapshot) -> f64 {
    let mut confidence = 0.5;

    // Trend agreement
    let agrees = matches!(
        (sentiment, trend.direction),
        (Sentiment::Bullish, TrendDirection::Up) | (Sentiment::Bearish, TrendDirection::Down)
    );
    if agrees {
        confidence += 0.2;
    }

    // RSI in a moderate band consistent with the sentiment
    if let Some(rsi) = indicators.rsi {
        let confirms = match sentiment {
            Sentiment::Bullish => rsi > 40.0 && rsi < 70.0,
            Sentiment::Bearish => rsi > 30.0 && rsi < 60.0,
            Sentiment::Neutral => false,
        };
        if confirms {
            confidence += 0.1;
        }
    }

    f64::clamp(confidence, 0.0, 1.0)
}
