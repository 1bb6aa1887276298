use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// OHLCV bar data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

/// Timeframe requested by the caller for analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl Timeframe {
    /// Parse a timeframe token. Accepts terminal-style tokens (`M15`, `H1`)
    /// as well as the native minute/hour tokens (`15m`, `1h`, `15min`).
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim() {
            "M1" | "1m" | "1min" => Some(Timeframe::M1),
            "M5" | "5m" | "5min" => Some(Timeframe::M5),
            "M15" | "15m" | "15min" => Some(Timeframe::M15),
            "M30" | "30m" | "30min" => Some(Timeframe::M30),
            "H1" | "1h" | "1hour" => Some(Timeframe::H1),
            "H4" | "4h" | "4hour" => Some(Timeframe::H4),
            "D1" | "1d" | "daily" => Some(Timeframe::D1),
            _ => None,
        }
    }

    /// Provider granularity for this timeframe. The provider has no 4-hour
    /// bars, so H4 is served from hourly data.
    pub fn interval(&self) -> Interval {
        match self {
            Timeframe::M1 => Interval::Min1,
            Timeframe::M5 => Interval::Min5,
            Timeframe::M15 => Interval::Min15,
            Timeframe::M30 => Interval::Min30,
            Timeframe::H1 | Timeframe::H4 => Interval::Hour1,
            Timeframe::D1 => Interval::Day1,
        }
    }

    pub fn to_minutes(&self) -> i64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1440,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Timeframe::M1 => "M1",
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
            Timeframe::M30 => "M30",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
            Timeframe::D1 => "D1",
        }
    }
}

/// Bar granularity in the price provider's own vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    Min1,
    #[serde(rename = "5m")]
    Min5,
    #[serde(rename = "15m")]
    Min15,
    #[serde(rename = "30m")]
    Min30,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "1d")]
    Day1,
}

impl Interval {
    /// Map any timeframe token to a provider interval; unknown tokens get hourly bars.
    pub fn resolve(token: &str) -> Self {
        Timeframe::from_token(token)
            .map(|tf| tf.interval())
            .unwrap_or(Interval::Hour1)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Min1 => "1m",
            Interval::Min5 => "5m",
            Interval::Min15 => "15m",
            Interval::Min30 => "30m",
            Interval::Hour1 => "1h",
            Interval::Day1 => "1d",
        }
    }

    /// History window to request. Granular data gets a short window to keep
    /// fetches fast and small.
    pub fn lookback(&self) -> chrono::Duration {
        match self {
            Interval::Min1 | Interval::Min5 | Interval::Min15 => chrono::Duration::days(1),
            Interval::Min30 | Interval::Hour1 | Interval::Day1 => chrono::Duration::days(5),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Indicators a strategy may depend on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IndicatorKind {
    Rsi,
    Macd,
    Bollinger,
    Stochastic,
    Ema50,
    Ema200,
}

impl IndicatorKind {
    pub fn name(&self) -> &'static str {
        match self {
            IndicatorKind::Rsi => "RSI",
            IndicatorKind::Macd => "MACD",
            IndicatorKind::Bollinger => "BB",
            IndicatorKind::Stochastic => "STOCH",
            IndicatorKind::Ema50 => "EMA_50",
            IndicatorKind::Ema200 => "EMA_200",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacdValue {
    pub macd: f64,
    pub signal: f64,
    pub hist: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BollingerValue {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StochasticValue {
    pub k: f64,
    pub d: f64,
}

/// Last-bar values of the standard indicator set. Any indicator that could
/// not be computed is `None`; partial snapshots are normal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    #[serde(rename = "RSI", default, skip_serializing_if = "Option::is_none")]
    pub rsi: Option<f64>,
    #[serde(rename = "MACD", default, skip_serializing_if = "Option::is_none")]
    pub macd: Option<MacdValue>,
    #[serde(rename = "BB", default, skip_serializing_if = "Option::is_none")]
    pub bollinger: Option<BollingerValue>,
    #[serde(rename = "STOCH", default, skip_serializing_if = "Option::is_none")]
    pub stochastic: Option<StochasticValue>,
    #[serde(rename = "EMA_50", default, skip_serializing_if = "Option::is_none")]
    pub ema_50: Option<f64>,
    #[serde(rename = "EMA_200", default, skip_serializing_if = "Option::is_none")]
    pub ema_200: Option<f64>,
}

impl IndicatorSnapshot {
    pub fn has(&self, kind: IndicatorKind) -> bool {
        match kind {
            IndicatorKind::Rsi => self.rsi.is_some(),
            IndicatorKind::Macd => self.macd.is_some(),
            IndicatorKind::Bollinger => self.bollinger.is_some(),
            IndicatorKind::Stochastic => self.stochastic.is_some(),
            IndicatorKind::Ema50 => self.ema_50.is_some(),
            IndicatorKind::Ema200 => self.ema_200.is_some(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rsi.is_none()
            && self.macd.is_none()
            && self.bollinger.is_none()
            && self.stochastic.is_none()
            && self.ema_50.is_none()
            && self.ema_200.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Sideways,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub direction: TrendDirection,
    pub strength: f64, // 0.0 to 1.0
}

/// Result of one market analysis call. A state with `error` set is a
/// degraded result, not a failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketState {
    pub symbol: String,
    pub timeframe: String,
    pub timestamp: DateTime<Utc>,
    pub sentiment: Sentiment,
    pub trend: Trend,
    pub volatility: f64,  // 0.0 to 1.0
    pub indicators: IndicatorSnapshot,
    pub confidence: f64, // 0.0 to 1.0
    #[serde(default)]
    pub close_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MarketState {
    /// Neutral state returned whenever analysis could not run.
    pub fn degraded(symbol: &str, timeframe: &str, error: impl Into<String>) -> Self {
        Self {
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            timestamp: Utc::now(),
            sentiment: Sentiment::Neutral,
            trend: Trend {
                direction: TrendDirection::Unknown,
                strength: 0.0,
            },
            volatility: 0.0,
            indicators: IndicatorSnapshot::default(),
            confidence: 0.0,
            close_price: None,
            error: Some(error.into()),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

/// Trade direction of a candidate signal. HOLD is never materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalAction {
    Buy,
    Sell,
}

impl SignalAction {
    /// +1.0 for BUY, -1.0 for SELL
    pub fn sign(&self) -> f64 {
        match self {
            SignalAction::Buy => 1.0,
            SignalAction::Sell => -1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalAction::Buy => "BUY",
            SignalAction::Sell => "SELL",
        }
    }
}

impl fmt::Display for SignalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Indicator values a strategy cites alongside its signal
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalIndicators {
    #[serde(rename = "RSI")]
    pub rsi: Option<f64>,
    #[serde(rename = "Stoch_K")]
    pub stoch_k: Option<f64>,
    #[serde(rename = "BB_Lower")]
    pub bb_lower: Option<f64>,
    #[serde(rename = "BB_Upper")]
    pub bb_upper: Option<f64>,
    #[serde(rename = "Close")]
    pub close: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSignal {
    pub action: SignalAction,
    pub symbol: String,
    pub confidence: f64, // 0.0 to 1.0
    pub reasoning: Vec<String>,
    pub strategy: String,
    pub timeframe: String,
    pub indicators: SignalIndicators,
}

impl CandidateSignal {
    /// One-line rendering, e.g. `Scalping Strategy (M15): RSI oversold (25.0); Price at lower BB`
    pub fn summary(&self) -> String {
        format!(
            "{} ({}): {}",
            self.strategy,
            self.timeframe,
            self.reasoning.join("; ")
        )
    }
}
