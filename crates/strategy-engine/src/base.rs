use analysis_core::{CandidateSignal, IndicatorKind, MarketState, Timeframe};
use thiserror::Error;

/// Lowest confidence at which any strategy may emit a signal.
pub const MIN_SIGNAL_CONFIDENCE: f64 = 0.5;

#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("Indicator {0} is not a finite number")]
    InvalidIndicator(&'static str),

    #[error("Invalid signal: {0}")]
    InvalidSignal(String),
}

/// A signal-generating strategy.
///
/// `generate_signal` returns `None` for HOLD. Implementations must not
/// panic or surface errors; anything that goes wrong inside is HOLD.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    /// Timeframes this strategy is meant to trade
    fn timeframes(&self) -> &[Timeframe];

    fn required_indicators(&self) -> &[IndicatorKind];

    fn generate_signal(&self, symbol: &str, state: &MarketState) -> Option<CandidateSignal>;

    fn applies_to(&self, timeframe: &str) -> bool {
        Timeframe::from_token(timeframe).is_some_and(|tf| self.timeframes().contains(&tf))
    }
}

/// Structural check every signal passes before it leaves a strategy.
pub fn validate_signal(signal: &CandidateSignal) -> Result<(), StrategyError> {
    if signal.symbol.trim().is_empty() {
        return Err(StrategyError::InvalidSignal("missing symbol".to_string()));
    }
    if signal.strategy.trim().is_empty() {
        return Err(StrategyError::InvalidSignal("missing strategy name".to_string()));
    }
    if !signal.confidence.is_finite() || !(0.0..=1.0).contains(&signal.confidence) {
        return Err(StrategyError::InvalidSignal(format!(
            "confidence {} outside [0, 1]",
            signal.confidence
        )));
    }
    if signal.reasoning.is_empty() {
        return Err(StrategyError::InvalidSignal("no reasoning given".to_string()));
    }
    Ok(())
}

/// Reject non-finite indicator values so they cannot vote.
pub(crate) fn finite(name: &'static str, value: Option<f64>) -> Result<Option<f64>, StrategyError> {
    match value {
        Some(v) if !v.is_finite() => Err(StrategyError::InvalidIndicator(name)),
        other => Ok(other),
    }
}
