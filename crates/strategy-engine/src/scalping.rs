use analysis_core::{
    CandidateSignal, IndicatorKind, MarketState, SignalAction, SignalIndicators, Timeframe,
};
use serde::{Deserialize, Serialize};

use crate::base::{finite, validate_signal, Strategy, StrategyError, MIN_SIGNAL_CONFIDENCE};

const SCALPING_TIMEFRAMES: [Timeframe; 3] = [Timeframe::M5, Timeframe::M15, Timeframe::M30];
const SCALPING_INDICATORS: [IndicatorKind; 3] = [
    IndicatorKind::Rsi,
    IndicatorKind::Stochastic,
    IndicatorKind::Bollinger,
];

/// Thresholds for the scalping vote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalpingConfig {
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub rsi_extreme_oversold: f64,
    pub rsi_extreme_overbought: f64,
    pub stoch_oversold: f64,
    pub stoch_overbought: f64,
    /// Relative distance from a band that still counts as touching it
    pub band_tolerance: f64,
    /// Net votes needed for a direction
    pub min_votes: i32,
    pub rsi_weight: f64,
    pub stoch_weight: f64,
    pub band_weight: f64,
    /// Added when all three indicators agree
    pub unanimity_bonus: f64,
    /// Confidence floor applied by an extreme-RSI override
    pub extreme_rsi_confidence: f64,
}

impl Default for ScalpingConfig {
    fn default() -> Self {
        Self {
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            rsi_extreme_oversold: 20.0,
            rsi_extreme_overbought: 80.0,
            stoch_oversold: 20.0,
            stoch_overbought: 80.0,
            band_tolerance: 0.0005,
            min_votes: 2,
            rsi_weight: 0.3,
            stoch_weight: 0.2,
            band_weight: 0.2,
            unanimity_bonus: 0.2,
            extreme_rsi_confidence: 0.7,
        }
    }
}

/// Short-timeframe mean-reversion strategy.
///
/// RSI, stochastic %K and Bollinger band position each cast a vote for a
/// reversal. Two net votes pick a direction; an extreme RSI reading can
/// force a direction unless the vote already points the other way.
pub struct ScalpingStrategy {
    config: ScalpingConfig,
}

impl ScalpingStrategy {
    pub fn new() -> Self {
        Self::with_config(ScalpingConfig::default())
    }

    pub fn with_config(config: ScalpingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScalpingConfig {
        &self.config
    }

    fn evaluate(&self, symbol: &str, state: &MarketState) -> Result<Option<CandidateSignal>, StrategyError> {
        let cfg = &self.config;
        let indicators = &state.indicators;

        let rsi = finite("RSI", indicators.rsi)?;
        let stoch_k = finite("STOCH", indicators.stochastic.as_ref().map(|s| s.k))?;
        let bb_lower = finite("BB", indicators.bollinger.as_ref().map(|b| b.lower))?;
        let bb_upper = finite("BB", indicators.bollinger.as_ref().map(|b| b.upper))?;
        let close = finite("Close", state.close_price)?;

        let mut votes: i32 = 0;
        let mut confidence = 0.0;
        let mut reasoning = Vec::new();

        if let Some(rsi) = rsi {
            if rsi < cfg.rsi_oversold {
                votes += 1;
                confidence += cfg.rsi_weight;
                reasoning.push(format!("RSI oversold ({:.1})", rsi));
            } else if rsi > cfg.rsi_overbought {
                votes -= 1;
                confidence += cfg.rsi_weight;
                reasoning.push(format!("RSI overbought ({:.1})", rsi));
            }
        }

        if let Some(k) = stoch_k {
            if k < cfg.stoch_oversold {
                votes += 1;
                confidence += cfg.stoch_weight;
                reasoning.push(format!("Stoch oversold (K={:.1})", k));
            } else if k > cfg.stoch_overbought {
                votes -= 1;
                confidence += cfg.stoch_weight;
                reasoning.push(format!("Stoch overbought (K={:.1})", k));
            }
        }

        // Band position needs a usable close
        if let (Some(lower), Some(upper), Some(close)) = (bb_lower, bb_upper, close) {
            if close != 0.0 {
                if lower != 0.0 && close <= lower * (1.0 + cfg.band_tolerance) {
                    votes += 1;
                    confidence += cfg.band_weight;
                    reasoning.push("Price at lower BB".to_string());
                } else if upper != 0.0 && close >= upper * (1.0 - cfg.band_tolerance) {
                    votes -= 1;
                    confidence += cfg.band_weight;
                    reasoning.push("Price at upper BB".to_string());
                }
            }
        }

        let unanimous = votes.abs() == SCALPING_INDICATORS.len() as i32;
        let mut action = if votes >= cfg.min_votes {
            Some(SignalAction::Buy)
        } else if votes <= -cfg.min_votes {
            Some(SignalAction::Sell)
        } else {
            None
        };
        if action.is_some() && unanimous {
            confidence += cfg.unanimity_bonus;
        }

        if let Some(rsi) = rsi {
            if rsi < cfg.rsi_extreme_oversold && action != Some(SignalAction::Sell) {
                action = Some(SignalAction::Buy);
                confidence = f64::max(confidence, cfg.extreme_rsi_confidence);
                reasoning.push("Extreme RSI oversold".to_string());
            } else if rsi > cfg.rsi_extreme_overbought && action != Some(SignalAction::Buy) {
                action = Some(SignalAction::Sell);
                confidence = f64::max(confidence, cfg.extreme_rsi_confidence);
                reasoning.push("Extreme RSI overbought".to_string());
            }
        }

        let Some(action) = action else {
            return Ok(None);
        };
        if confidence < MIN_SIGNAL_CONFIDENCE {
            return Ok(None);
        }

        let signal = CandidateSignal {
            action,
            symbol: symbol.to_string(),
            confidence: confidence.min(1.0),
            reasoning,
            strategy: self.name().to_string(),
            timeframe: state.timeframe.clone(),
            indicators: SignalIndicators {
                rsi,
                stoch_k,
                bb_lower,
                bb_upper,
                close,
            },
        };

        if let Err(e) = validate_signal(&signal) {
            tracing::debug!("Discarding scalping signal for {}: {}", symbol, e);
            return Ok(None);
        }

        Ok(Some(signal))
    }
}

impl Default for ScalpingStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for ScalpingStrategy {
    fn name(&self) -> &str {
        "Scalping Strategy"
    }

    fn timeframes(&self) -> &[Timeframe] {
        &SCALPING_TIMEFRAMES
    }

    fn required_indicators(&self) -> &[IndicatorKind] {
        &SCALPING_INDICATORS
    }

    fn generate_signal(&self, symbol: &str, state: &MarketState) -> Option<CandidateSignal> {
        if !self.applies_to(&state.timeframe) {
            return None;
        }

        match self.evaluate(symbol, state) {
            Ok(signal) => signal,
            Err(e) => {
                tracing::error!("Error generating scalping signal for {}: {}", symbol, e);
                None
            }
        }
    }
}
