use std::collections::BTreeMap;

use analysis_core::SignalAction;
use chrono::Utc;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use tokio::sync::Mutex;

use crate::correlation::{CorrelationModel, NoCorrelation};
use crate::models::*;

pub const MIN_LOT: f64 = 0.01;
pub const MAX_LOT: f64 = 10.0;
/// Scores above this are rejected outright
pub const MAX_ACCEPTABLE_RISK_SCORE: f64 = 0.7;

const TRACKED_SYMBOL_PENALTY: f64 = 0.2;
const CORRELATION_WEIGHT: f64 = 0.2;

/// Round a lot size to 2 decimals, halves away from zero.
pub fn round_lot(lot: f64) -> Result<f64, RiskError> {
    Decimal::from_f64(lot)
        .map(|d| d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|d| d.to_f64())
        .ok_or(RiskError::Rounding(lot))
}

/// Lot size before any portfolio-cap scaling.
///
/// With a balance the base lot is `balance * pct / 100 / 1000` clamped to
/// [0.01, 10]; this is a pip-value-free proxy, not a true risk-per-pip
/// calculation. Without a balance the base is the minimum lot. The base is
/// scaled by confidence and by `1 - risk_score / 2`, rounded, and floored.
pub fn size_position(
    account_balance: Option<f64>,
    max_risk_per_trade_percent: f64,
    confidence: f64,
    risk_score: f64,
) -> Result<f64, RiskError> {
    let base = match account_balance {
        Some(balance) => (balance * max_risk_per_trade_percent / 100.0 / 1000.0).clamp(MIN_LOT, MAX_LOT),
        None => MIN_LOT,
    };

    let lot = base * confidence * (1.0 - risk_score * 0.5);
    Ok(round_lot(lot)?.max(MIN_LOT))
}

pub fn risk_reward_ratio(confidence: f64) -> f64 {
    if confidence > 0.8 {
        3.0
    } else if confidence > 0.6 {
        2.5
    } else {
        2.0
    }
}

fn ensure_finite(field: &'static str, value: f64) -> Result<f64, RiskError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(RiskError::NonFinite { field, value })
    }
}

/// Portfolio risk registry and trade gate.
///
/// All position bookkeeping lives behind one lock. `assess_risk`,
/// `add_position` and `remove_position` each hold it for their whole
/// read-then-write, so concurrent callers never see a half-updated
/// aggregate.
pub struct RiskManager {
    config: RiskConfig,
    positions: Mutex<BTreeMap<String, PositionRecord>>,
    correlation: Box<dyn CorrelationModel>,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            config,
            positions: Mutex::new(BTreeMap::new()),
            correlation: Box::new(NoCorrelation),
        }
    }

    pub fn with_correlation_model(mut self, model: Box<dyn CorrelationModel>) -> Self {
        self.correlation = model;
        self
    }

    pub fn risk_config(&self) -> &RiskConfig {
        &self.config
    }

    /// Score, size and gate one candidate trade. Never fails; internal
    /// errors come back as a rejected assessment with a score of 1.0.
    pub async fn assess_risk(
        &self,
        symbol: &str,
        action: SignalAction,
        confidence: f64,
        account_balance: Option<f64>,
    ) -> RiskAssessment {
        let positions = self.positions.lock().await;

        match self.try_assess(&positions, symbol, confidence, account_balance) {
            Ok(assessment) => {
                tracing::debug!(
                    symbol = symbol,
                    action = %action,
                    risk_score = assessment.risk_score,
                    lot_size = assessment.recommended_lot_size,
                    approved = assessment.approved,
                    "Risk assessed"
                );
                assessment
            }
            Err(e) => {
                tracing::error!("Error in risk assessment for {}: {}", symbol, e);
                RiskAssessment::rejected(1.0, format!("Risk assessment error: {}", e))
            }
        }
    }

    fn try_assess(
        &self,
        positions: &BTreeMap<String, PositionRecord>,
        symbol: &str,
        confidence: f64,
        account_balance: Option<f64>,
    ) -> Result<RiskAssessment, RiskError> {
        let confidence = ensure_finite("confidence", confidence)?;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(RiskError::OutOfRange { field: "confidence", value: confidence });
        }
        let account_balance = account_balance
            .map(|b| ensure_finite("account_balance", b))
            .transpose()?;

        let open: Vec<&PositionRecord> = positions.values().collect();
        let correlation = ensure_finite(
            "correlation_risk",
            self.correlation.correlation_risk(symbol, &open),
        )?;

        let mut risk_score = 0.5 + (1.0 - confidence) * 0.3;
        if positions.contains_key(symbol) {
            risk_score += TRACKED_SYMBOL_PENALTY;
        }
        risk_score += correlation * CORRELATION_WEIGHT;
        let risk_score = risk_score.clamp(0.0, 1.0);

        if risk_score > MAX_ACCEPTABLE_RISK_SCORE {
            return Ok(RiskAssessment::rejected(
                risk_score,
                "Risk too high - trade not recommended",
            ));
        }

        let max_risk_per_trade = self.config.max_risk_per_trade_percent;
        let max_portfolio_risk = self.config.max_portfolio_risk_percent;

        let mut lot_size = size_position(account_balance, max_risk_per_trade, confidence, risk_score)?;
        let ratio = risk_reward_ratio(confidence);

        // New trade counts as a flat max_risk_per_trade, whatever its lot size
        let portfolio_risk =
            positions.values().map(|p| p.risk_contribution).sum::<f64>() + max_risk_per_trade;

        if portfolio_risk > max_portfolio_risk {
            lot_size = round_lot(lot_size * max_portfolio_risk / portfolio_risk)?.max(MIN_LOT);
            tracing::warn!(
                "Adjusted lot size for {} to {:.2} due to portfolio risk limit ({:.2}% > {:.2}%)",
                symbol,
                lot_size,
                portfolio_risk,
                max_portfolio_risk
            );
        }

        let approved =
            risk_score <= MAX_ACCEPTABLE_RISK_SCORE && confidence >= self.config.min_confidence;

        Ok(RiskAssessment {
            risk_score,
            recommended_lot_size: lot_size,
            max_risk_per_trade,
            stop_loss: None,
            take_profit: None,
            risk_reward_ratio: Some(ratio),
            portfolio_risk: Some(portfolio_risk),
            reasoning: format!(
                "Risk assessment: score={:.2}, confidence={:.2}, R:R={:.1}",
                risk_score, confidence, ratio
            ),
            approved,
        })
    }

    /// Track a filled position. Replaces any record already held for `symbol`.
    pub async fn add_position(&self, symbol: &str, position: NewPosition) {
        let record = PositionRecord {
            symbol: symbol.to_string(),
            opened_at: Utc::now(),
            risk_contribution: position.risk_contribution,
            lot_size: position.lot_size,
            metadata: position.metadata,
        };

        let mut positions = self.positions.lock().await;
        if positions.insert(symbol.to_string(), record).is_some() {
            tracing::debug!("Replaced tracked position for {}", symbol);
        }
    }

    /// Stop tracking `symbol`. Returns whether a record was removed.
    pub async fn remove_position(&self, symbol: &str) -> bool {
        self.positions.lock().await.remove(symbol).is_some()
    }

    pub async fn position(&self, symbol: &str) -> Option<PositionRecord> {
        self.positions.lock().await.get(symbol).cloned()
    }

    pub async fn tracked_symbols(&self) -> Vec<String> {
        self.positions.lock().await.keys().cloned().collect()
    }

    pub async fn get_portfolio_risk(&self) -> PortfolioRiskSummary {
        let positions = self.positions.lock().await;

        let total_risk: f64 = positions.values().map(|p| p.risk_contribution).sum();
        let max_allowed_risk = self.config.max_portfolio_risk_percent;
        let risk_percentage = if max_allowed_risk > 0.0 {
            total_risk / max_allowed_risk * 100.0
        } else {
            0.0
        };

        PortfolioRiskSummary {
            total_risk,
            max_allowed_risk,
            position_count: positions.len(),
            risk_percentage,
            positions: positions.keys().cloned().collect(),
        }
    }
}

impl Default for RiskManager {
    fn default() -> Self {
        Self::new(RiskConfig::default())
    }
}
