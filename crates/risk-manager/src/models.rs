use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Percent of balance risked on a single trade
    #[serde(default = "default_max_risk_per_trade")]
    pub max_risk_per_trade_percent: f64,
    /// Percent cap across every open position
    #[serde(default = "default_max_portfolio_risk")]
    pub max_portfolio_risk_percent: f64,
    /// Approval floor on signal confidence
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
}

fn default_max_risk_per_trade() -> f64 { 1.0 }
fn default_max_portfolio_risk() -> f64 { 5.0 }
fn default_min_confidence() -> f64 { 0.6 }

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_risk_per_trade_percent: default_max_risk_per_trade(),
            max_portfolio_risk_percent: default_max_portfolio_risk(),
            min_confidence: default_min_confidence(),
        }
    }
}

/// Outcome of sizing and gating one candidate trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_score: f64,
    pub recommended_lot_size: f64,
    pub max_risk_per_trade: f64,
    /// Always `None`; resolved against the fill price by the executor
    pub stop_loss: Option<f64>,
    /// Always `None`; resolved against the fill price by the executor
    pub take_profit: Option<f64>,
    pub risk_reward_ratio: Option<f64>,
    pub portfolio_risk: Option<f64>,
    pub reasoning: String,
    pub approved: bool,
}

impl RiskAssessment {
    pub(crate) fn rejected(risk_score: f64, reasoning: impl Into<String>) -> Self {
        Self {
            risk_score,
            recommended_lot_size: 0.0,
            max_risk_per_trade: 0.0,
            stop_loss: None,
            take_profit: None,
            risk_reward_ratio: None,
            portfolio_risk: None,
            reasoning: reasoning.into(),
            approved: false,
        }
    }
}

/// Caller-supplied details of a newly filled position.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewPosition {
    pub risk_contribution: f64,
    pub lot_size: f64,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub symbol: String,
    pub opened_at: DateTime<Utc>,
    #[serde(rename = "risk")]
    pub risk_contribution: f64,
    pub lot_size: f64,
    #[serde(flatten)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioRiskSummary {
    pub total_risk: f64,
    pub max_allowed_risk: f64,
    pub position_count: usize,
    pub risk_percentage: f64,
    pub positions: Vec<String>,
}

#[derive(Error, Debug)]
pub enum RiskError {
    #[error("{field} must be a finite number, got {value}")]
    NonFinite { field: &'static str, value: f64 },

    #[error("{field} {value} is outside [0, 1]")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("Cannot round lot size {0}")]
    Rounding(f64),
}
