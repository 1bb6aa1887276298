use std::time::Duration;

use analysis_core::SignalAction;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Instruction and report types (venue-agnostic)
// ---------------------------------------------------------------------------

/// An approved, sized trade handed to the execution venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeInstruction {
    pub symbol: String,
    pub action: SignalAction,
    pub lot_size: f64,
    /// Take-profit distance as a multiple of the stop distance
    pub risk_reward_ratio: f64,
    pub confidence: f64,
    pub strategy: String,
    /// Last analysed close, if known
    pub reference_price: Option<f64>,
}

impl TradeInstruction {
    pub fn validate(&self) -> Result<(), ExecutionError> {
        if self.symbol.trim().is_empty() {
            return Err(ExecutionError::InvalidInstruction("missing symbol".to_string()));
        }
        if !self.lot_size.is_finite() || self.lot_size <= 0.0 {
            return Err(ExecutionError::InvalidInstruction(format!(
                "lot size must be positive, got {}",
                self.lot_size
            )));
        }
        if !self.risk_reward_ratio.is_finite() || self.risk_reward_ratio <= 0.0 {
            return Err(ExecutionError::InvalidInstruction(format!(
                "risk/reward ratio must be positive, got {}",
                self.risk_reward_ratio
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Filled,
    Rejected,
}

/// Absolute stop-loss and take-profit prices for a filled position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExitLevels {
    pub stop_loss: f64,
    pub take_profit: f64,
}

impl ExitLevels {
    /// Resolve exits from the fill price.
    ///
    /// BUY: SL = entry - distance, TP = entry + distance * ratio.
    /// SELL mirrors both around the entry.
    pub fn resolve(
        action: SignalAction,
        entry_price: f64,
        stop_distance: f64,
        risk_reward_ratio: f64,
    ) -> Result<Self, ExecutionError> {
        for (name, value) in [
            ("entry price", entry_price),
            ("stop distance", stop_distance),
            ("risk/reward ratio", risk_reward_ratio),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ExecutionError::InvalidExitLevels(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }

        let sign = action.sign();
        Ok(Self {
            stop_loss: entry_price - sign * stop_distance,
            take_profit: entry_price + sign * stop_distance * risk_reward_ratio,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub order_id: String,
    pub symbol: String,
    pub status: ExecutionStatus,
    pub filled_lot_size: f64,
    pub entry_price: Option<f64>,
    pub exit_levels: Option<ExitLevels>,
    pub message: String,
}

impl ExecutionReport {
    pub fn is_filled(&self) -> bool {
        self.status == ExecutionStatus::Filled
    }
}

/// A previously filled position the venue has since closed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedPosition {
    pub symbol: String,
    pub order_id: String,
    pub closed_at: DateTime<Utc>,
    pub exit_price: Option<f64>,
    pub reason: String,
}

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Invalid instruction: {0}")]
    InvalidInstruction(String),

    #[error("Invalid exit levels: {0}")]
    InvalidExitLevels(String),

    #[error("Execution venue unavailable: {0}")]
    Unavailable(String),

    #[error("Execution timed out after {0:?}")]
    Timeout(Duration),
}

// ---------------------------------------------------------------------------
// Execution trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ExecutionClient: Send + Sync {
    /// Send one instruction and wait for the venue's verdict
    async fn submit(&self, instruction: &TradeInstruction) -> Result<ExecutionReport, ExecutionError>;

    /// Positions closed since the previous call
    async fn drain_closed(&self) -> Result<Vec<ClosedPosition>, ExecutionError>;

    /// Latest analysed price for a symbol. Venues that track their own
    /// prices ignore it.
    async fn mark_price(&self, _symbol: &str, _price: f64) {}

    /// Whether this is a paper/simulated venue
    fn is_paper(&self) -> bool;

    /// Venue name for logging
    fn name(&self) -> &str;
}
