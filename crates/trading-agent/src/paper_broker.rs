use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use analysis_core::SignalAction;
use async_trait::async_trait;
use broker_trait::{
    ClosedPosition, ExecutionClient, ExecutionError, ExecutionReport, ExecutionStatus,
    ExitLevels, TradeInstruction,
};
use chrono::Utc;
use tokio::sync::Mutex;

struct PaperPosition {
    order_id: String,
    action: SignalAction,
    exits: ExitLevels,
}

impl PaperPosition {
    /// Exit reason if `price` touches the stop or the target
    fn exit_hit(&self, price: f64) -> Option<&'static str> {
        match self.action {
            SignalAction::Buy if price <= self.exits.stop_loss => Some("stop loss"),
            SignalAction::Buy if price >= self.exits.take_profit => Some("take profit"),
            SignalAction::Sell if price >= self.exits.stop_loss => Some("stop loss"),
            SignalAction::Sell if price <= self.exits.take_profit => Some("take profit"),
            _ => None,
        }
    }
}

/// Simulated venue: fills instantly at the reference price and closes
/// positions when a marked price crosses their exits.
pub struct PaperBroker {
    stop_distance_percent: f64,
    next_order: AtomicU64,
    open: Mutex<BTreeMap<String, PaperPosition>>,
    closed: Mutex<Vec<ClosedPosition>>,
}

impl PaperBroker {
    pub fn new(stop_distance_percent: f64) -> Self {
        Self {
            stop_distance_percent,
            next_order: AtomicU64::new(1),
            open: Mutex::new(BTreeMap::new()),
            closed: Mutex::new(Vec::new()),
        }
    }

    pub async fn open_symbols(&self) -> Vec<String> {
        self.open.lock().await.keys().cloned().collect()
    }

    fn rejected(instruction: &TradeInstruction, message: impl Into<String>) -> ExecutionReport {
        ExecutionReport {
            order_id: String::new(),
            symbol: instruction.symbol.clone(),
            status: ExecutionStatus::Rejected,
            filled_lot_size: 0.0,
            entry_price: None,
            exit_levels: None,
            message: message.into(),
        }
    }
}

#[async_trait]
impl ExecutionClient for PaperBroker {
    async fn submit(&self, instruction: &TradeInstruction) -> Result<ExecutionReport, ExecutionError> {
        instruction.validate()?;

        let Some(entry) = instruction.reference_price else {
            return Ok(Self::rejected(instruction, "no reference price to fill at"));
        };

        let mut open = self.open.lock().await;
        if open.contains_key(&instruction.symbol) {
            return Ok(Self::rejected(instruction, "position already open"));
        }

        let stop_distance = entry * self.stop_distance_percent / 100.0;
        let exits = ExitLevels::resolve(
            instruction.action,
            entry,
            stop_distance,
            instruction.risk_reward_ratio,
        )?;

        let order_id = format!("PAPER-{}", self.next_order.fetch_add(1, Ordering::SeqCst));
        open.insert(
            instruction.symbol.clone(),
            PaperPosition {
                order_id: order_id.clone(),
                action: instruction.action,
                exits,
            },
        );

        tracing::info!(
            "Paper {} {} {:.2} lots @ {:.5} (SL {:.5}, TP {:.5})",
            instruction.action,
            instruction.symbol,
            instruction.lot_size,
            entry,
            exits.stop_loss,
            exits.take_profit
        );

        Ok(ExecutionReport {
            order_id,
            symbol: instruction.symbol.clone(),
            status: ExecutionStatus::Filled,
            filled_lot_size: instruction.lot_size,
            entry_price: Some(entry),
            exit_levels: Some(exits),
            message: "filled".to_string(),
        })
    }

    async fn drain_closed(&self) -> Result<Vec<ClosedPosition>, ExecutionError> {
        Ok(std::mem::take(&mut *self.closed.lock().await))
    }

    async fn mark_price(&self, symbol: &str, price: f64) {
        if !price.is_finite() {
            return;
        }

        let mut open = self.open.lock().await;
        let Some(reason) = open.get(symbol).and_then(|p| p.exit_hit(price)) else {
            return;
        };

        if let Some(position) = open.remove(symbol) {
            tracing::info!("Paper {} closed by {} @ {:.5}", symbol, reason, price);
            self.closed.lock().await.push(ClosedPosition {
                symbol: symbol.to_string(),
                order_id: position.order_id,
                closed_at: Utc::now(),
                exit_price: Some(price),
                reason: reason.to_string(),
            });
        }
    }

    fn is_paper(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "paper"
    }
}
