use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use analysis_core::MarketState;
use broker_trait::{ExecutionClient, TradeInstruction};
use futures_util::future::join_all;
use resource_monitor::ResourceMonitor;
use risk_manager::{NewPosition, RiskManager};
use strategy_engine::StrategyEngine;
use technical_analysis::MarketAnalyzer;
use tokio::sync::{watch, Semaphore};

use crate::config::{AgentConfig, SymbolOrder};
use crate::metrics::SweepMetrics;

/// What happened to one symbol during a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolOutcome {
    Degraded,
    Hold,
    RiskRejected,
    Filled,
    NotFilled,
    ExecutionFailed,
}

/// Drives analysis, strategy, risk and execution across every configured
/// symbol, then rests for the resource monitor's adaptive interval.
///
/// Only the sweep loop writes to the risk registry, one symbol at a time.
pub struct Orchestrator {
    config: AgentConfig,
    analyzer: Arc<MarketAnalyzer>,
    strategies: StrategyEngine,
    risk: Arc<RiskManager>,
    monitor: ResourceMonitor,
    executor: Arc<dyn ExecutionClient>,
    metrics: SweepMetrics,
}

impl Orchestrator {
    pub fn new(
        config: AgentConfig,
        analyzer: Arc<MarketAnalyzer>,
        strategies: StrategyEngine,
        risk: Arc<RiskManager>,
        monitor: ResourceMonitor,
        executor: Arc<dyn ExecutionClient>,
    ) -> Self {
        let metrics = SweepMetrics::new(config.metrics_log_interval_sweeps);
        Self {
            config,
            analyzer,
            strategies,
            risk,
            monitor,
            executor,
            metrics,
        }
    }

    pub fn metrics(&self) -> &SweepMetrics {
        &self.metrics
    }

    /// Sweep until `shutdown` flips to true, the sender goes away, or
    /// `max_sweeps` is reached.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            "Sweeping {} symbols on {} via {} ({} order)",
            self.config.symbols.len(),
            self.config.timeframe,
            self.executor.name(),
            match self.config.symbol_order {
                SymbolOrder::Fixed => "fixed",
                SymbolOrder::RoundRobin => "round-robin",
            }
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.run_sweep(&shutdown).await;

            if self.config.max_sweeps > 0 && self.metrics.sweeps_run >= self.config.max_sweeps {
                tracing::info!("Reached {} sweeps, stopping", self.config.max_sweeps);
                break;
            }
            if *shutdown.borrow() {
                break;
            }

            let status = self.monitor.check_resources();
            let sleep = self.monitor.get_adaptive_sleep();
            tracing::debug!(
                cpu = status.cpu_percent,
                memory = status.memory_percent,
                level = %status.level,
                "Sleeping {}s before next sweep",
                sleep.as_secs()
            );

            tokio::select! {
                _ = tokio::time::sleep(sleep) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        tracing::warn!("Shutdown channel closed, stopping");
                        break;
                    }
                }
            }
        }

        tracing::info!("Sweep loop stopped");
        self.metrics.log_metrics();
        self.monitor.log_summary();
    }

    /// Visit every symbol once. Stops early if shutdown is requested.
    pub async fn run_sweep(&mut self, shutdown: &watch::Receiver<bool>) -> BTreeMap<String, SymbolOutcome> {
        let sweep_start = Instant::now();
        let mut outcomes = BTreeMap::new();

        self.reconcile_closed().await;

        let order = self.sweep_order();
        let mut prefetched = if self.config.analysis_concurrency > 1 {
            self.prefetch(&order, shutdown).await
        } else {
            HashMap::new()
        };

        for symbol in order {
            if *shutdown.borrow() {
                tracing::info!("Shutdown requested, ending sweep before {}", symbol);
                break;
            }

            let state = match prefetched.remove(&symbol) {
                Some(state) => state,
                None => self.analyzer.analyze(&symbol, &self.config.timeframe).await,
            };

            let outcome = self.process_symbol(&symbol, state).await;
            outcomes.insert(symbol, outcome);
        }

        self.metrics.finish_sweep(sweep_start);
        outcomes
    }

    /// Symbols in the order this sweep should visit them
    pub fn sweep_order(&self) -> Vec<String> {
        let mut order = self.config.symbols.clone();
        if self.config.symbol_order == SymbolOrder::RoundRobin && !order.is_empty() {
            let shift = (self.metrics.sweeps_run % order.len() as u64) as usize;
            order.rotate_left(shift);
        }
        order
    }

    /// Analyse `symbols` concurrently. Analyses still queued or in flight
    /// when the stop flag is raised are dropped.
    async fn prefetch(
        &self,
        symbols: &[String],
        shutdown: &watch::Receiver<bool>,
    ) -> HashMap<String, MarketState> {
        let semaphore = Arc::new(Semaphore::new(self.config.analysis_concurrency));
        let timeframe = self.config.timeframe.as_str();

        let tasks = symbols.iter().map(|symbol| {
            let semaphore = Arc::clone(&semaphore);
            let analyzer = Arc::clone(&self.analyzer);
            let mut shutdown = shutdown.clone();
            async move {
                // The semaphore is never closed
                let _permit = semaphore.acquire().await.ok();
                if *shutdown.borrow() {
                    return None;
                }

                tokio::select! {
                    state = analyzer.analyze(symbol, timeframe) => Some((symbol.clone(), state)),
                    _ = stop_requested(&mut shutdown) => {
                        tracing::debug!("Dropping in-flight analysis of {}", symbol);
                        None
                    }
                }
            }
        });

        join_all(tasks).await.into_iter().flatten().collect()
    }

    /// Forget positions the venue reports as closed.
    async fn reconcile_closed(&mut self) {
        let drained = tokio::time::timeout(self.config.execution_timeout(), self.executor.drain_closed()).await;

        let closed = match drained {
            Ok(Ok(closed)) => closed,
            Ok(Err(e)) => {
                tracing::error!("Failed to fetch closed positions from {}: {}", self.executor.name(), e);
                return;
            }
            Err(_) => {
                tracing::error!(
                    "Timed out fetching closed positions from {} after {:?}",
                    self.executor.name(),
                    self.config.execution_timeout()
                );
                return;
            }
        };

        for position in closed {
            if self.risk.remove_position(&position.symbol).await {
                self.metrics.positions_closed += 1;
                tracing::info!(
                    "Position {} closed ({}), order {}",
                    position.symbol,
                    position.reason,
                    position.order_id
                );
            } else {
                tracing::debug!("Close for untracked symbol {}", position.symbol);
            }
        }
    }

    pub async fn process_symbol(&mut self, symbol: &str, state: MarketState) -> SymbolOutcome {
        self.metrics.symbols_analysed += 1;

        if state.is_degraded() {
            self.metrics.degraded_analyses += 1;
            tracing::debug!(
                "Skipping {}: {}",
                symbol,
                state.error.as_deref().unwrap_or("degraded analysis")
            );
            return SymbolOutcome::Degraded;
        }

        if let Some(close) = state.close_price {
            let timeout = self.config.execution_timeout();
            if tokio::time::timeout(timeout, self.executor.mark_price(symbol, close))
                .await
                .is_err()
            {
                tracing::warn!(
                    "Marking {} on {} timed out after {:?}",
                    symbol,
                    self.executor.name(),
                    timeout
                );
            }
        }

        let Some(signal) = self.strategies.generate_signal(symbol, &state) else {
            return SymbolOutcome::Hold;
        };
        self.metrics.signals_generated += 1;
        tracing::info!(
            "{} {} signal ({:.0}% confidence): {}",
            symbol,
            signal.action,
            signal.confidence * 100.0,
            signal.summary()
        );

        let assessment = self
            .risk
            .assess_risk(symbol, signal.action, signal.confidence, self.config.account_balance)
            .await;

        let ratio = match (assessment.approved, assessment.risk_reward_ratio) {
            (true, Some(ratio)) => ratio,
            _ => {
                self.metrics.risk_rejections += 1;
                tracing::info!("{} rejected by risk: {}", symbol, assessment.reasoning);
                return SymbolOutcome::RiskRejected;
            }
        };

        let instruction = TradeInstruction {
            symbol: symbol.to_string(),
            action: signal.action,
            lot_size: assessment.recommended_lot_size,
            risk_reward_ratio: ratio,
            confidence: signal.confidence,
            strategy: signal.strategy.clone(),
            reference_price: state.close_price,
        };

        self.metrics.instructions_sent += 1;
        let timeout = self.config.execution_timeout();
        let report = match tokio::time::timeout(timeout, self.executor.submit(&instruction)).await {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                self.metrics.execution_failures += 1;
                tracing::error!("Execution failed for {}: {}", symbol, e);
                return SymbolOutcome::ExecutionFailed;
            }
            Err(_) => {
                self.metrics.execution_failures += 1;
                tracing::error!("Execution for {} timed out after {:?}", symbol, timeout);
                return SymbolOutcome::ExecutionFailed;
            }
        };

        if !report.is_filled() {
            tracing::warn!("{} not filled: {}", symbol, report.message);
            return SymbolOutcome::NotFilled;
        }

        self.metrics.fills += 1;

        let mut metadata = BTreeMap::new();
        metadata.insert("order_id".to_string(), serde_json::json!(report.order_id));
        metadata.insert("strategy".to_string(), serde_json::json!(signal.strategy));
        metadata.insert("action".to_string(), serde_json::json!(signal.action));
        if let Some(entry) = report.entry_price {
            metadata.insert("entry_price".to_string(), serde_json::json!(entry));
        }
        if let Some(exits) = report.exit_levels {
            metadata.insert("stop_loss".to_string(), serde_json::json!(exits.stop_loss));
            metadata.insert("take_profit".to_string(), serde_json::json!(exits.take_profit));
        }

        self.risk
            .add_position(
                symbol,
                NewPosition {
                    risk_contribution: self.risk.risk_config().max_risk_per_trade_percent,
                    lot_size: report.filled_lot_size,
                    metadata,
                },
            )
            .await;

        tracing::info!(
            "Filled {} {} {:.2} lots (order {})",
            signal.action,
            symbol,
            report.filled_lot_size,
            report.order_id
        );
        SymbolOutcome::Filled
    }
}

/// Resolves once the stop flag is raised. Never resolves if the sender is gone.
async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
