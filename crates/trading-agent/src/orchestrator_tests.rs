#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use analysis_core::{
        AnalysisError, Bar, BarProvider, CandidateSignal, IndicatorKind, Interval, MarketState,
        SignalAction, SignalIndicators, Timeframe,
    };
    use async_trait::async_trait;
    use broker_trait::{
        ClosedPosition, ExecutionClient, ExecutionError, ExecutionReport, ExecutionStatus,
        TradeInstruction,
    };
    use chrono::Utc;
    use resource_monitor::{LoadSample, LoadSampler, ResourceMonitor};
    use risk_manager::RiskManager;
    use strategy_engine::{Strategy, StrategyEngine};
    use technical_analysis::MarketAnalyzer;
    use tokio::sync::watch;

    use crate::config::AgentConfig;
    use crate::orchestrator::{Orchestrator, SymbolOutcome};

    // ---------------------------------------------------------------------------
    // Fakes
    // ---------------------------------------------------------------------------

    struct MapProvider {
        bars: HashMap<String, Vec<Bar>>,
    }

    #[async_trait]
    impl BarProvider for MapProvider {
        async fn fetch(
            &self,
            symbol: &str,
            _interval: Interval,
            _lookback: chrono::Duration,
        ) -> Result<Vec<Bar>, AnalysisError> {
            Ok(self.bars.get(symbol).cloned().unwrap_or_default())
        }
    }

    /// Serves every symbol's bars after a fixed delay
    struct SlowProvider {
        delay: Duration,
    }

    #[async_trait]
    impl BarProvider for SlowProvider {
        async fn fetch(
            &self,
            _symbol: &str,
            _interval: Interval,
            _lookback: chrono::Duration,
        ) -> Result<Vec<Bar>, AnalysisError> {
            tokio::time::sleep(self.delay).await;
            Ok(bars(1.1))
        }
    }

    struct FixedStrategy {
        confidence: f64,
    }

    impl Strategy for FixedStrategy {
        fn name(&self) -> &str {
            "Fixed"
        }

        fn timeframes(&self) -> &[Timeframe] {
            &[Timeframe::M15]
        }

        fn required_indicators(&self) -> &[IndicatorKind] {
            &[IndicatorKind::Rsi]
        }

        fn generate_signal(&self, symbol: &str, state: &MarketState) -> Option<CandidateSignal> {
            Some(CandidateSignal {
                action: SignalAction::Buy,
                symbol: symbol.to_string(),
                confidence: self.confidence,
                reasoning: vec!["fixed".to_string()],
                strategy: self.name().to_string(),
                timeframe: state.timeframe.clone(),
                indicators: SignalIndicators::default(),
            })
        }
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Venue {
        Fill,
        Reject,
        Fail,
        Hang,
    }

    struct FakeExecutor {
        venue: Venue,
        submitted: Mutex<Vec<TradeInstruction>>,
        marks: Mutex<Vec<(String, f64)>>,
        pending_closes: Mutex<Vec<ClosedPosition>>,
        stop_on_submit: Option<watch::Sender<bool>>,
        hang_on_mark: bool,
    }

    impl FakeExecutor {
        fn new(venue: Venue) -> Self {
            Self {
                venue,
                submitted: Mutex::new(Vec::new()),
                marks: Mutex::new(Vec::new()),
                pending_closes: Mutex::new(Vec::new()),
                stop_on_submit: None,
                hang_on_mark: false,
            }
        }

        fn close(&self, symbol: &str) {
            self.pending_closes.lock().unwrap().push(ClosedPosition {
                symbol: symbol.to_string(),
                order_id: format!("ORD-{}", symbol),
                closed_at: Utc::now(),
                exit_price: Some(1.1),
                reason: "take profit".to_string(),
            });
        }

        fn submitted(&self) -> Vec<TradeInstruction> {
            self.submitted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ExecutionClient for FakeExecutor {
        async fn submit(&self, instruction: &TradeInstruction) -> Result<ExecutionReport, ExecutionError> {
            self.submitted.lock().unwrap().push(instruction.clone());
            if let Some(tx) = &self.stop_on_submit {
                let _ = tx.send(true);
            }

            match self.venue {
                Venue::Fill => Ok(ExecutionReport {
                    order_id: format!("ORD-{}", instruction.symbol),
                    symbol: instruction.symbol.clone(),
                    status: ExecutionStatus::Filled,
                    filled_lot_size: instruction.lot_size,
                    entry_price: instruction.reference_price,
                    exit_levels: None,
                    message: "filled".to_string(),
                }),
                Venue::Reject => Ok(ExecutionReport {
                    order_id: String::new(),
                    symbol: instruction.symbol.clone(),
                    status: ExecutionStatus::Rejected,
                    filled_lot_size: 0.0,
                    entry_price: None,
                    exit_levels: None,
                    message: "market closed".to_string(),
                }),
                Venue::Fail => Err(ExecutionError::Unavailable("bridge offline".to_string())),
                Venue::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Err(ExecutionError::Unavailable("unreachable".to_string()))
                }
            }
        }

        async fn drain_closed(&self) -> Result<Vec<ClosedPosition>, ExecutionError> {
            Ok(std::mem::take(&mut *self.pending_closes.lock().unwrap()))
        }

        async fn mark_price(&self, symbol: &str, price: f64) {
            self.marks.lock().unwrap().push((symbol.to_string(), price));
            if self.hang_on_mark {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
        }

        fn is_paper(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    struct IdleSampler;

    impl LoadSampler for IdleSampler {
        fn sample(&mut self) -> LoadSample {
            LoadSample {
                cpu_percent: 5.0,
                memory_percent: 20.0,
            }
        }
    }

    // ---------------------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------------------

    fn bars(last_close: f64) -> Vec<Bar> {
        let start = Utc::now() - chrono::Duration::minutes(15 * 30);
        (0..30)
            .map(|i| {
                let close = last_close - 0.0003 * (29 - i) as f64 * if i % 2 == 0 { 1.0 } else { -0.5 };
                Bar {
                    timestamp: start + chrono::Duration::minutes(15 * i as i64),
                    open: close,
                    high: close + 0.0004,
                    low: close - 0.0004,
                    close,
                    volume: 500.0,
                }
            })
            .collect()
    }

    fn config(pairs: &[(&str, &str)]) -> AgentConfig {
        let mut vars: HashMap<String, String> = HashMap::new();
        vars.insert("SYMBOLS".to_string(), "EURUSD".to_string());
        vars.insert("METRICS_LOG_INTERVAL".to_string(), "0".to_string());
        for (k, v) in pairs {
            vars.insert(k.to_string(), v.to_string());
        }
        AgentConfig::from_lookup(|key| vars.get(key).cloned()).unwrap()
    }

    struct Harness {
        orchestrator: Orchestrator,
        risk: Arc<RiskManager>,
        executor: Arc<FakeExecutor>,
    }

    fn harness(
        config: AgentConfig,
        with_data: &[&str],
        confidence: f64,
        executor: FakeExecutor,
    ) -> Harness {
        let bars: HashMap<String, Vec<Bar>> = with_data
            .iter()
            .map(|s| (s.to_string(), bars(1.1)))
            .collect();
        harness_with_provider(config, Arc::new(MapProvider { bars }), confidence, executor)
    }

    fn harness_with_provider(
        config: AgentConfig,
        provider: Arc<dyn BarProvider>,
        confidence: f64,
        executor: FakeExecutor,
    ) -> Harness {
        let analyzer = Arc::new(MarketAnalyzer::new(provider));
        let strategies = StrategyEngine::new().with_strategy(Box::new(FixedStrategy { confidence }));
        let risk = Arc::new(RiskManager::new(config.risk_config()));
        let monitor = ResourceMonitor::with_sampler(config.monitor_config(), Box::new(IdleSampler));
        let executor = Arc::new(executor);

        let orchestrator = Orchestrator::new(
            config,
            analyzer,
            strategies,
            Arc::clone(&risk),
            monitor,
            Arc::clone(&executor) as Arc<dyn ExecutionClient>,
        );

        Harness {
            orchestrator,
            risk,
            executor,
        }
    }

    fn running() -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(false)
    }

    // ---------------------------------------------------------------------------
    // Tests
    // ---------------------------------------------------------------------------

    #[tokio::test]
    async fn approved_signal_is_filled_and_tracked() {
        let mut h = harness(config(&[]), &["EURUSD"], 0.9, FakeExecutor::new(Venue::Fill));
        let (_tx, rx) = running();

        let outcomes = h.orchestrator.run_sweep(&rx).await;
        assert_eq!(outcomes["EURUSD"], SymbolOutcome::Filled);

        let submitted = h.executor.submitted();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].action, SignalAction::Buy);
        assert_eq!(submitted[0].lot_size, 0.01);
        assert_eq!(submitted[0].risk_reward_ratio, 3.0);
        assert_eq!(submitted[0].reference_price, Some(1.1));

        let record = h.risk.position("EURUSD").await.unwrap();
        assert_eq!(record.risk_contribution, 1.0);
        assert_eq!(record.lot_size, 0.01);
        assert_eq!(record.metadata["order_id"], "ORD-EURUSD");
        assert_eq!(record.metadata["strategy"], "Fixed");

        let metrics = h.orchestrator.metrics();
        assert_eq!(metrics.sweeps_run, 1);
        assert_eq!(metrics.signals_generated, 1);
        assert_eq!(metrics.fills, 1);
    }

    #[tokio::test]
    async fn analysed_close_is_marked_with_the_venue() {
        let mut h = harness(config(&[]), &["EURUSD"], 0.9, FakeExecutor::new(Venue::Fill));
        let (_tx, rx) = running();

        h.orchestrator.run_sweep(&rx).await;
        let marks = h.executor.marks.lock().unwrap().clone();
        assert_eq!(marks, vec![("EURUSD".to_string(), 1.1)]);
    }

    #[tokio::test]
    async fn degraded_symbols_never_reach_risk_or_venue() {
        let mut h = harness(
            config(&[("SYMBOLS", "EURUSD,GBPUSD")]),
            &["EURUSD"],
            0.9,
            FakeExecutor::new(Venue::Fill),
        );
        let (_tx, rx) = running();

        let outcomes = h.orchestrator.run_sweep(&rx).await;
        assert_eq!(outcomes["GBPUSD"], SymbolOutcome::Degraded);
        assert_eq!(h.executor.submitted().len(), 1);
        assert!(h.risk.position("GBPUSD").await.is_none());
        assert_eq!(h.orchestrator.metrics().degraded_analyses, 1);
        assert_eq!(h.orchestrator.metrics().symbols_analysed, 2);
    }

    #[tokio::test]
    async fn tracked_symbol_is_rejected_on_next_sweep() {
        let mut h = harness(config(&[]), &["EURUSD"], 0.9, FakeExecutor::new(Venue::Fill));
        let (_tx, rx) = running();

        h.orchestrator.run_sweep(&rx).await;
        let outcomes = h.orchestrator.run_sweep(&rx).await;

        assert_eq!(outcomes["EURUSD"], SymbolOutcome::RiskRejected);
        assert_eq!(h.executor.submitted().len(), 1);
        assert_eq!(h.orchestrator.metrics().risk_rejections, 1);
    }

    #[tokio::test]
    async fn low_confidence_signal_is_rejected() {
        let mut h = harness(config(&[]), &["EURUSD"], 0.55, FakeExecutor::new(Venue::Fill));
        let (_tx, rx) = running();

        let outcomes = h.orchestrator.run_sweep(&rx).await;
        assert_eq!(outcomes["EURUSD"], SymbolOutcome::RiskRejected);
        assert!(h.executor.submitted().is_empty());
    }

    #[tokio::test]
    async fn closures_release_positions_before_the_sweep() {
        let mut h = harness(config(&[]), &["EURUSD"], 0.9, FakeExecutor::new(Venue::Fill));
        let (_tx, rx) = running();

        h.orchestrator.run_sweep(&rx).await;
        h.executor.close("EURUSD");
        let outcomes = h.orchestrator.run_sweep(&rx).await;

        // Closed first, so the symbol is untracked and trades again
        assert_eq!(outcomes["EURUSD"], SymbolOutcome::Filled);
        assert_eq!(h.orchestrator.metrics().positions_closed, 1);
        assert_eq!(h.orchestrator.metrics().fills, 2);
        assert_eq!(h.risk.get_portfolio_risk().await.position_count, 1);
    }

    #[tokio::test]
    async fn unfilled_and_failed_executions_are_not_tracked() {
        let mut rejected = harness(config(&[]), &["EURUSD"], 0.9, FakeExecutor::new(Venue::Reject));
        let mut failed = harness(config(&[]), &["EURUSD"], 0.9, FakeExecutor::new(Venue::Fail));
        let (_tx, rx) = running();

        let outcomes = rejected.orchestrator.run_sweep(&rx).await;
        assert_eq!(outcomes["EURUSD"], SymbolOutcome::NotFilled);
        assert!(rejected.risk.tracked_symbols().await.is_empty());

        let outcomes = failed.orchestrator.run_sweep(&rx).await;
        assert_eq!(outcomes["EURUSD"], SymbolOutcome::ExecutionFailed);
        assert!(failed.risk.tracked_symbols().await.is_empty());
        assert_eq!(failed.orchestrator.metrics().execution_failures, 1);
    }

    #[tokio::test]
    async fn hung_venue_times_out() {
        let mut h = harness(
            config(&[("EXECUTION_TIMEOUT", "1")]),
            &["EURUSD"],
            0.9,
            FakeExecutor::new(Venue::Hang),
        );
        let (_tx, rx) = running();

        let outcomes = h.orchestrator.run_sweep(&rx).await;
        assert_eq!(outcomes["EURUSD"], SymbolOutcome::ExecutionFailed);
        assert!(h.risk.tracked_symbols().await.is_empty());
    }

    #[tokio::test]
    async fn round_robin_rotates_the_start() {
        let mut h = harness(
            config(&[("SYMBOLS", "AUDUSD,EURUSD,GBPUSD"), ("SYMBOL_ORDER", "round_robin")]),
            &[],
            0.9,
            FakeExecutor::new(Venue::Fill),
        );
        let (_tx, rx) = running();

        assert_eq!(h.orchestrator.sweep_order(), vec!["AUDUSD", "EURUSD", "GBPUSD"]);
        h.orchestrator.run_sweep(&rx).await;
        assert_eq!(h.orchestrator.sweep_order(), vec!["EURUSD", "GBPUSD", "AUDUSD"]);
        h.orchestrator.run_sweep(&rx).await;
        h.orchestrator.run_sweep(&rx).await;
        assert_eq!(h.orchestrator.sweep_order(), vec!["AUDUSD", "EURUSD", "GBPUSD"]);
    }

    #[tokio::test]
    async fn fixed_order_never_rotates() {
        let mut h = harness(
            config(&[("SYMBOLS", "AUDUSD,EURUSD")]),
            &[],
            0.9,
            FakeExecutor::new(Venue::Fill),
        );
        let (_tx, rx) = running();

        h.orchestrator.run_sweep(&rx).await;
        assert_eq!(h.orchestrator.sweep_order(), vec!["AUDUSD", "EURUSD"]);
    }

    #[tokio::test]
    async fn concurrent_prefetch_keeps_sequential_risk() {
        let mut h = harness(
            config(&[("SYMBOLS", "AUDUSD,EURUSD,GBPUSD"), ("ANALYSIS_CONCURRENCY", "3")]),
            &["AUDUSD", "EURUSD", "GBPUSD"],
            0.9,
            FakeExecutor::new(Venue::Fill),
        );
        let (_tx, rx) = running();

        let outcomes = h.orchestrator.run_sweep(&rx).await;
        assert!(outcomes.values().all(|o| *o == SymbolOutcome::Filled));

        let submitted: Vec<String> = h.executor.submitted().into_iter().map(|i| i.symbol).collect();
        assert_eq!(submitted, vec!["AUDUSD", "EURUSD", "GBPUSD"]);

        let summary = h.risk.get_portfolio_risk().await;
        assert_eq!(summary.position_count, 3);
        assert_eq!(summary.total_risk, 3.0);
    }

    #[tokio::test]
    async fn stop_flag_is_checked_before_each_symbol() {
        let (tx, rx) = running();
        let mut executor = FakeExecutor::new(Venue::Fill);
        executor.stop_on_submit = Some(tx);

        let mut h = harness(
            config(&[("SYMBOLS", "EURUSD,GBPUSD")]),
            &["EURUSD", "GBPUSD"],
            0.9,
            executor,
        );

        let outcomes = h.orchestrator.run_sweep(&rx).await;
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes.contains_key("EURUSD"));
    }

    #[tokio::test]
    async fn run_stops_after_max_sweeps() {
        let mut h = harness(
            config(&[("MAX_SWEEPS", "1")]),
            &["EURUSD"],
            0.9,
            FakeExecutor::new(Venue::Fill),
        );
        let (_tx, rx) = running();

        h.orchestrator.run(rx).await;
        assert_eq!(h.orchestrator.metrics().sweeps_run, 1);
    }

    #[tokio::test]
    async fn run_honours_a_prior_shutdown() {
        let mut h = harness(config(&[]), &["EURUSD"], 0.9, FakeExecutor::new(Venue::Fill));
        let (tx, rx) = running();
        tx.send(true).unwrap();

        h.orchestrator.run(rx).await;
        assert_eq!(h.orchestrator.metrics().sweeps_run, 0);
        assert!(h.executor.submitted().is_empty());
    }

    #[tokio::test]
    async fn shutdown_interrupts_the_inter_sweep_sleep() {
        let mut h = harness(config(&[("BASE_SLEEP", "30")]), &[], 0.9, FakeExecutor::new(Venue::Fill));
        let (tx, rx) = running();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send(true);
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        tokio::time::timeout(Duration::from_secs(5), h.orchestrator.run(rx))
            .await
            .unwrap();
        assert_eq!(h.orchestrator.metrics().sweeps_run, 1);
    }

    #[tokio::test]
    async fn hung_price_mark_does_not_stall_the_sweep() {
        let mut executor = FakeExecutor::new(Venue::Fill);
        executor.hang_on_mark = true;
        let mut h = harness(config(&[("EXECUTION_TIMEOUT", "1")]), &["EURUSD"], 0.9, executor);
        let (_tx, rx) = running();

        let outcomes = tokio::time::timeout(Duration::from_secs(5), h.orchestrator.run_sweep(&rx))
            .await
            .expect("sweep should finish once the mark times out");

        // The timed-out mark is logged and the symbol still trades
        assert_eq!(outcomes["EURUSD"], SymbolOutcome::Filled);
        assert_eq!(h.executor.marks.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stop_flag_cuts_concurrent_prefetch_short() {
        let symbols = "AUDUSD,EURUSD,GBPUSD,NZDUSD,USDCAD,USDJPY";
        let mut h = harness_with_provider(
            config(&[("SYMBOLS", symbols), ("ANALYSIS_CONCURRENCY", "2")]),
            Arc::new(SlowProvider { delay: Duration::from_secs(2) }),
            0.9,
            FakeExecutor::new(Venue::Fill),
        );
        let (tx, rx) = running();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = tx.send(true);
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let started = std::time::Instant::now();
        let outcomes = h.orchestrator.run_sweep(&rx).await;

        // Three rounds of 2s fetches would take 6s
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(outcomes.is_empty());
        assert!(h.executor.submitted().is_empty());
    }
}
