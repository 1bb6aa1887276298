use std::collections::BTreeSet;

use analysis_core::{CandidateSignal, IndicatorKind, MarketState};

use crate::base::{validate_signal, Strategy, MIN_SIGNAL_CONFIDENCE};
use crate::scalping::ScalpingStrategy;

/// Registry of strategies consulted for every analysed symbol.
///
/// Each applicable strategy is asked for a signal and the most confident
/// one wins. Ties go to whichever strategy was registered first.
#[derive(Default)]
pub struct StrategyEngine {
    strategies: Vec<Box<dyn Strategy>>,
}

impl StrategyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine with the built-in scalping strategy registered
    pub fn with_defaults() -> Self {
        Self::new().with_strategy(Box::new(ScalpingStrategy::new()))
    }

    pub fn with_strategy(mut self, strategy: Box<dyn Strategy>) -> Self {
        self.register(strategy);
        self
    }

    pub fn register(&mut self, strategy: Box<dyn Strategy>) {
        tracing::debug!("Registered strategy {}", strategy.name());
        self.strategies.push(strategy);
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Union of the indicators every registered strategy reads.
    pub fn required_indicators(&self) -> Vec<IndicatorKind> {
        self.strategies
            .iter()
            .flat_map(|s| s.required_indicators().iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn generate_signal(&self, symbol: &str, state: &MarketState) -> Option<CandidateSignal> {
        if state.is_degraded() {
            return None;
        }

        let mut best: Option<CandidateSignal> = None;

        for strategy in &self.strategies {
            if !strategy.applies_to(&state.timeframe) {
                continue;
            }

            let Some(signal) = strategy.generate_signal(symbol, state) else {
                continue;
            };

            if signal.confidence < MIN_SIGNAL_CONFIDENCE {
                continue;
            }
            if let Err(e) = validate_signal(&signal) {
                tracing::warn!("{} produced an invalid signal for {}: {}", strategy.name(), symbol, e);
                continue;
            }

            let better = best
                .as_ref()
                .map_or(true, |current| signal.confidence > current.confidence);
            if better {
                best = Some(signal);
            }
        }

        best
    }
}
