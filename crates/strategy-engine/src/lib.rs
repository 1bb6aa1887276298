pub mod base;
pub mod engine;
pub mod scalping;

pub use base::*;
pub use engine::StrategyEngine;
pub use scalping::{ScalpingConfig, ScalpingStrategy};
