pub mod correlation;
pub mod manager;
pub mod models;

pub use correlation::{CorrelationModel, NoCorrelation};
pub use manager::{
    risk_reward_ratio, round_lot, size_position, RiskManager, MAX_ACCEPTABLE_RISK_SCORE, MAX_LOT,
    MIN_LOT,
};
pub use models::*;
