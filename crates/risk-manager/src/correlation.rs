use crate::models::PositionRecord;

/// Estimates how strongly a new trade on `symbol` overlaps with the
/// positions already open. Returns a value in [0, 1].
pub trait CorrelationModel: Send + Sync {
    fn correlation_risk(&self, symbol: &str, open_positions: &[&PositionRecord]) -> f64;
}

/// Treats every symbol as independent.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCorrelation;

impl CorrelationModel for NoCorrelation {
    fn correlation_risk(&self, _symbol: &str, _open_positions: &[&PositionRecord]) -> f64 {
        0.0
    }
}
