use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("No market data available")]
    NoData,

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Provider timed out after {0:?}")]
    Timeout(Duration),

    #[error("Calculation error: {0}")]
    CalculationError(String),
}
