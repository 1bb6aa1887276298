pub mod analyzer;
pub mod indicators;
pub mod snapshot;


pub use analyzer::*;
pub use indicators::*;
pub use snapshot::*;
