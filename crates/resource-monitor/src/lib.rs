pub mod monitor;
pub mod sampler;

pub use monitor::{MonitorConfig, ResourceEvent, ResourceLevel, ResourceMonitor, ResourceStatus};
pub use sampler::{LoadSample, LoadSampler, SystemSampler};
