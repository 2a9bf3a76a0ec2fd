//! Version transfer from source to target registry

pub mod pipeline;
pub mod retry;
pub mod strategy;

pub use pipeline::{PackageTarget, TransferPipeline, TransferSpec, VersionOutcome};
pub use retry::RetryPolicy;
pub use strategy::LayerLocks;
