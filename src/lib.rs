//! Package Sync Library
//!
//! Moves organization packages and their versions from a source registry
//! to a target registry. The [`sync::SyncEngine`] drives the catalog fetch,
//! per-type validation, bounded concurrent transfer and result aggregation;
//! [`export::Exporter`] writes the catalog to CSV and downloads artifacts.

pub mod catalog;
pub mod cli;
pub mod concurrency;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod export;
pub mod logging;
pub mod mapping;
pub mod model;
pub mod registry;
pub mod report;
pub mod sync;
pub mod transfer;
pub mod validation;

pub use error::{Result, SyncError};
pub use logging::Logger;
pub use model::{File, Package, PackageType, Version, Visibility};
pub use sync::{SyncEngine, SyncOptions};
