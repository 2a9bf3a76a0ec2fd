//! Run configuration built once at startup and passed into the engine

use crate::error::{Result, SyncError};
use crate::model::PackageType;
use crate::transfer::RetryPolicy;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PACKAGE_CONCURRENCY: usize = 5;
pub const DEFAULT_VERSION_CONCURRENCY: usize = 3;
pub const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 5;

/// Base URLs of the registry services
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub graphql: String,
    pub rest: String,
    pub container: String,
    pub npm: String,
    pub maven: String,
    pub nuget: String,
    pub rubygems: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            graphql: "https://api.github.com/graphql".to_string(),
            rest: "https://api.github.com".to_string(),
            container: "https://ghcr.io".to_string(),
            npm: "https://npm.pkg.github.com".to_string(),
            maven: "https://maven.pkg.github.com".to_string(),
            nuget: "https://nuget.pkg.github.com".to_string(),
            rubygems: "https://rubygems.pkg.github.com".to_string(),
        }
    }
}

impl Endpoints {
    /// API endpoints of an enterprise server, or the public service when `None`
    pub fn for_hostname(hostname: Option<&str>) -> Result<Self> {
        let mut endpoints = Self::default();
        let Some(host) = hostname.map(str::trim).filter(|h| !h.is_empty()) else {
            return Ok(endpoints);
        };

        let base = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", host.trim_end_matches('/'))
        };
        url::Url::parse(&base)?;

        endpoints.graphql = format!("{}/api/graphql", base);
        endpoints.rest = format!("{}/api/v3", base);
        Ok(endpoints)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(SyncError::Config(
                "max retries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.delay)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrencyConfig {
    /// Packages in flight at once
    pub packages: usize,
    /// Version transfers in flight at once, shared across all packages
    pub versions: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            packages: DEFAULT_PACKAGE_CONCURRENCY,
            versions: DEFAULT_VERSION_CONCURRENCY,
        }
    }
}

impl ConcurrencyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.packages == 0 || self.versions == 0 {
            return Err(SyncError::Config(
                "concurrency limits must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub source_organization: String,
    pub target_organization: String,
    pub source_token: String,
    pub target_token: String,
    pub mapping_file: Option<PathBuf>,
    pub package_type: Option<PackageType>,
    pub skip_existing: bool,
    pub page_size: u32,
    pub source_endpoints: Endpoints,
    pub target_endpoints: Endpoints,
    pub retry: RetryConfig,
    pub concurrency: ConcurrencyConfig,
    pub verbose: bool,
}

impl SyncConfig {
    pub fn validate(&self) -> Result<()> {
        require("source organization", &self.source_organization)?;
        require("target organization", &self.target_organization)?;
        require("source token", &self.source_token)?;
        require("target token", &self.target_token)?;
        if self.page_size == 0 || self.page_size > 100 {
            return Err(SyncError::Config(
                "page size must be between 1 and 100".to_string(),
            ));
        }
        if let Some(path) = &self.mapping_file {
            if !path.is_file() {
                return Err(SyncError::Config(format!(
                    "mapping file does not exist: {}",
                    path.display()
                )));
            }
        }
        self.retry.validate()?;
        self.concurrency.validate()
    }
}

#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub organization: String,
    pub token: String,
    pub file_prefix: Option<String>,
    pub package_type: Option<PackageType>,
    pub endpoints: Endpoints,
    pub output_dir: PathBuf,
    /// Artifact download directory, when downloads are requested
    pub download_dir: Option<PathBuf>,
    pub download_concurrency: usize,
    pub page_size: u32,
    pub retry: RetryConfig,
    pub verbose: bool,
}

impl ExportConfig {
    pub fn validate(&self) -> Result<()> {
        require("organization", &self.organization)?;
        require("token", &self.token)?;
        if self.download_concurrency == 0 {
            return Err(SyncError::Config(
                "download concurrency must be greater than 0".to_string(),
            ));
        }
        if self.page_size == 0 || self.page_size > 100 {
            return Err(SyncError::Config(
                "page size must be between 1 and 100".to_string(),
            ));
        }
        self.retry.validate()
    }

    /// Prefix of the CSV files, defaulting to the organization
    pub fn prefix(&self) -> &str {
        self.file_prefix
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(&self.organization)
    }
}

fn require(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SyncError::Config(format!("{} is required", name)));
    }
    Ok(())
}
