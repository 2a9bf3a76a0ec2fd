//! Command-line argument parsing
//!
//! Every flag can also be supplied through a `GHMP_` environment variable.

use crate::config::{
    ConcurrencyConfig, DEFAULT_DOWNLOAD_CONCURRENCY, Endpoints, ExportConfig, RetryConfig,
    SyncConfig,
};
use crate::error::Result;
use crate::model::PackageType;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "package-sync")]
#[command(about = "Export and migrate organization packages between registries")]
#[command(version)]
pub struct Cli {
    /// Verbose output
    #[arg(long, short = 'v', global = true, env = "GHMP_VERBOSE")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Export an organization's packages to CSV and optionally download them
    Export(ExportArgs),
    /// Copy packages from a source organization to a target organization
    Sync(SyncArgs),
}

/// Retry and paging knobs shared by both subcommands
#[derive(ClapArgs, Debug, Clone)]
pub struct TuningArgs {
    /// Attempts per download or upload
    #[arg(long, default_value_t = 3, env = "GHMP_MAX_RETRIES")]
    pub max_retries: u32,

    /// Base backoff delay; attempt n waits n times this long
    #[arg(long, default_value_t = 5, env = "GHMP_RETRY_DELAY_SECS")]
    pub retry_delay_secs: u64,

    /// Packages requested per catalog page
    #[arg(long, default_value_t = 100, env = "GHMP_PAGE_SIZE")]
    pub page_size: u32,
}

impl TuningArgs {
    fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_retries,
            delay: Duration::from_secs(self.retry_delay_secs),
        }
    }
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ExportArgs {
    /// Organization to export
    #[arg(long, short = 'o', env = "GHMP_ORGANIZATION")]
    pub organization: String,

    /// Access token for the organization
    #[arg(long, short = 't', env = "GHMP_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Prefix of the generated CSV files (defaults to the organization)
    #[arg(long, short = 'f', env = "GHMP_FILE_PREFIX")]
    pub file_prefix: Option<String>,

    /// Enterprise server hostname
    #[arg(long, short = 'u', env = "GHMP_HOSTNAME")]
    pub hostname: Option<String>,

    /// Only export packages of this type
    #[arg(long, short = 'p', env = "GHMP_PACKAGE_TYPE")]
    pub package_type: Option<PackageType>,

    /// Directory for the CSV files
    #[arg(long, default_value = ".", env = "GHMP_OUTPUT_DIR")]
    pub output_dir: PathBuf,

    /// Download artifacts, into the given directory or `downloads`
    #[arg(long, num_args = 0..=1, default_missing_value = "downloads", env = "GHMP_DOWNLOAD")]
    pub download: Option<PathBuf>,

    #[command(flatten)]
    pub tuning: TuningArgs,
}

impl ExportArgs {
    pub fn to_config(&self, verbose: bool) -> Result<ExportConfig> {
        let config = ExportConfig {
            organization: self.organization.clone(),
            token: self.token.clone(),
            file_prefix: self.file_prefix.clone(),
            package_type: self.package_type,
            endpoints: Endpoints::for_hostname(self.hostname.as_deref())?,
            output_dir: self.output_dir.clone(),
            download_dir: self.download.clone(),
            download_concurrency: DEFAULT_DOWNLOAD_CONCURRENCY,
            page_size: self.tuning.page_size,
            retry: self.tuning.retry(),
            verbose,
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(ClapArgs, Debug, Clone)]
pub struct SyncArgs {
    /// Organization to copy packages from
    #[arg(long, short = 's', env = "GHMP_SOURCE_ORGANIZATION")]
    pub source_organization: String,

    /// Organization to copy packages to
    #[arg(long, short = 't', env = "GHMP_TARGET_ORGANIZATION")]
    pub target_organization: String,

    /// Access token for the source organization
    #[arg(long, short = 'a', env = "GHMP_SOURCE_TOKEN", hide_env_values = true)]
    pub source_token: String,

    /// Access token for the target organization
    #[arg(long, short = 'b', env = "GHMP_TARGET_TOKEN", hide_env_values = true)]
    pub target_token: String,

    /// CSV file with `source,target` package name pairs
    #[arg(long, short = 'm', env = "GHMP_MAPPING_FILE")]
    pub mapping_file: Option<PathBuf>,

    /// Enterprise server hostname of the source
    #[arg(long, short = 'u', env = "GHMP_SOURCE_HOSTNAME")]
    pub source_hostname: Option<String>,

    /// Only sync packages of this type
    #[arg(long, short = 'p', env = "GHMP_PACKAGE_TYPE")]
    pub package_type: Option<PackageType>,

    /// Skip versions that already exist at the target
    #[arg(long, short = 'k', env = "GHMP_SKIP_EXISTING")]
    pub skip_existing: bool,

    /// Packages processed at once
    #[arg(long, default_value_t = 5, env = "GHMP_CONCURRENCY")]
    pub concurrency: usize,

    /// Version transfers in flight at once across all packages
    #[arg(long, default_value_t = 3, env = "GHMP_VERSION_CONCURRENCY")]
    pub version_concurrency: usize,

    #[command(flatten)]
    pub tuning: TuningArgs,
}

impl SyncArgs {
    pub fn to_config(&self, verbose: bool) -> Result<SyncConfig> {
        let config = SyncConfig {
            source_organization: self.source_organization.clone(),
            target_organization: self.target_organization.clone(),
            source_token: self.source_token.clone(),
            target_token: self.target_token.clone(),
            mapping_file: self.mapping_file.clone(),
            package_type: self.package_type,
            skip_existing: self.skip_existing,
            page_size: self.tuning.page_size,
            source_endpoints: Endpoints::for_hostname(self.source_hostname.as_deref())?,
            target_endpoints: Endpoints::default(),
            retry: self.tuning.retry(),
            concurrency: ConcurrencyConfig {
                packages: self.concurrency,
                versions: self.version_concurrency,
            },
            verbose,
        };
        config.validate()?;
        Ok(config)
    }
}
