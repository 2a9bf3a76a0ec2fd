//! Organization-to-organization package synchronization
//!
//! Fetches the source catalog, schedules one worker per package under the
//! [`ConcurrencyController`], and feeds each worker's [`TransferReport`] to a
//! single [`ResultAggregator`] task.

use crate::catalog::{CatalogFetcher, CatalogSource, DEFAULT_PAGE_SIZE};
use crate::concurrency::ConcurrencyController;
use crate::config::{ConcurrencyConfig, SyncConfig};
use crate::error::{Result, SyncError};
use crate::logging::Logger;
use crate::mapping::NameMapping;
use crate::model::{Package, PackageType};
use crate::registry::{ArtifactSource, ArtifactTarget};
use crate::report::{ResultAggregator, SyncSummary, TransferReport, TransferStatus};
use crate::transfer::{PackageTarget, RetryPolicy, TransferPipeline, VersionOutcome};
use crate::validation::PackageValidator;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub source_organization: String,
    pub target_organization: String,
    pub package_type: Option<PackageType>,
    pub page_size: u32,
    pub concurrency: ConcurrencyConfig,
    pub retry: RetryPolicy,
    pub skip_existing: bool,
}

impl SyncOptions {
    pub fn new(source_organization: impl Into<String>, target_organization: impl Into<String>) -> Self {
        Self {
            source_organization: source_organization.into(),
            target_organization: target_organization.into(),
            package_type: None,
            page_size: DEFAULT_PAGE_SIZE,
            concurrency: ConcurrencyConfig::default(),
            retry: RetryPolicy::default(),
            skip_existing: false,
        }
    }
}

impl From<&SyncConfig> for SyncOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            source_organization: config.source_organization.clone(),
            target_organization: config.target_organization.clone(),
            package_type: config.package_type,
            page_size: config.page_size,
            concurrency: config.concurrency,
            retry: config.retry.policy(),
            skip_existing: config.skip_existing,
        }
    }
}

pub struct SyncEngine {
    catalog: Arc<dyn CatalogSource>,
    source: Arc<dyn ArtifactSource>,
    target: Arc<dyn ArtifactTarget>,
    mapping: Arc<NameMapping>,
    options: SyncOptions,
    output: Logger,
}

/// State shared read-only by every package worker
struct WorkerContext {
    pipeline: TransferPipeline,
    controller: ConcurrencyController,
    mapping: Arc<NameMapping>,
    source_organization: String,
    target_organization: String,
    cancel: CancellationToken,
    output: Logger,
}

impl SyncEngine {
    pub fn new(
        catalog: Arc<dyn CatalogSource>,
        source: Arc<dyn ArtifactSource>,
        target: Arc<dyn ArtifactTarget>,
        options: SyncOptions,
        output: Logger,
    ) -> Self {
        Self {
            catalog,
            source,
            target,
            mapping: Arc::new(NameMapping::empty()),
            options,
            output,
        }
    }

    pub fn with_mapping(mut self, mapping: NameMapping) -> Self {
        self.mapping = Arc::new(mapping);
        self
    }

    /// Run one migration. Only catalog failures abort the run; package and
    /// version failures are carried in the returned summary.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<SyncSummary> {
        let options = &self.options;
        self.output.section(&format!(
            "Syncing packages from {} to {}",
            options.source_organization, options.target_organization
        ));

        let fetcher = CatalogFetcher::new(self.catalog.clone(), self.output.clone())
            .with_page_size(options.page_size);
        let packages = fetcher
            .fetch(&options.source_organization, options.package_type, cancel)
            .await?;

        let pipeline = TransferPipeline::new(
            self.source.clone(),
            self.target.clone(),
            options.retry,
            self.output.clone(),
        )
        .with_skip_existing(options.skip_existing);

        let context = Arc::new(WorkerContext {
            pipeline,
            controller: ConcurrencyController::new(options.concurrency, self.output.clone()),
            mapping: self.mapping.clone(),
            source_organization: options.source_organization.clone(),
            target_organization: options.target_organization.clone(),
            cancel: cancel.clone(),
            output: self.output.clone(),
        });

        let (sender, aggregator) = ResultAggregator::channel(packages.len());
        let aggregation = tokio::spawn(aggregator.drain());

        let controller = context.controller.clone();
        let items = packages
            .into_iter()
            .map(|package| ((package.name.clone(), package.package_type.clone()), package));
        let aborted = controller
            .run_packages(items, |package| {
                let context = context.clone();
                let sender = sender.clone();
                async move {
                    let report = process_package(&context, package).await;
                    if sender.send(report).await.is_err() {
                        context.output.error("Report channel closed before all packages finished");
                    }
                }
            })
            .await;
        for ((name, package_type), message) in aborted {
            let report = TransferReport::rejected(
                &name,
                &package_type,
                format!("package worker aborted: {}", message),
            );
            if sender.send(report).await.is_err() {
                self.output.error("Report channel closed before all packages finished");
            }
        }
        drop(sender);

        let summary = aggregation
            .await
            .map_err(|e| SyncError::Io(std::io::Error::other(e)))?;

        self.output.summary_kv(
            "Sync complete",
            &[
                ("Packages", summary.total().to_string()),
                ("Successful", summary.successful.to_string()),
                ("Partial Success", summary.partial.to_string()),
                ("Failed", summary.failed.to_string()),
                ("Elapsed", self.output.format_duration(self.output.elapsed())),
            ],
        );
        Ok(summary)
    }
}

/// Validate, resolve and transfer one package, producing its single report
async fn process_package(context: &Arc<WorkerContext>, package: Package) -> TransferReport {
    let kind = match package.kind() {
        Ok(kind) => kind,
        Err(e) => {
            context.output.warning(&format!("Skipping {}: {}", package.name, e));
            return TransferReport::rejected(&package.name, &package.package_type, e.to_string());
        }
    };

    let validator = PackageValidator::new(kind);
    if let Err(e) = validator.validate_package(&package) {
        context.output.warning(&e.to_string());
        return TransferReport::rejected(&package.name, &package.package_type, e.to_string());
    }

    let target_name = context.mapping.resolve(&package.name);
    context.output.step(&format!(
        "{} {} -> {} ({} version(s))",
        kind,
        package.name,
        target_name,
        package.versions.len()
    ));

    let visibility = match package.visibility {
        Some(visibility) => Some(visibility),
        None => match context
            .pipeline
            .source_visibility(&context.source_organization, kind, &package.name, &context.cancel)
            .await
        {
            Ok(visibility) => visibility,
            Err(e) if e.is_cancelled() => {
                return TransferReport::rejected(
                    &package.name,
                    &package.package_type,
                    SyncError::Cancelled.to_string(),
                );
            }
            Err(e) => {
                context
                    .output
                    .warning(&format!("Visibility lookup for {} failed: {}", package.name, e));
                None
            }
        },
    };

    let target = Arc::new(PackageTarget {
        organization: context.target_organization.clone(),
        name: target_name.clone(),
        kind,
        visibility,
        repository: package.repository.as_ref().map(|r| r.name.clone()),
    });

    let attempted = package.versions.len();
    let results = context
        .controller
        .run_versions(package.versions, |version| {
            let context = context.clone();
            let target = target.clone();
            async move {
                let outcome = context
                    .pipeline
                    .transfer_version(&target, &validator, &version, &context.cancel)
                    .await;
                (version.name, outcome)
            }
        })
        .await;

    let mut succeeded = 0;
    let mut skipped = 0;
    let mut errors = Vec::new();
    for result in results {
        match result {
            Ok((_, Ok(VersionOutcome::Transferred))) => succeeded += 1,
            Ok((_, Ok(VersionOutcome::Skipped))) => {
                succeeded += 1;
                skipped += 1;
            }
            Ok((version, Err(e))) => {
                context
                    .output
                    .error(&format!("{}@{}: {}", package.name, version, e));
                errors.push(format!("{}: {}", version, e));
            }
            Err(aborted) => errors.push(aborted),
        }
    }

    if succeeded > 0 {
        match target.visibility {
            Some(visibility) => {
                if let Err(e) = context
                    .pipeline
                    .propagate_visibility(&target, visibility, &context.cancel)
                    .await
                {
                    context.output.warning(&format!("{}: {}", target_name, e));
                }
            }
            None => context.output.warning(&format!(
                "Visibility of {} is not reported by the source, leaving the target default",
                package.name
            )),
        }
    }

    let status = TransferStatus::classify(succeeded, errors.len());
    TransferReport {
        package_name: package.name,
        target_name,
        package_type: package.package_type,
        status,
        versions_attempted: attempted,
        versions_succeeded: succeeded,
        versions_skipped: skipped,
        errors,
    }
}
