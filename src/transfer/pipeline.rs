//! Per-version download, upload and metadata propagation

use crate::error::{Result, SyncError};
use crate::logging::Logger;
use crate::model::{File, LocalFile, PackageType, Version, Visibility};
use crate::registry::{ArtifactSource, ArtifactTarget};
use crate::transfer::strategy::{LayerLocks, UploadContext};
use crate::transfer::RetryPolicy;
use crate::validation::PackageValidator;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything needed to publish one version at the target
#[derive(Debug, Clone)]
pub struct TransferSpec {
    pub target_organization: String,
    pub target_package: String,
    pub version: String,
    pub package_type: PackageType,
    pub files: Vec<LocalFile>,
    pub metadata: Map<String, Value>,
    /// Source visibility, when the source reports one
    pub visibility: Option<Visibility>,
    /// Repository the package is linked to at the source
    pub repository: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionOutcome {
    Transferred,
    /// Already present at the target and skip-existing was requested
    Skipped,
}

/// Identity of the package a version belongs to
#[derive(Debug, Clone)]
pub struct PackageTarget {
    pub organization: String,
    pub name: String,
    pub kind: PackageType,
    pub visibility: Option<Visibility>,
    pub repository: Option<String>,
}

pub struct TransferPipeline {
    source: Arc<dyn ArtifactSource>,
    target: Arc<dyn ArtifactTarget>,
    retry: RetryPolicy,
    skip_existing: bool,
    layer_locks: LayerLocks,
    output: Logger,
}

impl TransferPipeline {
    pub fn new(
        source: Arc<dyn ArtifactSource>,
        target: Arc<dyn ArtifactTarget>,
        retry: RetryPolicy,
        output: Logger,
    ) -> Self {
        Self {
            source,
            target,
            retry,
            skip_existing: false,
            layer_locks: LayerLocks::new(),
            output,
        }
    }

    pub fn with_skip_existing(mut self, skip_existing: bool) -> Self {
        self.skip_existing = skip_existing;
        self
    }

    /// Validate, download and publish one version.
    ///
    /// Metadata propagation failures are logged and do not fail the version.
    pub async fn transfer_version(
        &self,
        package: &PackageTarget,
        validator: &PackageValidator,
        version: &Version,
        cancel: &CancellationToken,
    ) -> Result<VersionOutcome> {
        validator.validate_version(version)?;

        if self.skip_existing && self.exists_at_target(package, version, cancel).await? {
            self.output.info(&format!(
                "{}@{} already exists at target, skipping",
                package.name, version.name
            ));
            return Ok(VersionOutcome::Skipped);
        }

        let mut files = Vec::with_capacity(version.files.len());
        for file in &version.files {
            files.push(self.download(file, cancel).await?);
        }

        let spec = TransferSpec {
            target_organization: package.organization.clone(),
            target_package: package.name.clone(),
            version: version.name.clone(),
            package_type: package.kind,
            files,
            metadata: propagated_metadata(version),
            visibility: package.visibility,
            repository: package.repository.clone(),
        };

        let context = UploadContext {
            target: self.target.as_ref(),
            retry: &self.retry,
            cancel,
            output: &self.output,
            layer_locks: &self.layer_locks,
        };
        context.upload(&spec).await?;

        if let Err(e) = self.propagate_metadata(&spec, cancel).await {
            if e.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            self.output.warning(&format!(
                "{}@{}: {}",
                spec.target_package, spec.version, e
            ));
        }

        self.output.success(&format!(
            "Transferred {}@{}",
            spec.target_package, spec.version
        ));
        Ok(VersionOutcome::Transferred)
    }

    /// Visibility of the package at the source, `None` when it is not reported
    pub async fn source_visibility(
        &self,
        organization: &str,
        kind: PackageType,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Visibility>> {
        self.retry
            .run("visibility lookup", cancel, &self.output, |_| {
                self.source.package_visibility(organization, kind, name)
            })
            .await
    }

    /// Apply `visibility` to the target package, once per package
    pub async fn propagate_visibility(
        &self,
        package: &PackageTarget,
        visibility: Visibility,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.retry
            .run("visibility update", cancel, &self.output, |_| {
                self.target.update_visibility(
                    &package.organization,
                    package.kind,
                    &package.name,
                    visibility,
                )
            })
            .await
            .map_err(|e| match e {
                SyncError::Cancelled => e,
                other => SyncError::VisibilityPropagation(other.root_cause().to_string()),
            })
    }

    async fn propagate_metadata(&self, spec: &TransferSpec, cancel: &CancellationToken) -> Result<()> {
        if spec.metadata.is_empty() {
            return Ok(());
        }
        self.retry
            .run("metadata update", cancel, &self.output, |_| {
                self.target.update_version_metadata(
                    &spec.target_organization,
                    spec.package_type,
                    &spec.target_package,
                    &spec.version,
                    &spec.metadata,
                )
            })
            .await
            .map_err(|e| match e {
                SyncError::Cancelled => e,
                other => SyncError::MetadataPropagation(other.root_cause().to_string()),
            })
    }

    async fn exists_at_target(
        &self,
        package: &PackageTarget,
        version: &Version,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        self.retry
            .run("existence check", cancel, &self.output, |_| {
                self.target.version_exists(
                    &package.organization,
                    package.kind,
                    &package.name,
                    &version.name,
                )
            })
            .await
    }

    async fn download(&self, file: &File, cancel: &CancellationToken) -> Result<LocalFile> {
        let operation = format!("download of {}", file.name);
        let data = self
            .retry
            .run(&operation, cancel, &self.output, |_| async move {
                let data = self.source.download(file).await?;
                verify_download(file, &data)?;
                Ok(data)
            })
            .await?;
        self.output.detail(&format!(
            "Downloaded {} ({})",
            file.name,
            self.output.format_size(data.len() as u64)
        ));
        Ok(LocalFile::new(file.name.clone(), data))
    }
}

/// Compare downloaded bytes with the declared size and digest
pub fn verify_download(file: &File, data: &[u8]) -> Result<()> {
    if file.size > 0 && data.len() as u64 != file.size {
        return Err(SyncError::Network(format!(
            "size mismatch for {}: expected {} bytes, got {}",
            file.name,
            file.size,
            data.len()
        )));
    }
    if let Some(expected) = file.sha256.as_deref() {
        let expected = expected.trim_start_matches("sha256:");
        let actual = hex::encode(Sha256::digest(data));
        if !expected.eq_ignore_ascii_case(&actual) {
            return Err(SyncError::Network(format!(
                "sha256 mismatch for {}: expected {}, got {}",
                file.name, expected, actual
            )));
        }
    }
    Ok(())
}

/// Version metadata plus the creation timestamp under `created`
fn propagated_metadata(version: &Version) -> Map<String, Value> {
    let mut metadata = version.metadata.clone();
    if let Some(created) = &version.created_at {
        metadata
            .entry("created".to_string())
            .or_insert_with(|| Value::String(created.clone()));
    }
    metadata
}
