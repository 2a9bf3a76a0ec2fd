//! Registry module for source downloads and target uploads
//!
//! The engine talks to registries only through [`ArtifactSource`] and
//! [`ArtifactTarget`], so transfers can be exercised against in-memory fakes.
//! [`RegistryClient`] implements both over HTTP.

pub mod client;

pub use client::{RegistryClient, RegistryClientBuilder};

use crate::error::{Result, SyncError};
use crate::model::{File, PackageType, Visibility};
use async_trait::async_trait;
use url::Url;

pub const MEDIA_TYPE_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const MEDIA_TYPE_CONFIG: &str = "application/vnd.docker.container.image.v1+json";
pub const MEDIA_TYPE_LAYER: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";

/// Where artifact bytes come from
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    async fn download(&self, file: &File) -> Result<Vec<u8>>;

    /// Visibility of `package` at the source, `None` when it is not reported
    async fn package_visibility(
        &self,
        organization: &str,
        kind: PackageType,
        package: &str,
    ) -> Result<Option<Visibility>>;
}

/// Where artifacts are published
#[async_trait]
pub trait ArtifactTarget: Send + Sync {
    /// Whether `version` of `package` already exists at the target
    async fn version_exists(
        &self,
        organization: &str,
        kind: PackageType,
        package: &str,
        version: &str,
    ) -> Result<bool>;

    async fn blob_exists(&self, organization: &str, package: &str, digest: &str) -> Result<bool>;

    async fn upload_blob(
        &self,
        organization: &str,
        package: &str,
        digest: &str,
        data: &[u8],
    ) -> Result<()>;

    async fn upload_manifest(
        &self,
        organization: &str,
        package: &str,
        reference: &str,
        media_type: &str,
        manifest: &[u8],
    ) -> Result<()>;

    async fn publish_npm(
        &self,
        organization: &str,
        package: &str,
        document: &serde_json::Value,
    ) -> Result<()>;

    /// Store one file at `path` under the Maven repository
    async fn put_maven_file(
        &self,
        organization: &str,
        repository: &str,
        path: &str,
        data: &[u8],
    ) -> Result<()>;

    async fn push_nuget(&self, organization: &str, file_name: &str, data: &[u8]) -> Result<()>;

    async fn push_gem(&self, organization: &str, data: &[u8]) -> Result<()>;

    async fn update_version_metadata(
        &self,
        organization: &str,
        kind: PackageType,
        package: &str,
        version: &str,
        metadata: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<()>;

    async fn update_visibility(
        &self,
        organization: &str,
        kind: PackageType,
        package: &str,
        visibility: Visibility,
    ) -> Result<()>;
}

/// Append percent-encoded path segments to `base`
pub fn segments_url<'a, I>(base: &str, segments: I) -> Result<Url>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut url = Url::parse(base)?;
    url.path_segments_mut()
        .map_err(|_| SyncError::Config(format!("{} cannot be used as a base URL", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Normalize a hex or prefixed digest to `sha256:<hex>`
pub fn normalize_digest(digest: &str) -> String {
    if digest.starts_with("sha256:") {
        digest.to_string()
    } else {
        format!("sha256:{}", digest)
    }
}
