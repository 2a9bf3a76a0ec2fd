//! HTTP client for the package registries
//!
//! Handles artifact downloads from the source organization and the
//! per-type publish endpoints of the target, plus the REST calls used
//! for existence probes and metadata/visibility propagation.

use crate::config::Endpoints;
use crate::error::handlers::HttpErrorHandler;
use crate::error::{Result, SyncError};
use crate::logging::Logger;
use crate::model::{File, PackageType, Visibility};
use crate::registry::{
    ArtifactSource, ArtifactTarget, MEDIA_TYPE_MANIFEST, normalize_digest, segments_url,
};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, LOCATION};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const GITHUB_JSON: &str = "application/vnd.github+json";
const VERSIONS_PER_PAGE: usize = 100;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct RegistryClientBuilder {
    endpoints: Endpoints,
    token: Option<String>,
    output: Logger,
}

impl RegistryClientBuilder {
    pub fn new(endpoints: Endpoints) -> Self {
        Self {
            endpoints,
            token: None,
            output: Logger::default(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_logger(mut self, output: Logger) -> Self {
        self.output = output;
        self
    }

    pub fn build(self) -> Result<RegistryClient> {
        let token = self
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SyncError::Config("registry token is required".to_string()))?;

        let client = Client::builder()
            .user_agent(concat!("package-sync/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| SyncError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(RegistryClient {
            client,
            endpoints: self.endpoints,
            token,
            output: self.output,
        })
    }
}

#[derive(Clone)]
pub struct RegistryClient {
    client: Client,
    endpoints: Endpoints,
    token: String,
    output: Logger,
}

#[derive(Deserialize)]
struct VersionEntry {
    name: String,
}

#[derive(Deserialize)]
struct PackageEntry {
    visibility: Option<String>,
}

impl RegistryClient {
    pub fn builder(endpoints: Endpoints) -> RegistryClientBuilder {
        RegistryClientBuilder::new(endpoints)
    }

    pub fn http(&self) -> &Client {
        &self.client
    }

    async fn send(&self, request: RequestBuilder, context: &str) -> Result<Response> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| HttpErrorHandler::handle_network_error(&e, context))?;
        HttpErrorHandler::check(response, context).await
    }

    /// HEAD/GET probe where 404 means absent
    async fn probe(&self, request: RequestBuilder, context: &str) -> Result<bool> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| HttpErrorHandler::handle_network_error(&e, context))?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let text = response.text().await.unwrap_or_default();
                Err(HttpErrorHandler::handle_registry_error(status, &text, context))
            }
        }
    }

    fn oci_url(&self, organization: &str, package: &str, tail: &[&str]) -> Result<url::Url> {
        let org = organization.to_lowercase();
        let name = package.to_lowercase();
        let mut segments = vec!["v2", org.as_str()];
        segments.extend(name.split('/'));
        segments.extend_from_slice(tail);
        segments_url(&self.endpoints.container, segments)
    }

    fn package_url(
        &self,
        organization: &str,
        kind: PackageType,
        package: &str,
        tail: &[&str],
    ) -> Result<url::Url> {
        let mut segments = vec!["orgs", organization, "packages", kind.as_str(), package];
        segments.extend_from_slice(tail);
        segments_url(&self.endpoints.rest, segments)
    }

    async fn listed_version_exists(
        &self,
        organization: &str,
        kind: PackageType,
        package: &str,
        version: &str,
    ) -> Result<bool> {
        let base = self.package_url(organization, kind, package, &["versions"])?;
        let mut page = 1usize;
        loop {
            let mut url = base.clone();
            url.query_pairs_mut()
                .append_pair("per_page", &VERSIONS_PER_PAGE.to_string())
                .append_pair("page", &page.to_string());

            let response = self
                .client
                .get(url)
                .header(ACCEPT, GITHUB_JSON)
                .bearer_auth(&self.token)
                .send()
                .await
                .map_err(|e| HttpErrorHandler::handle_network_error(&e, "version listing"))?;
            if response.status() == StatusCode::NOT_FOUND {
                return Ok(false);
            }
            let response = HttpErrorHandler::check(response, "version listing").await?;
            let entries: Vec<VersionEntry> = response.json().await?;

            if entries.iter().any(|e| e.name == version) {
                return Ok(true);
            }
            if entries.len() < VERSIONS_PER_PAGE {
                return Ok(false);
            }
            page += 1;
        }
    }
}

#[async_trait]
impl ArtifactSource for RegistryClient {
    async fn download(&self, file: &File) -> Result<Vec<u8>> {
        if file.url.is_empty() {
            return Err(SyncError::Network(format!(
                "file {} has no download URL",
                file.name
            )));
        }
        self.output.detail(&format!("Downloading {}", file.name));
        let context = format!("download of {}", file.name);
        let response = self.send(self.client.get(&file.url), &context).await?;
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }

    async fn package_visibility(
        &self,
        organization: &str,
        kind: PackageType,
        package: &str,
    ) -> Result<Option<Visibility>> {
        let url = self.package_url(organization, kind, package, &[])?;
        let response = self
            .client
            .get(url)
            .header(ACCEPT, GITHUB_JSON)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| HttpErrorHandler::handle_network_error(&e, "package lookup"))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = HttpErrorHandler::check(response, "package lookup").await?;
        let entry: PackageEntry = response.json().await?;
        Ok(entry.visibility.as_deref().and_then(Visibility::from_api))
    }
}

#[async_trait]
impl ArtifactTarget for RegistryClient {
    async fn version_exists(
        &self,
        organization: &str,
        kind: PackageType,
        package: &str,
        version: &str,
    ) -> Result<bool> {
        match kind {
            PackageType::Container => {
                let url = self.oci_url(organization, package, &["manifests", version])?;
                self.probe(
                    self.client.head(url).header(ACCEPT, MEDIA_TYPE_MANIFEST),
                    "manifest existence check",
                )
                .await
            }
            _ => {
                self.listed_version_exists(organization, kind, package, version)
                    .await
            }
        }
    }

    async fn blob_exists(&self, organization: &str, package: &str, digest: &str) -> Result<bool> {
        let digest = normalize_digest(digest);
        let url = self.oci_url(organization, package, &["blobs", &digest])?;
        self.probe(self.client.head(url), "blob existence check").await
    }

    async fn upload_blob(
        &self,
        organization: &str,
        package: &str,
        digest: &str,
        data: &[u8],
    ) -> Result<()> {
        let digest = normalize_digest(digest);
        let start_url = self.oci_url(organization, package, &["blobs", "uploads", ""])?;
        let response = self
            .send(self.client.post(start_url.clone()), "blob upload start")
            .await?;

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                SyncError::Registry("blob upload start returned no Location header".to_string())
            })?;
        let mut upload_url = start_url.join(location)?;
        upload_url.query_pairs_mut().append_pair("digest", &digest);

        self.send(
            self.client
                .put(upload_url)
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(data.to_vec()),
            "blob upload",
        )
        .await?;
        self.output.detail(&format!(
            "Uploaded blob {} ({})",
            digest,
            self.output.format_size(data.len() as u64)
        ));
        Ok(())
    }

    async fn upload_manifest(
        &self,
        organization: &str,
        package: &str,
        reference: &str,
        media_type: &str,
        manifest: &[u8],
    ) -> Result<()> {
        let url = self.oci_url(organization, package, &["manifests", reference])?;
        self.send(
            self.client
                .put(url)
                .header(CONTENT_TYPE, media_type)
                .body(manifest.to_vec()),
            "manifest upload",
        )
        .await?;
        Ok(())
    }

    async fn publish_npm(
        &self,
        _organization: &str,
        package: &str,
        document: &serde_json::Value,
    ) -> Result<()> {
        let url = segments_url(&self.endpoints.npm, [package])?;
        self.send(self.client.put(url).json(document), "npm publish")
            .await?;
        Ok(())
    }

    async fn put_maven_file(
        &self,
        organization: &str,
        repository: &str,
        path: &str,
        data: &[u8],
    ) -> Result<()> {
        let mut segments = vec![organization, repository];
        segments.extend(path.split('/').filter(|s| !s.is_empty()));
        let url = segments_url(&self.endpoints.maven, segments)?;
        self.send(
            self.client
                .put(url)
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(data.to_vec()),
            "maven upload",
        )
        .await?;
        Ok(())
    }

    async fn push_nuget(&self, organization: &str, file_name: &str, data: &[u8]) -> Result<()> {
        let url = segments_url(&self.endpoints.nuget, [organization, "upload"])?;
        let part = reqwest::multipart::Part::bytes(data.to_vec())
            .file_name(file_name.to_string())
            .mime_str("application/octet-stream")?;
        let form = reqwest::multipart::Form::new().part("package", part);
        self.send(
            self.client
                .put(url)
                .header("X-NuGet-ApiKey", &self.token)
                .multipart(form),
            "nuget push",
        )
        .await?;
        Ok(())
    }

    async fn push_gem(&self, organization: &str, data: &[u8]) -> Result<()> {
        let url = segments_url(&self.endpoints.rubygems, [organization, "api", "v1", "gems"])?;
        self.send(
            self.client
                .post(url)
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(data.to_vec()),
            "gem push",
        )
        .await?;
        Ok(())
    }

    async fn update_version_metadata(
        &self,
        organization: &str,
        kind: PackageType,
        package: &str,
        version: &str,
        metadata: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        let url = self.package_url(organization, kind, package, &["versions", version])?;
        self.send(
            self.client
                .patch(url)
                .header(ACCEPT, GITHUB_JSON)
                .json(&json!({ "metadata": metadata })),
            "version metadata update",
        )
        .await
        .map_err(|e| SyncError::MetadataPropagation(e.to_string()))?;
        Ok(())
    }

    async fn update_visibility(
        &self,
        organization: &str,
        kind: PackageType,
        package: &str,
        visibility: Visibility,
    ) -> Result<()> {
        let url = self.package_url(organization, kind, package, &[])?;
        self.send(
            self.client
                .patch(url)
                .header(ACCEPT, GITHUB_JSON)
                .json(&json!({ "visibility": visibility.as_str() })),
            "visibility update",
        )
        .await
        .map_err(|e| SyncError::VisibilityPropagation(e.to_string()))?;
        Ok(())
    }
}
