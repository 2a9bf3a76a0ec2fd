//! In-memory registries shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use package_sync::catalog::{CatalogSource, PackagePage, RateLimit};
use package_sync::model::{File, Package, PackageType, Statistics, Version, Visibility};
use package_sync::registry::{ArtifactSource, ArtifactTarget};
use package_sync::{Result, SyncError};
use flate2::Compression;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{Cursor, Write};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub fn digest_of(data: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(data)))
}

/// Catalog serving fixed pages behind a scripted rate-limit budget
pub struct FakeCatalog {
    pages: Vec<PackagePage>,
    rate_limits: Mutex<VecDeque<RateLimit>>,
    pub page_requests: Mutex<Vec<tokio::time::Instant>>,
    pub fail_page: Option<usize>,
}

impl FakeCatalog {
    pub fn single_page(packages: Vec<Package>) -> Self {
        Self::paged(vec![packages])
    }

    pub fn paged(pages: Vec<Vec<Package>>) -> Self {
        let count = pages.len();
        let pages = pages
            .into_iter()
            .enumerate()
            .map(|(i, nodes)| PackagePage {
                nodes,
                has_next_page: i + 1 < count,
                end_cursor: (i + 1 < count).then(|| format!("cursor-{}", i + 1)),
            })
            .collect();
        Self {
            pages,
            rate_limits: Mutex::new(VecDeque::new()),
            page_requests: Mutex::new(Vec::new()),
            fail_page: None,
        }
    }

    pub fn with_rate_limits(self, limits: Vec<RateLimit>) -> Self {
        *self.rate_limits.lock().unwrap() = limits.into();
        self
    }

    pub fn failing_on_page(mut self, page: usize) -> Self {
        self.fail_page = Some(page);
        self
    }

    pub fn request_count(&self) -> usize {
        self.page_requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CatalogSource for FakeCatalog {
    async fn rate_limit(&self) -> Result<RateLimit> {
        let scripted = self.rate_limits.lock().unwrap().pop_front();
        Ok(scripted.unwrap_or(RateLimit {
            remaining: 5000,
            reset_at: Utc::now(),
        }))
    }

    async fn fetch_page(
        &self,
        _organization: &str,
        filter: Option<PackageType>,
        cursor: Option<&str>,
        _page_size: u32,
    ) -> Result<PackagePage> {
        let index = {
            let mut requests = self.page_requests.lock().unwrap();
            requests.push(tokio::time::Instant::now());
            requests.len() - 1
        };
        if self.fail_page == Some(index) {
            return Err(SyncError::Network("connection reset by peer".to_string()));
        }
        let expected_cursor = (index > 0).then(|| format!("cursor-{}", index));
        assert_eq!(cursor.map(str::to_string), expected_cursor);

        let mut page = self.pages[index].clone();
        if let Some(kind) = filter {
            page.nodes.retain(|p| p.kind().ok() == Some(kind));
        }
        Ok(page)
    }
}

/// Source registry serving bytes by URL, with scripted transient failures
#[derive(Default)]
pub struct FakeSource {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    failures: Mutex<HashMap<String, u32>>,
    visibilities: Mutex<HashMap<String, Visibility>>,
    crashing_lookups: Mutex<HashSet<String>>,
    pub downloads: Mutex<HashMap<String, u32>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `data` and return the catalog entry describing it
    pub fn file(&self, name: &str, data: &[u8]) -> File {
        let url = format!("https://source.test/{}/{}", self.blobs.lock().unwrap().len(), name);
        self.blobs.lock().unwrap().insert(url.clone(), data.to_vec());
        File {
            name: name.to_string(),
            size: data.len() as u64,
            sha256: Some(hex::encode(Sha256::digest(data))),
            url,
        }
    }

    /// Make the next `count` downloads of `file` fail
    pub fn fail_next(&self, file: &File, count: u32) {
        self.failures.lock().unwrap().insert(file.url.clone(), count);
    }

    /// Report `visibility` for `package` from the package lookup
    pub fn set_visibility(&self, package: &str, visibility: Visibility) {
        self.visibilities
            .lock()
            .unwrap()
            .insert(package.to_string(), visibility);
    }

    /// Make the package lookup for `package` panic
    pub fn crash_on_visibility_lookup(&self, package: &str) {
        self.crashing_lookups.lock().unwrap().insert(package.to_string());
    }

    pub fn download_count(&self, file: &File) -> u32 {
        self.downloads.lock().unwrap().get(&file.url).copied().unwrap_or(0)
    }

    pub fn total_downloads(&self) -> u32 {
        self.downloads.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl ArtifactSource for FakeSource {
    async fn download(&self, file: &File) -> Result<Vec<u8>> {
        *self.downloads.lock().unwrap().entry(file.url.clone()).or_default() += 1;

        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(&file.url) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(SyncError::Network(format!("{} timed out", file.name)));
                }
            }
        }

        self.blobs
            .lock()
            .unwrap()
            .get(&file.url)
            .cloned()
            .ok_or_else(|| SyncError::Registry(format!("Resource not found for download of {}", file.name)))
    }

    async fn package_visibility(
        &self,
        _organization: &str,
        _kind: PackageType,
        package: &str,
    ) -> Result<Option<Visibility>> {
        if self.crashing_lookups.lock().unwrap().contains(package) {
            panic!("lookup of {} crashed", package);
        }
        Ok(self.visibilities.lock().unwrap().get(package).copied())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetEvent {
    BlobUpload { package: String, digest: String },
    Manifest { package: String, reference: String, manifest: String },
    NpmPublish { package: String, document: String },
    MavenFile { repository: String, path: String },
    NugetPush { file_name: String },
    GemPush { size: usize },
    Metadata { package: String, version: String },
    Visibility { package: String, visibility: String },
}

/// Target registry recording every mutation
#[derive(Default)]
pub struct FakeTarget {
    pub events: Mutex<Vec<TargetEvent>>,
    blobs: Mutex<HashSet<(String, String)>>,
    existing_versions: Mutex<HashSet<(String, String)>>,
    pub blob_probes: Mutex<Vec<String>>,
    publish_delay: Option<Duration>,
    in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
    pub fail_metadata: bool,
    pub fail_visibility: bool,
}

impl FakeTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_publish_delay(mut self, delay: Duration) -> Self {
        self.publish_delay = Some(delay);
        self
    }

    pub fn with_existing_version(self, package: &str, version: &str) -> Self {
        self.existing_versions
            .lock()
            .unwrap()
            .insert((package.to_string(), version.to_string()));
        self
    }

    pub fn failing_propagation(mut self) -> Self {
        self.fail_metadata = true;
        self.fail_visibility = true;
        self
    }

    pub fn events(&self) -> Vec<TargetEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn blob_uploads_of(&self, digest: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, TargetEvent::BlobUpload { digest: d, .. } if d == digest))
            .count()
    }

    pub fn manifests(&self) -> Vec<(String, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                TargetEvent::Manifest { package, reference, .. } => Some((package, reference)),
                _ => None,
            })
            .collect()
    }

    pub fn published_packages(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .events()
            .into_iter()
            .filter_map(|e| match e {
                TargetEvent::Manifest { package, .. } | TargetEvent::NpmPublish { package, .. } => {
                    Some(package)
                }
                _ => None,
            })
            .collect();
        names.sort();
        names.dedup();
        names
    }

    fn record(&self, event: TargetEvent) {
        self.events.lock().unwrap().push(event);
    }

    async fn publishing(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.publish_delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ArtifactTarget for FakeTarget {
    async fn version_exists(
        &self,
        _organization: &str,
        _kind: PackageType,
        package: &str,
        version: &str,
    ) -> Result<bool> {
        Ok(self
            .existing_versions
            .lock()
            .unwrap()
            .contains(&(package.to_string(), version.to_string())))
    }

    async fn blob_exists(&self, _organization: &str, package: &str, digest: &str) -> Result<bool> {
        self.blob_probes.lock().unwrap().push(digest.to_string());
        Ok(self
            .blobs
            .lock()
            .unwrap()
            .contains(&(package.to_string(), digest.to_string())))
    }

    async fn upload_blob(
        &self,
        _organization: &str,
        package: &str,
        digest: &str,
        data: &[u8],
    ) -> Result<()> {
        assert_eq!(digest_of(data), digest);
        // Let another task run between probe and store.
        tokio::task::yield_now().await;
        self.blobs
            .lock()
            .unwrap()
            .insert((package.to_string(), digest.to_string()));
        self.record(TargetEvent::BlobUpload {
            package: package.to_string(),
            digest: digest.to_string(),
        });
        Ok(())
    }

    async fn upload_manifest(
        &self,
        _organization: &str,
        package: &str,
        reference: &str,
        _media_type: &str,
        manifest: &[u8],
    ) -> Result<()> {
        self.publishing().await;
        self.record(TargetEvent::Manifest {
            package: package.to_string(),
            reference: reference.to_string(),
            manifest: String::from_utf8_lossy(manifest).into_owned(),
        });
        Ok(())
    }

    async fn publish_npm(
        &self,
        _organization: &str,
        package: &str,
        document: &serde_json::Value,
    ) -> Result<()> {
        self.publishing().await;
        self.record(TargetEvent::NpmPublish {
            package: package.to_string(),
            document: document.to_string(),
        });
        Ok(())
    }

    async fn put_maven_file(
        &self,
        _organization: &str,
        repository: &str,
        path: &str,
        _data: &[u8],
    ) -> Result<()> {
        self.record(TargetEvent::MavenFile {
            repository: repository.to_string(),
            path: path.to_string(),
        });
        Ok(())
    }

    async fn push_nuget(&self, _organization: &str, file_name: &str, _data: &[u8]) -> Result<()> {
        self.record(TargetEvent::NugetPush {
            file_name: file_name.to_string(),
        });
        Ok(())
    }

    async fn push_gem(&self, _organization: &str, data: &[u8]) -> Result<()> {
        self.record(TargetEvent::GemPush { size: data.len() });
        Ok(())
    }

    async fn update_version_metadata(
        &self,
        _organization: &str,
        _kind: PackageType,
        package: &str,
        version: &str,
        _metadata: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        if self.fail_metadata {
            return Err(SyncError::Registry("metadata endpoint unavailable".to_string()));
        }
        self.record(TargetEvent::Metadata {
            package: package.to_string(),
            version: version.to_string(),
        });
        Ok(())
    }

    async fn update_visibility(
        &self,
        _organization: &str,
        _kind: PackageType,
        package: &str,
        visibility: Visibility,
    ) -> Result<()> {
        if self.fail_visibility {
            return Err(SyncError::Registry("visibility endpoint unavailable".to_string()));
        }
        self.record(TargetEvent::Visibility {
            package: package.to_string(),
            visibility: visibility.to_string(),
        });
        Ok(())
    }
}

pub fn package(name: &str, kind: PackageType, versions: Vec<Version>) -> Package {
    Package {
        id: format!("P_{}", name),
        name: name.to_string(),
        package_type: kind.graphql_name().to_string(),
        visibility: None,
        repository: None,
        statistics: Statistics::default(),
        versions,
    }
}

pub fn version(name: &str, files: Vec<File>) -> Version {
    Version {
        id: format!("V_{}", name),
        name: name.to_string(),
        created_at: Some("2024-03-01T10:00:00Z".to_string()),
        updated_at: None,
        files,
        metadata: serde_json::Map::new(),
    }
}

/// Container version with one layer per entry in `layers`
pub fn container_version(source: &FakeSource, name: &str, layers: &[&[u8]]) -> Version {
    let files = layers
        .iter()
        .enumerate()
        .map(|(i, data)| source.file(&format!("layer{}.tar.gz", i), data))
        .collect();
    version(name, files)
}

/// npm version with a matching `package.json` and tarball
pub fn npm_version(source: &FakeSource, package_name: &str, name: &str) -> Version {
    let manifest = format!(r#"{{"name":"{}","version":"{}"}}"#, package_name, name);
    let files = vec![
        source.file("package.json", manifest.as_bytes()),
        source.file(&format!("pkg-{}.tgz", name), format!("tarball {}", name).as_bytes()),
    ];
    version(name, files)
}

/// Maven version of `com.acme:core` with a POM, a jar and a source checksum
pub fn maven_version(source: &FakeSource, name: &str) -> Version {
    let pom = format!(
        "<project><groupId>com.acme</groupId><artifactId>core</artifactId><version>{}</version></project>",
        name
    );
    let jar = format!("jar {}", name);
    let files = vec![
        source.file("pom.xml", pom.as_bytes()),
        source.file(&format!("core-{}.jar", name), jar.as_bytes()),
        source.file(
            &format!("core-{}.jar.sha1", name),
            hex::encode(sha1::Sha1::digest(jar.as_bytes())).as_bytes(),
        ),
    ];
    version(name, files)
}

/// NuGet version of `Acme.Core` whose `.nupkg` embeds the `.nuspec`
pub fn nuget_version(source: &FakeSource, name: &str) -> Version {
    let nuspec = format!(
        r#"<?xml version="1.0"?><package><metadata><id>Acme.Core</id><version>{}</version></metadata></package>"#,
        name
    );
    let mut archive = Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut archive);
        writer
            .start_file("Acme.Core.nuspec", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(nuspec.as_bytes()).unwrap();
        writer.finish().unwrap();
    }
    let files = vec![
        source.file(&format!("acme.core.{}.nupkg", name), &archive.into_inner()),
        source.file("Acme.Core.nuspec", nuspec.as_bytes()),
    ];
    version(name, files)
}

/// RubyGems version of `widget` whose `.gem` carries `metadata.gz`
pub fn gem_version(source: &FakeSource, name: &str) -> Version {
    let spec = format!(
        "--- !ruby/object:Gem::Specification\nname: widget\nversion: !ruby/object:Gem::Version\n  version: {}\n",
        name
    );
    let mut gz = GzEncoder::new(Vec::new(), Compression::default());
    gz.write_all(spec.as_bytes()).unwrap();
    let metadata = gz.finish().unwrap();

    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_size(metadata.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, "metadata.gz", metadata.as_slice())
        .unwrap();
    let gem = builder.into_inner().unwrap();

    let files = vec![
        source.file(&format!("widget-{}.gem", name), &gem),
        source.file("widget.gemspec", spec.as_bytes()),
    ];
    version(name, files)
}
