//! Package-type specific upload strategies
//!
//! One strategy per [`PackageType`], selected by an exhaustive match.

use crate::descriptor;
use crate::error::{Result, SyncError};
use crate::logging::Logger;
use crate::model::{LocalFile, PackageType};
use crate::registry::{
    ArtifactTarget, MEDIA_TYPE_CONFIG, MEDIA_TYPE_LAYER, MEDIA_TYPE_MANIFEST,
};
use crate::transfer::{RetryPolicy, TransferSpec};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures::future::try_join_all;
use md5::Md5;
use serde_json::{Map, Value, json};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

const CONTAINER_DESCRIPTOR_FILES: [&str; 2] = ["manifest.json", "config.json"];
const CHECKSUM_SUFFIXES: [&str; 5] = [".md5", ".sha1", ".sha256", ".sha512", ".asc"];
const HISTORY_COMMENT: &str = "Imported by package-sync";

/// Serializes probe-then-upload per layer digest so a second reference to
/// the same digest observes the first upload through the existence probe
#[derive(Debug, Default)]
pub struct LayerLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl LayerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(key.to_string()).or_default().clone()
    }

    /// Drop `key` once no other task holds its lock
    fn release(&self, key: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // One reference in the map, one in `lock`.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
    }
}

/// Shared collaborators for one version upload
pub struct UploadContext<'a> {
    pub target: &'a dyn ArtifactTarget,
    pub retry: &'a RetryPolicy,
    pub cancel: &'a CancellationToken,
    pub output: &'a Logger,
    pub layer_locks: &'a LayerLocks,
}

impl UploadContext<'_> {
    pub async fn upload(&self, spec: &TransferSpec) -> Result<()> {
        match spec.package_type {
            PackageType::Container => self.upload_container(spec).await,
            PackageType::Npm => self.upload_npm(spec).await,
            PackageType::Maven => self.upload_maven(spec).await,
            PackageType::NuGet => self.upload_nuget(spec).await,
            PackageType::RubyGems => self.upload_rubygems(spec).await,
        }
    }

    async fn upload_container(&self, spec: &TransferSpec) -> Result<()> {
        let layers: Vec<&LocalFile> = spec
            .files
            .iter()
            .filter(|f| !CONTAINER_DESCRIPTOR_FILES.contains(&f.name.as_str()))
            .collect();
        if layers.is_empty() {
            return Err(SyncError::Descriptor(format!(
                "container version {} has no layers",
                spec.version
            )));
        }

        let mut layer_refs = Vec::with_capacity(layers.len());
        for layer in layers {
            let digest = sha256_digest(&layer.data);
            self.ensure_blob(spec, &digest, &layer.data).await?;
            layer_refs.push((digest, layer.data.len() as u64));
        }

        let diff_ids: Vec<&str> = layer_refs.iter().map(|(d, _)| d.as_str()).collect();
        let config = container_config(&diff_ids, spec.metadata.get("created"));
        let config_bytes = serde_json::to_vec(&config)?;
        let config_digest = sha256_digest(&config_bytes);
        self.ensure_blob(spec, &config_digest, &config_bytes).await?;

        let manifest = container_manifest(
            (&config_digest, config_bytes.len() as u64),
            &layer_refs,
            &spec.metadata,
        );
        let manifest_bytes = serde_json::to_vec(&manifest)?;

        self.retry
            .run("manifest upload", self.cancel, self.output, |_| {
                self.target.upload_manifest(
                    &spec.target_organization,
                    &spec.target_package,
                    &spec.version,
                    MEDIA_TYPE_MANIFEST,
                    &manifest_bytes,
                )
            })
            .await
    }

    /// Upload a blob unless the target already has it
    async fn ensure_blob(&self, spec: &TransferSpec, digest: &str, data: &[u8]) -> Result<()> {
        let key = format!(
            "{}/{}@{}",
            spec.target_organization, spec.target_package, digest
        );
        let lock = self.layer_locks.lock_for(&key);
        let result = {
            let guard = tokio::select! {
                _ = self.cancel.cancelled() => None,
                guard = lock.lock() => Some(guard),
            };
            match guard {
                Some(_) => self.upload_blob_once(spec, digest, data).await,
                None => Err(SyncError::Cancelled),
            }
        };
        self.layer_locks.release(&key, lock);
        result
    }

    async fn upload_blob_once(&self, spec: &TransferSpec, digest: &str, data: &[u8]) -> Result<()> {
        self.retry
            .run("layer upload", self.cancel, self.output, |_| async move {
                let exists = self
                    .target
                    .blob_exists(&spec.target_organization, &spec.target_package, digest)
                    .await?;
                if exists {
                    self.output
                        .detail(&format!("Layer {} already present, skipping", digest));
                    return Ok(());
                }
                self.target
                    .upload_blob(&spec.target_organization, &spec.target_package, digest, data)
                    .await
            })
            .await
    }

    async fn upload_npm(&self, spec: &TransferSpec) -> Result<()> {
        let parsed = descriptor::parse(PackageType::Npm, &spec.files)?;
        parsed.ensure_version(&spec.version)?;

        let manifest_file = find_named(&spec.files, "package.json")?;
        let tarball = find_suffix(&spec.files, ".tgz")?;
        let manifest: Value = serde_json::from_slice(&manifest_file.data)?;
        let document = npm_publish_document(manifest, &spec.target_package, &spec.version, &tarball.data);

        self.retry
            .run("npm publish", self.cancel, self.output, |_| {
                self.target
                    .publish_npm(&spec.target_organization, &spec.target_package, &document)
            })
            .await
    }

    async fn upload_maven(&self, spec: &TransferSpec) -> Result<()> {
        let (group_id, artifact_id) = spec.target_package.split_once(':').ok_or_else(|| {
            SyncError::Descriptor(format!(
                "maven target name {} is not groupId:artifactId",
                spec.target_package
            ))
        })?;
        let parsed = descriptor::parse(PackageType::Maven, &spec.files)?;
        parsed.ensure_version(&spec.version)?;

        let repository = spec.repository.as_deref().unwrap_or(artifact_id);
        let base = maven_path(group_id, artifact_id, &spec.version);

        let pom = spec
            .files
            .iter()
            .find(|f| f.name == "pom.xml")
            .or_else(|| spec.files.iter().find(|f| f.name.ends_with(".pom")))
            .ok_or_else(|| SyncError::Descriptor("no pom.xml file in downloaded version".to_string()))?;
        let pom_name = format!("{}-{}.pom", artifact_id, spec.version);
        self.put_maven_with_checksums(spec, repository, &format!("{}/{}", base, pom_name), &pom.data)
            .await?;

        for file in &spec.files {
            if is_pom_file(&file.name) || is_checksum_file(&file.name) {
                continue;
            }
            self.put_maven_with_checksums(spec, repository, &format!("{}/{}", base, file.name), &file.data)
                .await?;
        }
        Ok(())
    }

    async fn put_maven_with_checksums(
        &self,
        spec: &TransferSpec,
        repository: &str,
        path: &str,
        data: &[u8],
    ) -> Result<()> {
        let org = spec.target_organization.as_str();
        self.retry
            .run("maven upload", self.cancel, self.output, |_| {
                self.target.put_maven_file(org, repository, path, data)
            })
            .await?;

        let checksums: Vec<(String, String)> = maven_checksums(data)
            .into_iter()
            .map(|(suffix, checksum)| (format!("{}{}", path, suffix), checksum))
            .collect();
        let uploads = checksums.iter().map(|(checksum_path, checksum)| {
            self.retry
                .run("maven checksum upload", self.cancel, self.output, move |_| {
                    self.target
                        .put_maven_file(org, repository, checksum_path, checksum.as_bytes())
                })
        });
        try_join_all(uploads).await?;
        Ok(())
    }

    async fn upload_nuget(&self, spec: &TransferSpec) -> Result<()> {
        let parsed = descriptor::parse(PackageType::NuGet, &spec.files)?;
        parsed.ensure_version(&spec.version)?;
        let archive = find_suffix(&spec.files, ".nupkg")?;

        self.retry
            .run("nuget push", self.cancel, self.output, |_| {
                self.target
                    .push_nuget(&spec.target_organization, &archive.name, &archive.data)
            })
            .await
    }

    async fn upload_rubygems(&self, spec: &TransferSpec) -> Result<()> {
        let parsed = descriptor::parse(PackageType::RubyGems, &spec.files)?;
        parsed.ensure_version(&spec.version)?;
        let gem = find_suffix(&spec.files, ".gem")?;

        self.retry
            .run("gem push", self.cancel, self.output, |_| {
                self.target.push_gem(&spec.target_organization, &gem.data)
            })
            .await
    }
}

pub fn sha256_digest(data: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(data)))
}

fn container_config(diff_ids: &[&str], created: Option<&Value>) -> Value {
    json!({
        "architecture": "amd64",
        "os": "linux",
        "rootfs": {
            "type": "layers",
            "diff_ids": diff_ids,
        },
        "history": [{
            "created": created.cloned().unwrap_or(Value::Null),
            "comment": HISTORY_COMMENT,
        }],
    })
}

fn container_manifest(
    config: (&str, u64),
    layers: &[(String, u64)],
    metadata: &Map<String, Value>,
) -> Value {
    let layers: Vec<Value> = layers
        .iter()
        .map(|(digest, size)| json!({ "mediaType": MEDIA_TYPE_LAYER, "size": size, "digest": digest }))
        .collect();

    let mut manifest = json!({
        "schemaVersion": 2,
        "mediaType": MEDIA_TYPE_MANIFEST,
        "config": { "mediaType": MEDIA_TYPE_CONFIG, "size": config.1, "digest": config.0 },
        "layers": layers,
    });

    let annotations: Map<String, Value> = metadata
        .iter()
        .filter(|(_, v)| v.is_string())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if !annotations.is_empty() {
        manifest["annotations"] = Value::Object(annotations);
    }
    manifest
}

fn npm_publish_document(mut manifest: Value, target_name: &str, version: &str, tarball: &[u8]) -> Value {
    let shasum = hex::encode(Sha1::digest(tarball));
    let integrity = format!("sha512-{}", BASE64.encode(Sha512::digest(tarball)));
    let encoded = BASE64.encode(tarball);
    let attachment = format!("{}-{}.tgz", target_name, version);

    if let Some(obj) = manifest.as_object_mut() {
        obj.insert("name".to_string(), json!(target_name));
        obj.insert("_id".to_string(), json!(format!("{}@{}", target_name, version)));
        obj.insert("dist".to_string(), json!({ "shasum": shasum, "integrity": integrity }));
    }

    json!({
        "_id": target_name,
        "name": target_name,
        "dist-tags": { "latest": version },
        "versions": { version: manifest },
        "_attachments": {
            attachment: {
                "content_type": "application/octet-stream",
                "data": encoded,
                "length": tarball.len(),
            }
        },
    })
}

/// `group/path/artifact/version` layout path
pub fn maven_path(group_id: &str, artifact_id: &str, version: &str) -> String {
    format!("{}/{}/{}", group_id.replace('.', "/"), artifact_id, version)
}

fn maven_checksums(data: &[u8]) -> [(&'static str, String); 3] {
    [
        (".md5", hex::encode(Md5::digest(data))),
        (".sha1", hex::encode(Sha1::digest(data))),
        (".sha256", hex::encode(Sha256::digest(data))),
    ]
}

/// Both POM spellings land on the same `<artifact>-<version>.pom` path
fn is_pom_file(name: &str) -> bool {
    name == "pom.xml" || name.ends_with(".pom")
}

fn is_checksum_file(name: &str) -> bool {
    CHECKSUM_SUFFIXES.iter().any(|s| name.ends_with(s))
}

fn find_named<'a>(files: &'a [LocalFile], name: &str) -> Result<&'a LocalFile> {
    files
        .iter()
        .find(|f| f.name == name)
        .ok_or_else(|| SyncError::Descriptor(format!("no {} file in downloaded version", name)))
}

fn find_suffix<'a>(files: &'a [LocalFile], suffix: &str) -> Result<&'a LocalFile> {
    files
        .iter()
        .find(|f| f.name.ends_with(suffix))
        .ok_or_else(|| SyncError::Descriptor(format!("no {} file in downloaded version", suffix)))
}
