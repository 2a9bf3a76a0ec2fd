//! Catalog export to CSV with optional artifact download

use crate::catalog::{CatalogFetcher, CatalogSource};
use crate::concurrency::ConcurrencyController;
use crate::config::{ConcurrencyConfig, ExportConfig};
use crate::error::{Result, SyncError};
use crate::logging::Logger;
use crate::model::{File, Package, PackageType, Version};
use crate::registry::ArtifactSource;
use crate::transfer::RetryPolicy;
use crate::transfer::pipeline::verify_download;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const PACKAGE_HEADERS: [&str; 7] = [
    "ID",
    "Name",
    "Type",
    "Repository",
    "Repository URL",
    "Downloads Count",
    "Version Count",
];

const VERSION_HEADERS: [&str; 8] = [
    "Package ID",
    "Package Name",
    "Version ID",
    "Version",
    "Created At",
    "Updated At",
    "File Count",
    "Total Size",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub packages: usize,
    pub versions: usize,
    pub packages_csv: PathBuf,
    pub versions_csv: PathBuf,
    pub files_downloaded: usize,
    pub files_skipped: usize,
    pub bytes_downloaded: u64,
    pub failures: Vec<String>,
}

#[derive(Debug, Default)]
struct DownloadTally {
    downloaded: usize,
    skipped: usize,
    bytes: u64,
    failures: Vec<String>,
}

pub struct Exporter {
    catalog: Arc<dyn CatalogSource>,
    source: Arc<dyn ArtifactSource>,
    output: Logger,
}

impl Exporter {
    pub fn new(catalog: Arc<dyn CatalogSource>, source: Arc<dyn ArtifactSource>, output: Logger) -> Self {
        Self {
            catalog,
            source,
            output,
        }
    }

    pub async fn run(&self, config: &ExportConfig, cancel: &CancellationToken) -> Result<ExportSummary> {
        self.output
            .section(&format!("Exporting packages of {}", config.organization));

        let packages = CatalogFetcher::new(self.catalog.clone(), self.output.clone())
            .with_page_size(config.page_size)
            .fetch(&config.organization, config.package_type, cancel)
            .await?;

        std::fs::create_dir_all(&config.output_dir)?;
        let packages_csv = config
            .output_dir
            .join(format!("{}_packages.csv", config.prefix()));
        let versions_csv = config
            .output_dir
            .join(format!("{}_versions.csv", config.prefix()));
        write_packages_csv(&packages_csv, &packages)?;
        write_versions_csv(&versions_csv, &packages)?;
        self.output.success(&format!(
            "Wrote {} and {}",
            packages_csv.display(),
            versions_csv.display()
        ));

        let mut summary = ExportSummary {
            packages: packages.len(),
            versions: packages.iter().map(|p| p.versions.len()).sum(),
            packages_csv,
            versions_csv,
            ..ExportSummary::default()
        };

        if let Some(dir) = &config.download_dir {
            let tally = self
                .download_all(&packages, dir, config, cancel)
                .await;
            summary.files_downloaded = tally.downloaded;
            summary.files_skipped = tally.skipped;
            summary.bytes_downloaded = tally.bytes;
            summary.failures = tally.failures;

            self.output.summary_kv(
                "Download summary",
                &[
                    ("Downloaded", summary.files_downloaded.to_string()),
                    ("Skipped", summary.files_skipped.to_string()),
                    ("Bytes", self.output.format_size(summary.bytes_downloaded)),
                    ("Failures", summary.failures.len().to_string()),
                ],
            );
        }
        Ok(summary)
    }

    async fn download_all(
        &self,
        packages: &[Package],
        dir: &Path,
        config: &ExportConfig,
        cancel: &CancellationToken,
    ) -> DownloadTally {
        let controller = ConcurrencyController::new(
            ConcurrencyConfig {
                packages: 1,
                versions: config.download_concurrency,
            },
            self.output.clone(),
        );
        let retry = config.retry.policy();

        let jobs = packages.iter().flat_map(|package| {
            let shell = Arc::new(Package {
                versions: Vec::new(),
                ..package.clone()
            });
            package
                .versions
                .iter()
                .map(move |version| (shell.clone(), version.clone()))
        });

        let results = controller
            .run_versions(jobs, |(package, version)| {
                let source = self.source.clone();
                let output = self.output.clone();
                let cancel = cancel.clone();
                let dir = dir.to_path_buf();
                async move {
                    download_version(source, &package, &version, &dir, retry, &cancel, &output).await
                }
            })
            .await;

        let mut tally = DownloadTally::default();
        for result in results {
            match result {
                Ok(version_tally) => {
                    tally.downloaded += version_tally.downloaded;
                    tally.skipped += version_tally.skipped;
                    tally.bytes += version_tally.bytes;
                    tally.failures.extend(version_tally.failures);
                }
                Err(aborted) => tally.failures.push(aborted),
            }
        }
        tally
    }
}

async fn download_version(
    source: Arc<dyn ArtifactSource>,
    package: &Package,
    version: &Version,
    root: &Path,
    retry: RetryPolicy,
    cancel: &CancellationToken,
    output: &Logger,
) -> DownloadTally {
    let mut tally = DownloadTally::default();
    let dir = version_dir(root, package, version);

    if let Err(e) = tokio::fs::create_dir_all(&dir).await {
        tally
            .failures
            .push(format!("{}@{}: {}", package.name, version.name, e));
        return tally;
    }

    for file in &version.files {
        let path = dir.join(safe_component(&file.name));
        if already_downloaded(&path, file).await {
            output.detail(&format!("Skipping existing {}", path.display()));
            tally.skipped += 1;
            continue;
        }

        let fetched = retry
            .run(&format!("download of {}", file.name), cancel, output, |_| {
                let source = source.clone();
                async move {
                    let data = source.download(file).await?;
                    verify_download(file, &data)?;
                    Ok(data)
                }
            })
            .await;

        let written = match fetched {
            Ok(data) => tokio::fs::write(&path, &data)
                .await
                .map(|_| data.len() as u64)
                .map_err(SyncError::from),
            Err(e) => Err(e),
        };
        match written {
            Ok(bytes) => {
                tally.downloaded += 1;
                tally.bytes += bytes;
            }
            Err(e) => {
                output.error(&format!("{}@{} {}: {}", package.name, version.name, file.name, e));
                tally
                    .failures
                    .push(format!("{}@{} {}: {}", package.name, version.name, file.name, e));
            }
        }
    }

    let metadata = json!({
        "package": {
            "id": package.id,
            "name": package.name,
            "type": package.package_type,
            "repository": package.repository,
        },
        "version": version,
    });
    let written = serde_json::to_vec_pretty(&metadata)
        .map_err(SyncError::from)
        .map(|bytes| (dir.join("metadata.json"), bytes));
    let result = match written {
        Ok((path, bytes)) => tokio::fs::write(path, bytes).await.map_err(SyncError::from),
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        tally
            .failures
            .push(format!("{}@{} metadata.json: {}", package.name, version.name, e));
    }
    tally
}

async fn already_downloaded(path: &Path, file: &File) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(meta) => meta.is_file() && file.size > 0 && meta.len() == file.size,
        Err(_) => false,
    }
}

/// `<root>/<type>/<package>/<version>`
pub fn version_dir(root: &Path, package: &Package, version: &Version) -> PathBuf {
    let type_dir = package
        .package_type
        .parse::<PackageType>()
        .map(|t| t.as_str().to_string())
        .unwrap_or_else(|_| package.package_type.to_lowercase());
    root.join(safe_component(&type_dir))
        .join(safe_component(&package.name))
        .join(safe_component(&version.name))
}

/// Single path component with separators and parent references neutralized
pub fn safe_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

pub fn write_packages_csv(path: &Path, packages: &[Package]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(PACKAGE_HEADERS)?;
    for package in packages {
        let (repo_name, repo_url) = package
            .repository
            .as_ref()
            .map(|r| (r.name.as_str(), r.url.as_str()))
            .unwrap_or(("", ""));
        let downloads = package.statistics.downloads_total_count.to_string();
        let version_count = package.versions.len().to_string();
        writer.write_record([
            package.id.as_str(),
            package.name.as_str(),
            package.package_type.as_str(),
            repo_name,
            repo_url,
            downloads.as_str(),
            version_count.as_str(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_versions_csv(path: &Path, packages: &[Package]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(VERSION_HEADERS)?;
    for package in packages {
        for version in &package.versions {
            let file_count = version.files.len().to_string();
            let total_size = version.total_size().to_string();
            writer.write_record([
                package.id.as_str(),
                package.name.as_str(),
                version.id.as_str(),
                version.name.as_str(),
                version.created_at.as_deref().unwrap_or(""),
                version.updated_at.as_deref().unwrap_or(""),
                file_count.as_str(),
                total_size.as_str(),
            ])?;
        }
    }
    writer.flush()?;
    Ok(())
}
