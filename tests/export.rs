mod common;

use common::{FakeCatalog, FakeSource, npm_version, package};
use package_sync::PackageType;
use package_sync::config::{DEFAULT_DOWNLOAD_CONCURRENCY, Endpoints, ExportConfig, RetryConfig};
use package_sync::export::Exporter;
use package_sync::logging::Logger;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn config(output_dir: &Path, download_dir: Option<&Path>) -> ExportConfig {
    ExportConfig {
        organization: "acme".to_string(),
        token: "token".to_string(),
        file_prefix: None,
        package_type: None,
        endpoints: Endpoints::default(),
        output_dir: output_dir.to_path_buf(),
        download_dir: download_dir.map(Path::to_path_buf),
        download_concurrency: DEFAULT_DOWNLOAD_CONCURRENCY,
        page_size: 100,
        retry: RetryConfig {
            max_attempts: 2,
            delay: Duration::from_millis(5),
        },
        verbose: false,
    }
}

#[tokio::test]
async fn writes_csvs_and_downloads_every_file() {
    let dir = tempfile::tempdir().unwrap();
    let downloads = dir.path().join("downloads");
    let source = Arc::new(FakeSource::new());
    let catalog = Arc::new(FakeCatalog::single_page(vec![package(
        "@acme/web",
        PackageType::Npm,
        vec![
            npm_version(&source, "@acme/web", "1.0.0"),
            npm_version(&source, "@acme/web", "1.1.0"),
        ],
    )]));

    let summary = Exporter::new(catalog, source.clone(), Logger::new_quiet())
        .run(&config(dir.path(), Some(&downloads)), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.packages, 1);
    assert_eq!(summary.versions, 2);
    assert_eq!(summary.files_downloaded, 4);
    assert!(summary.failures.is_empty());
    assert!(dir.path().join("acme_packages.csv").is_file());

    let versions = std::fs::read_to_string(dir.path().join("acme_versions.csv")).unwrap();
    assert_eq!(versions.lines().count(), 3);

    let version_dir = downloads.join("npm").join("@acme_web").join("1.1.0");
    assert!(version_dir.join("package.json").is_file());
    assert!(version_dir.join("pkg-1.1.0.tgz").is_file());
    let metadata: serde_json::Value =
        serde_json::from_slice(&std::fs::read(version_dir.join("metadata.json")).unwrap()).unwrap();
    assert_eq!(metadata["version"]["name"], "1.1.0");
}

#[tokio::test]
async fn second_export_skips_files_already_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let downloads = dir.path().join("downloads");
    let source = Arc::new(FakeSource::new());
    let packages = vec![package(
        "@acme/web",
        PackageType::Npm,
        vec![npm_version(&source, "@acme/web", "1.0.0")],
    )];
    let config = config(dir.path(), Some(&downloads));

    for _ in 0..2 {
        let catalog = Arc::new(FakeCatalog::single_page(packages.clone()));
        Exporter::new(catalog, source.clone(), Logger::new_quiet())
            .run(&config, &CancellationToken::new())
            .await
            .unwrap();
    }

    assert_eq!(source.total_downloads(), 2);
}

#[tokio::test]
async fn failed_download_is_reported_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(FakeSource::new());
    let version = npm_version(&source, "@acme/web", "1.0.0");
    source.fail_next(&version.files[1], 10);
    let catalog = Arc::new(FakeCatalog::single_page(vec![package(
        "@acme/web",
        PackageType::Npm,
        vec![version],
    )]));

    let summary = Exporter::new(catalog, source, Logger::new_quiet())
        .run(&config(dir.path(), Some(&dir.path().join("dl"))), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.files_downloaded, 1);
    assert_eq!(summary.failures.len(), 1);
    assert!(summary.failures[0].contains("pkg-1.0.0.tgz"));
}

#[tokio::test]
async fn csv_only_export_downloads_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(FakeSource::new());
    let catalog = Arc::new(FakeCatalog::single_page(vec![package(
        "@acme/web",
        PackageType::Npm,
        vec![npm_version(&source, "@acme/web", "1.0.0")],
    )]));

    let summary = Exporter::new(catalog, source.clone(), Logger::new_quiet())
        .run(&config(dir.path(), None), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.files_downloaded, 0);
    assert_eq!(source.total_downloads(), 0);
    assert_eq!(summary.packages_csv, dir.path().join("acme_packages.csv"));
}
