//! Subcommand runner wiring configuration, clients and engines together

use crate::catalog::GraphQlCatalogClient;
use crate::cli::args::{Cli, Command, ExportArgs, SyncArgs};
use crate::config::{Endpoints, ExportConfig, SyncConfig};
use crate::error::Result;
use crate::export::Exporter;
use crate::logging::Logger;
use crate::mapping::NameMapping;
use crate::registry::RegistryClient;
use crate::sync::{SyncEngine, SyncOptions};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct Runner {
    cli: Cli,
    output: Logger,
}

impl Runner {
    pub fn new(cli: Cli) -> Self {
        let output = Logger::new(cli.verbose);
        Self { cli, output }
    }

    pub async fn run(&self) -> Result<()> {
        let cancel = CancellationToken::new();
        self.cancel_on_interrupt(cancel.clone());

        match &self.cli.command {
            Command::Export(args) => self.run_export(args, &cancel).await,
            Command::Sync(args) => self.run_sync(args, &cancel).await,
        }
    }

    fn cancel_on_interrupt(&self, cancel: CancellationToken) {
        let output = self.output.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                output.warning("Interrupt received, cancelling in-flight transfers");
                cancel.cancel();
            }
        });
    }

    async fn run_sync(&self, args: &SyncArgs, cancel: &CancellationToken) -> Result<()> {
        let config = args.to_config(self.cli.verbose)?;
        self.print_sync_plan(&config);

        let mapping = match &config.mapping_file {
            Some(path) => {
                let mapping = NameMapping::load(path)?;
                self.output
                    .info(&format!("Loaded {} name mapping(s) from {}", mapping.len(), path.display()));
                mapping
            }
            None => NameMapping::empty(),
        };

        let source = Arc::new(self.registry_client(&config.source_endpoints, &config.source_token)?);
        let target = Arc::new(self.registry_client(&config.target_endpoints, &config.target_token)?);
        let catalog = Arc::new(GraphQlCatalogClient::new(
            source.http().clone(),
            config.source_endpoints.graphql.clone(),
            config.source_token.clone(),
        ));

        let engine = SyncEngine::new(
            catalog,
            source,
            target,
            SyncOptions::from(&config),
            self.output.clone(),
        )
        .with_mapping(mapping);

        let summary = engine.run(cancel).await?;
        println!("{}", summary.render());
        Ok(())
    }

    async fn run_export(&self, args: &ExportArgs, cancel: &CancellationToken) -> Result<()> {
        let config = args.to_config(self.cli.verbose)?;
        self.print_export_plan(&config);

        let source = Arc::new(self.registry_client(&config.endpoints, &config.token)?);
        let catalog = Arc::new(GraphQlCatalogClient::new(
            source.http().clone(),
            config.endpoints.graphql.clone(),
            config.token.clone(),
        ));

        let summary = Exporter::new(catalog, source, self.output.clone())
            .run(&config, cancel)
            .await?;

        self.output.success(&format!(
            "Exported {} package(s) and {} version(s) in {}",
            summary.packages,
            summary.versions,
            self.output.format_duration(self.output.elapsed())
        ));
        for failure in &summary.failures {
            self.output.warning(failure);
        }
        Ok(())
    }

    fn registry_client(&self, endpoints: &Endpoints, token: &str) -> Result<RegistryClient> {
        RegistryClient::builder(endpoints.clone())
            .with_token(token)
            .with_logger(self.output.clone())
            .build()
    }

    fn print_sync_plan(&self, config: &SyncConfig) {
        self.output.summary_kv(
            "Sync configuration",
            &[
                ("Source", config.source_organization.clone()),
                ("Target", config.target_organization.clone()),
                ("Source API", config.source_endpoints.graphql.clone()),
                (
                    "Package type",
                    config
                        .package_type
                        .map(|t| t.to_string())
                        .unwrap_or_else(|| "all".to_string()),
                ),
                ("Skip existing", config.skip_existing.to_string()),
                (
                    "Concurrency",
                    format!(
                        "{} package(s), {} version(s)",
                        config.concurrency.packages, config.concurrency.versions
                    ),
                ),
                (
                    "Retries",
                    format!(
                        "{} attempt(s), {} base delay",
                        config.retry.max_attempts,
                        self.output.format_duration(config.retry.delay)
                    ),
                ),
            ],
        );
    }

    fn print_export_plan(&self, config: &ExportConfig) {
        self.output.summary_kv(
            "Export configuration",
            &[
                ("Organization", config.organization.clone()),
                ("API", config.endpoints.graphql.clone()),
                ("File prefix", config.prefix().to_string()),
                (
                    "Downloads",
                    config
                        .download_dir
                        .as_ref()
                        .map(|d| d.display().to_string())
                        .unwrap_or_else(|| "disabled".to_string()),
                ),
            ],
        );
    }
}
