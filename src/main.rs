//! Command-line entry point for package-sync

use clap::Parser;
use package_sync::cli::{Cli, Runner};
use package_sync::logging;
use std::process;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let runner = Runner::new(cli);
    if let Err(e) = runner.run().await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
