// src/main.rs

use clap::Parser;

use dashauth::cli::{self, Cli};
use dashauth::config::AppConfig;
use dashauth::logging::init_logging;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;
    init_logging(&config.logging);

    cli::run(cli, config).await
}
