pub mod cli;
pub mod core;
pub mod providers;
pub mod server;
pub mod store;

use crate::cli::update::UpdateOptions;
use crate::core::builder::DatasetBuilder;
use crate::core::config::AppConfig;
use crate::providers::Sources;
use anyhow::Result;
use tracing::{debug, info};

pub const DEFAULT_PORT: u16 = 5000;

#[derive(Debug, Clone)]
pub enum AppCommand {
    Build,
    Analyze,
    Update(UpdateOptions),
    Series {
        base: String,
        countries: Option<String>,
    },
    Serve {
        port: u16,
    },
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("m2tracker starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    match command {
        AppCommand::Analyze => cli::analyze::run(&config),
        AppCommand::Series { base, countries } => {
            cli::series::run(&config, &base, countries.as_deref())
        }
        AppCommand::Serve { port } => server::serve(&config, port).await,
        AppCommand::Build | AppCommand::Update(_) => {
            let sources = Sources::from_config(&config, store::response_cache(&config));
            let builder = DatasetBuilder::new(
                &config,
                sources.indicators.as_ref(),
                &sources.fx_primary,
                &sources.fx_fallback,
            );
            match command {
                AppCommand::Update(options) => cli::update::run(&config, &builder, &options).await,
                _ => cli::build::run(&config, &builder).await,
            }
        }
    }
}
