use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use m2tracker::cli::update::UpdateOptions;
use m2tracker::core::log::init_logging;
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for m2tracker::AppCommand {
    fn from(cmd: Commands) -> m2tracker::AppCommand {
        match cmd {
            Commands::Build => m2tracker::AppCommand::Build,
            Commands::Analyze => m2tracker::AppCommand::Analyze,
            Commands::Update {
                skip_analysis,
                strict,
                summary_path,
            } => m2tracker::AppCommand::Update(UpdateOptions {
                skip_analysis,
                strict,
                summary_path,
            }),
            Commands::Series { base, countries } => {
                m2tracker::AppCommand::Series { base, countries }
            }
            Commands::Serve { port } => m2tracker::AppCommand::Serve { port },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Fetch sources and write the long-history dataset
    Build,
    /// Recompute the macro analysis summary from the dataset
    Analyze,
    /// Build, analyze and write a coverage summary
    Update {
        /// Skip the analysis step
        #[arg(long)]
        skip_analysis: bool,
        /// Exit non-zero if any broad money values remain missing
        #[arg(long)]
        strict: bool,
        /// Where to write the run summary
        #[arg(long)]
        summary_path: Option<PathBuf>,
    },
    /// Print broad money in billions of a base currency
    Series {
        #[arg(short, long, default_value = "USD")]
        base: String,
        /// Comma separated country codes, e.g. US,CN
        #[arg(long)]
        countries: Option<String>,
    },
    /// Serve the API and chart frontend
    Serve {
        #[arg(short, long, default_value_t = m2tracker::DEFAULT_PORT)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match cli.config_path.as_deref() {
            Some(path) => m2tracker::cli::setup::setup_at_path(path),
            None => m2tracker::cli::setup::setup(),
        },
        Some(cmd) => m2tracker::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
