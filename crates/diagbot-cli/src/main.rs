//! diagbot CLI: run the bot and manage test catalogs.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "diagbot",
    version,
    about = "Chat bot that walks users through scored diagnostic tests"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the bot on the configured transport
    Serve {
        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,

        /// Catalog path (overrides the config file)
        #[arg(long)]
        catalog: Option<PathBuf>,
    },

    /// Chat with the bot in the terminal
    Chat {
        /// Catalog path (overrides the config file)
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Validate a test catalog
    Validate {
        /// Path to a JSON or TOML catalog
        #[arg(long)]
        catalog: PathBuf,
    },

    /// List the tests in a catalog
    ListTests {
        /// Catalog path (overrides the config file)
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Convert a catalog between JSON and TOML
    Convert {
        /// Input catalog
        #[arg(long)]
        catalog: PathBuf,

        /// Output path; the extension picks the format
        #[arg(long)]
        output: PathBuf,
    },

    /// Create a starter config and catalog
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("diagbot=info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve { config, catalog } => commands::serve::execute(config, catalog).await,
        Commands::Chat { catalog, config } => commands::chat::execute(catalog, config).await,
        Commands::Validate { catalog } => commands::validate::execute(catalog),
        Commands::ListTests { catalog, config } => commands::list_tests::execute(catalog, config),
        Commands::Convert { catalog, output } => commands::convert::execute(catalog, output),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
