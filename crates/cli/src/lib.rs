pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use mova_core::config::{AppConfig, LoadOptions, LogFormat};

#[derive(Debug, Parser)]
#[command(
    name = "mova",
    about = "MOVA protocol engine CLI",
    long_about = "Validate protocol catalogs, inspect configuration and tools, and chat with a catalog.",
    after_help = "Examples:\n  mova check protocols/demo.toml\n  mova config\n  mova chat protocols/demo.toml --user ana"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Load a protocol catalog and validate every intent and protocol in it")]
    Check {
        #[arg(help = "Catalog TOML file (defaults to catalog.path from config)")]
        catalog: Option<PathBuf>,
    },
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Print the built-in tool specs as JSON")]
    Tools,
    #[command(about = "Start an interactive conversation driven by a catalog")]
    Chat {
        #[arg(help = "Catalog TOML file (defaults to catalog.path from config)")]
        catalog: Option<PathBuf>,
        #[arg(long, default_value = "local", help = "User id attached to the session")]
        user: String,
    },
}

/// Installs the fmt subscriber on stderr so command payloads on stdout stay parseable.
pub fn init_logging(config: &AppConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder =
        tracing_subscriber::fmt().with_target(false).with_max_level(log_level).with_writer(std::io::stderr);

    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    if let Ok(config) = AppConfig::load(LoadOptions::default()) {
        init_logging(&config);
    }

    let result = match cli.command {
        Command::Check { catalog } => commands::check::run(catalog.as_deref()),
        Command::Config => commands::config::run(),
        Command::Tools => commands::tools::run(),
        Command::Chat { catalog, user } => commands::chat::run(catalog.as_deref(), &user),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
