//! Command-line interface for sandpit.
//!
//! Subcommands that only inspect or write configuration run here and exit.
//! Everything else continues into the controller loop.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sandpit_config::Config;
use sandpit_intercept::{FileTrapSink, ProxyInstaller};

/// sandpit - trap interception and focus bridging for embedded script engines
#[derive(Parser)]
#[command(name = "sandpit")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config file to use instead of the default location
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Set debug log level (overrides RUST_LOG and DEBUG_LEVEL)
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevelArg>,
}

/// Log level argument for CLI
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum LogLevelArg {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevelArg {
    /// Convert to `log::LevelFilter`
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevelArg::Off => log::LevelFilter::Off,
            LogLevelArg::Error => log::LevelFilter::Error,
            LogLevelArg::Warn => log::LevelFilter::Warn,
            LogLevelArg::Info => log::LevelFilter::Info,
            LogLevelArg::Debug => log::LevelFilter::Debug,
            LogLevelArg::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the proxy bootstrap script for the effective config
    Script,

    /// Print the effective config, or write a default config file
    Config {
        /// Write a default config file instead of printing
        #[arg(long)]
        init: bool,

        /// Overwrite an existing file when used with --init
        #[arg(short, long)]
        force: bool,
    },

    /// Route queries from a renderer over stdin/stdout (the default)
    Controller,
}

/// Runtime options passed from CLI to the controller
#[derive(Clone, Debug, Default)]
pub struct RuntimeOptions {
    /// Explicit config path
    pub config: Option<PathBuf>,
    /// Log level override from CLI
    pub log_level: Option<log::LevelFilter>,
}

/// Result of CLI processing
pub enum CliResult {
    /// Continue into the controller loop
    Continue(RuntimeOptions),
    /// Exit with the given code (subcommand completed)
    Exit(i32),
}

/// Process CLI arguments and handle subcommands
pub fn process_cli() -> CliResult {
    let cli = Cli::parse();
    let config_path = cli.config.clone();

    let result = match cli.command {
        Some(Commands::Script) => print_script(config_path.as_deref()),
        Some(Commands::Config { init: true, force }) => init_config(config_path.as_deref(), force),
        Some(Commands::Config { init: false, .. }) => print_config(config_path.as_deref()),
        Some(Commands::Controller) | None => {
            return CliResult::Continue(RuntimeOptions {
                config: cli.config,
                log_level: cli.log_level.map(|l| l.to_level_filter()),
            });
        }
    };

    match result {
        Ok(()) => CliResult::Exit(0),
        Err(e) => {
            eprintln!("sandpit: error: {e:#}");
            CliResult::Exit(1)
        }
    }
}

/// Load config from `path`, or from the default location.
///
/// Both paths apply environment overrides and validate. The controller only
/// calls this to fail early on a bad file.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

/// Bootstrap script for the given config.
pub fn bootstrap_script(config: &Config) -> String {
    let installer = ProxyInstaller::new(
        config.intercept.function_name.clone(),
        config.intercept.target_object.clone(),
        Arc::new(FileTrapSink::new(config.intercept.log_path.clone())),
    );
    installer.bootstrap_script()
}

fn print_script(path: Option<&Path>) -> Result<()> {
    let config = load_config(path)?;
    println!("{}", bootstrap_script(&config));
    Ok(())
}

fn print_config(path: Option<&Path>) -> Result<()> {
    let config = load_config(path)?;
    let yaml = serde_yaml_ng::to_string(&config).context("serializing config")?;
    print!("{yaml}");
    Ok(())
}

/// Write a default config file. Returns the path written.
pub fn write_default_config(path: &Path, force: bool) -> Result<PathBuf> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    Config::default().save_to(path)?;
    Ok(path.to_path_buf())
}

fn init_config(path: Option<&Path>, force: bool) -> Result<()> {
    let target = path.map_or_else(Config::config_path, Path::to_path_buf);
    let written = write_default_config(&target, force)?;
    println!("Wrote default config to {}", written.display());
    Ok(())
}
