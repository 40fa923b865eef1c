//! rshcp - rsh/rcp command-line client
//!
//! Runs commands and copies single files through a BSD rsh daemon.

mod commands;
mod config;
mod identity;

use clap::{Parser, Subcommand};
use colored::Colorize;
use config::Config;
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rshcp")]
#[command(about = "Run commands and transfer files through an rsh/rcp daemon")]
#[command(version)]
struct Cli {
    /// Daemon port
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Local user name presented to the daemon
    #[arg(long, global = true)]
    local_user: Option<String>,

    /// Bind a privileged source port for rcp as well as rsh
    #[arg(long, global = true)]
    rcp_privileged: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Applies command-line overrides on top of the loaded configuration.
    fn apply_to(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.defaults.port = port;
        }
        if let Some(user) = &self.local_user {
            config.defaults.local_user = Some(user.clone());
        }
        if self.rcp_privileged {
            config.connection.rcp_privileged = true;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a command on a remote host
    Exec {
        /// Destination as [user@]host
        destination: String,

        /// Command to run, passed to the remote shell as one string
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,

        /// Maximum lines of output to return
        #[arg(long)]
        max_lines: Option<usize>,

        /// Maximum bytes of output to read
        #[arg(long)]
        max_bytes: Option<usize>,

        /// Keep the last lines instead of the first when limiting
        #[arg(long)]
        tail: bool,
    },

    /// Read a file from a remote host
    Read {
        /// Source as [user@]host
        destination: String,

        /// Absolute path of the remote file
        path: String,

        /// Write the contents to a local file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Create or overwrite a file on a remote host
    Write {
        /// Destination as [user@]host
        destination: String,

        /// Absolute path of the remote file
        path: String,

        /// Local file to upload
        #[arg(short, long, conflicts_with = "content")]
        input: Option<PathBuf>,

        /// Literal content to upload
        #[arg(long)]
        content: Option<String>,
    },

    /// Show the effective configuration
    Config,
}

impl Commands {
    fn category(&self) -> &'static str {
        match self {
            Commands::Exec { .. } => "Command execution",
            Commands::Read { .. } => "File read",
            Commands::Write { .. } => "File write",
            Commands::Config => "Configuration",
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr; stdout carries command output and file contents
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", "Configuration failed".red(), e);
            std::process::exit(1);
        }
    };
    cli.apply_to(&mut config);
    tracing::debug!("Effective configuration: {:?}", config);

    let category = cli.command.category();
    match commands::execute(&config, cli.command).await {
        Ok(output) => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&output)?;
            stdout.flush()?;
        }
        Err(e) => {
            eprintln!("{}: {}", format!("{} failed", category).red(), e);
            std::process::exit(1);
        }
    }

    Ok(())
}
