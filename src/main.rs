//! blobgate command-line entry point.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod commands;

/// REST front-end over local disk, Amazon S3 and Azure Blob storage.
#[derive(Parser, Debug)]
#[command(name = "blobgate", version, about, long_about = None)]
struct Cli {
    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the REST API
    Serve {
        /// Path to blobgate.toml
        #[arg(short, long, default_value = blobgate::config::DEFAULT_CONFIG_FILE)]
        config: PathBuf,
        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Pack a folder into a zip file
    Export {
        #[arg(short, long, default_value = blobgate::config::DEFAULT_CONFIG_FILE)]
        config: PathBuf,
        /// Service name from the config
        #[arg(short, long)]
        service: String,
        #[arg(long)]
        container: String,
        /// Folder inside the container (default: whole container)
        #[arg(long, default_value = "")]
        path: String,
        /// Zip file to write
        #[arg(short, long)]
        out: PathBuf,
        /// Replace an existing zip file
        #[arg(long)]
        overwrite: bool,
    },
    /// Unpack a zip file into a folder
    Import {
        #[arg(short, long, default_value = blobgate::config::DEFAULT_CONFIG_FILE)]
        config: PathBuf,
        #[arg(short, long)]
        service: String,
        #[arg(long)]
        container: String,
        #[arg(long, default_value = "")]
        path: String,
        /// Zip file to read
        #[arg(short, long)]
        archive: PathBuf,
        /// Empty the destination folder first
        #[arg(long)]
        clean: bool,
        /// Archive-internal prefix to strip from entry names
        #[arg(long)]
        drop_path: Option<String>,
    },
    /// Validate a config file and print warnings
    CheckConfig {
        #[arg(short, long, default_value = blobgate::config::DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, port } => {
            commands::serve::execute(&config, port, cli.log_format).await
        },
        Commands::Export {
            config,
            service,
            container,
            path,
            out,
            overwrite,
        } => {
            commands::init_logging("warn", cli.log_format);
            commands::transfer::export(&config, &service, &container, &path, &out, overwrite).await
        },
        Commands::Import {
            config,
            service,
            container,
            path,
            archive,
            clean,
            drop_path,
        } => {
            commands::init_logging("warn", cli.log_format);
            let request = commands::transfer::ImportRequest {
                service: &service,
                container: &container,
                path: &path,
                archive: &archive,
                clean,
                drop_path: drop_path.as_deref(),
            };
            commands::transfer::import(&config, request).await
        },
        Commands::CheckConfig { config } => commands::check::execute(&config),
    }
}
