// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
mod commands;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "gicli", version, about = "Declarative HTTP integration runner")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Run in production mode (configurations from the system directory)
    #[arg(short = 'p', long = "production", conflicts_with = "test")]
    production: bool,

    /// Run in test mode (verbose by default)
    #[arg(short = 't', long = "test")]
    test: bool,

    /// Target job id to execute
    #[arg(short = 'j', long = "job")]
    job: Option<String>,

    /// Validate configurations and copy them to the system directory
    #[arg(short = 'i', long = "import", conflicts_with = "validate")]
    import: bool,

    /// Validate configurations only
    #[arg(short = 'v', long = "validate")]
    validate: bool,

    /// Configuration root directory
    #[arg(short = 'd', long = "dir", default_value = "docs")]
    dir: PathBuf,

    /// Single configuration file instead of a directory scan
    #[arg(short = 'f', long = "file")]
    file: Option<PathBuf>,

    /// Silent mode: only errors reach the console
    #[arg(short = 's', long = "silent")]
    silent: bool,

    /// File whose contents replace the target job's payload verbatim
    #[arg(long = "payload-file")]
    payload_file: Option<PathBuf>,

    /// File whose contents replace the target job's query params verbatim
    #[arg(long = "params-file")]
    params_file: Option<PathBuf>,

    /// Write response page metadata to ./output-response-params.js
    #[arg(long = "output-response-params")]
    output_response_params: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt a value into an ENC: configuration string (reads stdin if omitted)
    Encrypt { text: Option<String> },

    /// Decrypt an ENC: configuration string (reads stdin if omitted)
    Decrypt { text: Option<String> },

    /// Generate a group configuration document from a Swagger 2.0 file
    GenerateConfig {
        /// Swagger document to read
        #[arg(long)]
        swagger: PathBuf,
        /// Configuration file to write
        #[arg(long)]
        output: PathBuf,
    },

    /// List origin names or the job ids of one origin
    List {
        /// What to list: "names" or "ids"
        what: String,
        /// Origin to list job ids for (required with "ids")
        origin: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env from the working directory or its parents.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let _log_guard = logging::init(cli.test, cli.silent);

    let outcome = dispatch(&cli).await;
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "command failed");
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Some(Commands::Encrypt { text }) => commands::crypt::encrypt(text.as_deref()),
        Some(Commands::Decrypt { text }) => commands::crypt::decrypt(text.as_deref()),
        Some(Commands::GenerateConfig { swagger, output }) => {
            commands::generate::execute(swagger, output)
        }
        Some(Commands::List { what, origin }) => {
            commands::list::execute(&cli.dir, cli.file.as_deref(), what, origin.as_deref())
        }
        None if cli.validate => commands::config::validate(&cli.dir, cli.file.as_deref()),
        None if cli.import => commands::config::import(&cli.dir, cli.file.as_deref()),
        None => {
            let job = cli.job.as_deref().ok_or_else(|| {
                anyhow::anyhow!("no target job: pass -j <id>, or a subcommand")
            })?;
            commands::run::execute(commands::run::RunArgs {
                job,
                production: cli.production,
                dir: &cli.dir,
                file: cli.file.as_deref(),
                payload_file: cli.payload_file.as_deref(),
                params_file: cli.params_file.as_deref(),
                output_response_params: cli.output_response_params,
            })
            .await
        }
    }
}
