// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Quill - queue-backed AI generation with resumable streaming.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod jobs;
mod serve;
mod tail;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use quill_core::JobStatus;

/// Quill - queue-backed AI generation with resumable streaming.
#[derive(Parser, Debug)]
#[command(name = "quill", version, about, long_about = None)]
struct Cli {
    /// Config file to load instead of the standard search path.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the dispatcher and the HTTP gateway.
    Serve,
    /// Enqueue a generation job. The payload JSON is read from a file or stdin.
    Enqueue {
        #[arg(long)]
        conversation_id: String,
        #[arg(long)]
        owner_id: String,
        /// Assistant message to generate. A fresh id is used when omitted.
        #[arg(long)]
        message_id: Option<String>,
        /// Lower values are claimed first.
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        priority: i64,
        #[arg(long)]
        max_retries: Option<u32>,
        /// Payload file; `-` reads stdin.
        #[arg(long, default_value = "-")]
        payload: PathBuf,
    },
    /// List an owner's jobs.
    Jobs {
        #[arg(long)]
        owner_id: String,
        #[arg(long, value_parser = parse_status)]
        status: Option<JobStatus>,
        /// Output JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Cancel a job.
    Cancel { job_id: String },
    /// Follow a job's output through a gateway, resuming from the last checkpoint.
    Tail {
        job_id: String,
        /// Gateway base URL. Defaults to the configured gateway address.
        #[arg(long)]
        gateway: Option<String>,
    },
}

fn parse_status(s: &str) -> Result<JobStatus, String> {
    s.parse::<JobStatus>()
        .map_err(|_| format!("unknown status '{s}'"))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => quill_config::load_and_validate_path(path),
        None => quill_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            quill_config::render_errors(&errors);
            std::process::exit(1);
        }
    };
    init_tracing(&config.service.log_level);

    let result = match cli.command {
        Commands::Serve => serve::run_serve(config).await,
        Commands::Enqueue {
            conversation_id,
            owner_id,
            message_id,
            priority,
            max_retries,
            payload,
        } => {
            jobs::run_enqueue(
                &config,
                jobs::EnqueueArgs {
                    conversation_id,
                    owner_id,
                    message_id,
                    priority,
                    max_retries,
                    payload,
                },
            )
            .await
        }
        Commands::Jobs {
            owner_id,
            status,
            json,
        } => jobs::run_list(&config, &owner_id, status, json).await,
        Commands::Cancel { job_id } => jobs::run_cancel(&config, &job_id).await,
        Commands::Tail { job_id, gateway } => {
            let base_url = gateway.unwrap_or_else(|| config.gateway.base_url());
            tail::run_tail(&config, &job_id, &base_url).await
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

/// Initializes the tracing subscriber with the given log level.
///
/// `RUST_LOG` overrides the configured level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("quill={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}
