// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `quill enqueue`, `quill jobs` and `quill cancel`.
//!
//! These talk to the job database directly. A running dispatcher picks up
//! new jobs on its next poll and notices cancels through its watcher.

use std::path::{Path, PathBuf};

use quill_config::QuillConfig;
use quill_core::{Job, JobId, JobPayload, JobQueue, JobStatus, NewJob, OwnerId, QuillError};
use quill_storage::SqliteStorage;
use tokio::io::AsyncReadExt;

pub struct EnqueueArgs {
    pub conversation_id: String,
    pub owner_id: String,
    pub message_id: Option<String>,
    pub priority: i64,
    pub max_retries: Option<u32>,
    pub payload: PathBuf,
}

async fn open_storage(config: &QuillConfig) -> Result<SqliteStorage, QuillError> {
    let storage = SqliteStorage::new(config.storage.clone())
        .with_default_max_retries(config.dispatch.max_retries);
    storage.initialize().await?;
    Ok(storage)
}

async fn read_payload(path: &Path) -> Result<String, QuillError> {
    let io_err = |e: std::io::Error| QuillError::Internal(format!("failed to read payload: {e}"));
    if path == Path::new("-") {
        let mut raw = String::new();
        tokio::io::stdin()
            .read_to_string(&mut raw)
            .await
            .map_err(io_err)?;
        Ok(raw)
    } else {
        tokio::fs::read_to_string(path).await.map_err(io_err)
    }
}

fn parse_payload(raw: &str) -> Result<JobPayload, QuillError> {
    let payload: JobPayload = serde_json::from_str(raw)
        .map_err(|e| QuillError::Config(format!("invalid payload JSON: {e}")))?;
    if payload.model.is_empty() {
        return Err(QuillError::Config("payload.model must not be empty".into()));
    }
    Ok(payload)
}

pub async fn run_enqueue(config: &QuillConfig, args: EnqueueArgs) -> Result<(), QuillError> {
    let payload = parse_payload(&read_payload(&args.payload).await?)?;
    let message_id = args
        .message_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let storage = open_storage(config).await?;
    let job_id = storage
        .enqueue(NewJob {
            message_id: message_id.into(),
            conversation_id: args.conversation_id.into(),
            owner_id: args.owner_id.into(),
            priority: args.priority,
            payload,
            max_retries: args.max_retries,
        })
        .await?;
    println!("{job_id}");
    Ok(())
}

fn format_row(job: &Job) -> String {
    format!(
        "{:<36}  {:<10}  {:>8}  {:>3}/{:<3}  {}",
        job.id,
        job.status.to_string(),
        job.priority,
        job.retry_count,
        job.max_retries,
        job.error.as_deref().unwrap_or("")
    )
}

pub async fn run_list(
    config: &QuillConfig,
    owner_id: &str,
    status: Option<JobStatus>,
    json: bool,
) -> Result<(), QuillError> {
    let storage = open_storage(config).await?;
    let jobs = storage.list_by_owner(&OwnerId::from(owner_id), status).await?;

    if json {
        let out = serde_json::to_string_pretty(&jobs)
            .map_err(|e| QuillError::Internal(format!("failed to encode jobs: {e}")))?;
        println!("{out}");
        return Ok(());
    }

    if jobs.is_empty() {
        println!("no jobs");
        return Ok(());
    }
    println!(
        "{:<36}  {:<10}  {:>8}  {:>7}  ERROR",
        "ID", "STATUS", "PRIORITY", "RETRIES"
    );
    for job in &jobs {
        println!("{}", format_row(job));
    }
    Ok(())
}

pub async fn run_cancel(config: &QuillConfig, job_id: &str) -> Result<(), QuillError> {
    let storage = open_storage(config).await?;
    let id = JobId::from(job_id);
    if storage.cancel(&id).await? {
        println!("cancelled {id}");
        return Ok(());
    }
    match storage.get(&id).await? {
        Some(job) => Err(QuillError::InvalidTransition {
            from: job.status,
            to: JobStatus::Cancelled,
        }),
        None => Err(QuillError::NotFound {
            kind: "job",
            id: id.to_string(),
        }),
    }
}
