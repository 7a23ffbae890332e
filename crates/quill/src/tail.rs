// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `quill tail` command implementation.
//!
//! Follows a job's frame stream through a gateway and prints answer text as
//! it arrives. Progress is checkpointed to a client-local database, so an
//! interrupted tail picks up where it left off. Ctrl-C interrupts the read
//! and keeps that checkpoint.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use quill_checkpoint::{
    CheckpointManager, ReaderObserver, ReaderOutcome, ReaderTarget, ResumableReader,
    SqliteCheckpointStore,
};
use quill_config::QuillConfig;
use quill_core::{GenerationStatus, QuillError};
use quill_dispatch::install_signal_handler;
use quill_gateway::handlers::JobView;
use quill_http::HttpFrameSource;
use quill_http::client::build_client;
use quill_protocol::FrameAccumulator;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Prints the answer incrementally and status changes to a side channel.
///
/// Observer callbacks cannot fail, so the first write error is kept and
/// all output stops; [`TextPrinter::finish`] reports it.
pub struct TextPrinter<W: Write, E: Write> {
    out: W,
    status_out: E,
    shown: String,
    error: Option<std::io::Error>,
}

impl<W: Write, E: Write> TextPrinter<W, E> {
    pub fn new(out: W, status_out: E) -> Self {
        Self {
            out,
            status_out,
            shown: String::new(),
            error: None,
        }
    }

    fn print_new(&mut self, state: &FrameAccumulator) {
        let content = state.content();
        if let Some(delta) = content.strip_prefix(self.shown.as_str()) {
            if delta.is_empty() {
                return;
            }
            let delta = delta.to_string();
            if self.write(|out| out.write_all(delta.as_bytes())) {
                self.shown.push_str(&delta);
            }
        } else if self.shown.starts_with(content) {
            // Rebuilding towards text already on screen.
        } else {
            // The answer was replaced, e.g. by a retried attempt.
            let content = content.to_string();
            if self.write(|out| write!(out, "\n{content}")) {
                self.shown = content;
            }
        }
    }

    fn write(&mut self, f: impl FnOnce(&mut W) -> std::io::Result<()>) -> bool {
        if self.error.is_some() {
            return false;
        }
        match f(&mut self.out).and_then(|()| self.out.flush()) {
            Ok(()) => true,
            Err(e) => {
                self.error = Some(e);
                false
            }
        }
    }

    /// Returns the first write error, if any.
    pub fn finish(self) -> Result<(), QuillError> {
        match self.error {
            Some(e) => Err(QuillError::Internal(format!("failed to write output: {e}"))),
            None => Ok(()),
        }
    }
}

impl<W: Write + Send, E: Write + Send> ReaderObserver for TextPrinter<W, E> {
    fn on_update(&mut self, state: &FrameAccumulator) {
        self.print_new(state);
    }

    fn on_status(&mut self, status: GenerationStatus) {
        if self.error.is_some() {
            return;
        }
        if let Err(e) = writeln!(self.status_out, "[{status}]") {
            self.error = Some(e);
        }
    }
}

async fn fetch_job(base_url: &str, job_id: &str) -> Result<JobView, QuillError> {
    let url = format!("{}/v1/jobs/{job_id}", base_url.trim_end_matches('/'));
    let client = build_client(None, Some(Duration::from_secs(10)))?;

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| QuillError::Internal(format!("gateway unreachable at {base_url}: {e}")))?;
    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Err(QuillError::NotFound {
            kind: "job",
            id: job_id.to_string(),
        });
    }
    if !response.status().is_success() {
        return Err(QuillError::Internal(format!(
            "gateway returned {}",
            response.status()
        )));
    }
    response
        .json()
        .await
        .map_err(|e| QuillError::Internal(format!("failed to parse job response: {e}")))
}

/// Runs the `quill tail` command.
pub async fn run_tail(config: &QuillConfig, job_id: &str, base_url: &str) -> Result<(), QuillError> {
    let job = fetch_job(base_url, job_id).await?;
    debug!(job_id, status = %job.status, "tailing job");

    let store = Arc::new(SqliteCheckpointStore::open(&config.checkpoint.path).await?);
    let manager = CheckpointManager::new(store)
        .with_ttl(config.checkpoint.ttl())
        .with_flush_every(config.checkpoint.flush_every);
    let reader = ResumableReader::new(manager, Arc::new(HttpFrameSource::new(base_url)?))
        .with_render_interval(config.checkpoint.render_interval())
        .with_interrupt(install_signal_handler());

    let target = ReaderTarget {
        job_id: job.id.into(),
        conversation_id: job.conversation_id.into(),
        message_id: job.message_id.into(),
    };
    let mut printer = TextPrinter::new(std::io::stdout(), std::io::stderr());
    // Job cancellation reaches a tail as a broken-off stream, never locally.
    let report = reader
        .read(&target, &mut printer, CancellationToken::new())
        .await?;
    printer.finish()?;
    println!();

    if let Some(offset) = report.resumed_from {
        debug!(offset, "resumed from checkpoint");
    }
    match report.outcome {
        ReaderOutcome::Completed | ReaderOutcome::Cancelled => Ok(()),
        ReaderOutcome::Interrupted => {
            eprintln!("interrupted; progress is saved, run `quill tail` again to resume");
            Ok(())
        }
        ReaderOutcome::StreamGone => Err(QuillError::Internal(format!(
            "stream for job {job_id} is not available (job status was {}); \
             progress is saved, run `quill tail` again to resume",
            job.status
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::Frame;

    #[test]
    fn printer_writes_only_new_text() {
        let mut out = Vec::new();
        let mut status = Vec::new();
        {
            let mut printer = TextPrinter::new(&mut out, &mut status);
            let mut state = FrameAccumulator::new();
            state.apply(&Frame::text("Hel"));
            printer.on_restore(&state);
            state.apply(&Frame::text("lo"));
            printer.on_update(&state);
            printer.on_update(&state);
            printer.on_status(GenerationStatus::Complete);
        }
        assert_eq!(String::from_utf8(out).unwrap(), "Hello");
        assert_eq!(String::from_utf8(status).unwrap(), "[complete]\n");
    }

    #[test]
    fn printer_handles_rebuilt_answer() {
        let mut out = Vec::new();
        {
            let mut printer = TextPrinter::new(&mut out, std::io::sink());
            printer.on_restore(&FrameAccumulator::resume_from("Hel".into(), None, 1));

            // Same text replayed from the start prints nothing twice.
            let mut state = FrameAccumulator::new();
            state.apply(&Frame::text("He"));
            printer.on_update(&state);
            state.apply(&Frame::text("llo"));
            printer.on_update(&state);

            // A retried attempt replaces the answer.
            let mut retried = FrameAccumulator::new();
            retried.apply(&Frame::text("Good"));
            printer.on_update(&retried);
        }
        assert_eq!(String::from_utf8(out).unwrap(), "Hello\nGood");
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn printer_reports_write_failure() {
        let mut printer = TextPrinter::new(BrokenPipe, std::io::sink());
        let mut state = FrameAccumulator::new();
        state.apply(&Frame::text("lost"));
        printer.on_update(&state);
        state.apply(&Frame::text(" too"));
        printer.on_update(&state);

        let err = printer.finish().unwrap_err();
        assert!(err.to_string().contains("failed to write output"), "got: {err}");
    }
}
