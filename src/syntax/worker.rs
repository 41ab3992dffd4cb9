//! Background parse worker
//!
//! One thread per buffer. Jobs arrive over a channel; submitting a job
//! cancels the one before it, and the worker always skips ahead to the
//! newest queued job. Finished reparses go back over a second channel for
//! the owning thread to poll.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ropey::Rope;

use super::layer::{CancelFlag, LayerTree, ParserPool, ReparseOutcome};
use crate::error::{Error, Result};

/// Reparse request for one text revision
pub struct ParseJob {
    pub revision: u64,
    pub text: Rope,
    pub layers: Arc<LayerTree>,
    pub cancel: CancelFlag,
}

/// Completed reparse for one text revision
#[derive(Debug)]
pub struct ParseResult {
    pub revision: u64,
    pub outcome: ReparseOutcome,
}

pub struct ParseWorker {
    job_tx: Option<Sender<ParseJob>>,
    result_rx: Receiver<ParseResult>,
    current: Option<CancelFlag>,
    handle: Option<JoinHandle<()>>,
}

impl ParseWorker {
    pub fn spawn() -> Result<Self> {
        let (job_tx, job_rx) = mpsc::channel::<ParseJob>();
        let (result_tx, result_rx) = mpsc::channel();

        let handle = thread::Builder::new()
            .name("strata-parse".into())
            .spawn(move || run(job_rx, result_tx))
            .map_err(Error::Worker)?;

        tracing::debug!("Started parse worker");

        Ok(Self {
            job_tx: Some(job_tx),
            result_rx,
            current: None,
            handle: Some(handle),
        })
    }

    /// Queue a reparse, cancelling the previous job
    pub fn submit(&mut self, revision: u64, text: Rope, layers: Arc<LayerTree>) {
        if let Some(previous) = self.current.take() {
            previous.cancel();
        }
        let cancel = CancelFlag::new();
        self.current = Some(cancel.clone());

        let job = ParseJob {
            revision,
            text,
            layers,
            cancel,
        };
        if let Some(tx) = &self.job_tx {
            if tx.send(job).is_err() {
                tracing::warn!("Parse worker is gone, dropping job for revision {}", revision);
            }
        }
    }

    /// Newest finished result, if any (non-blocking)
    pub fn try_recv(&self) -> Option<ParseResult> {
        let mut latest = None;
        while let Ok(result) = self.result_rx.try_recv() {
            latest = Some(result);
        }
        latest
    }

    /// Wait up to `timeout` for a result
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ParseResult> {
        match self.result_rx.recv_timeout(timeout) {
            Ok(result) => Some(self.try_recv().unwrap_or(result)),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

impl Drop for ParseWorker {
    fn drop(&mut self) {
        if let Some(current) = self.current.take() {
            current.cancel();
        }
        // Closing the channel ends the worker loop
        self.job_tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Parse worker panicked");
            }
        }
        tracing::debug!("Stopped parse worker");
    }
}

fn run(jobs: Receiver<ParseJob>, results: Sender<ParseResult>) {
    let mut pool = ParserPool::new();

    while let Ok(mut job) = jobs.recv() {
        while let Ok(newer) = jobs.try_recv() {
            tracing::debug!("Skipping superseded job for revision {}", job.revision);
            job = newer;
        }
        if job.cancel.is_cancelled() {
            tracing::debug!("Job for revision {} cancelled before start", job.revision);
            continue;
        }

        let Some(outcome) = job.layers.reparse(&job.text, &mut pool, &job.cancel) else {
            tracing::debug!("Job for revision {} cancelled", job.revision);
            continue;
        };
        let result = ParseResult {
            revision: job.revision,
            outcome,
        };
        if results.send(result).is_err() {
            break;
        }
    }
}
