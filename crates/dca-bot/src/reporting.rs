//! Error-reporting queue.
//!
//! Cycle stages push categorized failures into a bounded channel without
//! blocking. A single consumer watches for runs of credential failures and
//! fires the stop signal once the configured limit is reached.

use std::fmt;

use dca_resilience::{Categorize, ErrorCategory};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// One categorized failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub stage: &'static str,
    pub category: ErrorCategory,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleEvent {
    Failed(ErrorReport),
    /// A cycle finished, successfully or not.
    Completed,
}

/// Producer side of the queue.
#[derive(Debug, Clone)]
pub struct ErrorReporter {
    tx: mpsc::Sender<CycleEvent>,
}

impl ErrorReporter {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<CycleEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queue a failure. Drops it with a warning when the queue is full.
    pub fn report<E: Categorize + fmt::Display>(&self, stage: &'static str, err: &E) {
        self.send(CycleEvent::Failed(ErrorReport {
            stage,
            category: err.category(),
            message: err.to_string(),
        }));
    }

    pub fn completed(&self) {
        self.send(CycleEvent::Completed);
    }

    fn send(&self, event: CycleEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(?event, "Error queue full, dropping report");
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Error queue closed");
            }
        }
    }
}

/// Halts the bot after `max_failures` credential failures with no clean
/// cycle in between.
#[derive(Debug)]
pub struct CredentialWatchdog {
    max_failures: u32,
    stop: CancellationToken,
}

impl CredentialWatchdog {
    pub fn new(max_failures: u32, stop: CancellationToken) -> Self {
        Self {
            max_failures: max_failures.max(1),
            stop,
        }
    }

    /// Consume events until the halt fires (returns the failure count) or
    /// every producer is gone (returns `None`).
    pub async fn run(self, mut rx: mpsc::Receiver<CycleEvent>) -> Option<u32> {
        let mut consecutive = 0u32;
        let mut cycle_had_credential_failure = false;

        while let Some(event) = rx.recv().await {
            match event {
                CycleEvent::Failed(report) if report.category == ErrorCategory::Credentials => {
                    consecutive += 1;
                    cycle_had_credential_failure = true;
                    warn!(
                        stage = report.stage,
                        consecutive,
                        max = self.max_failures,
                        error = %report.message,
                        "Credential failure reported"
                    );
                    if consecutive >= self.max_failures {
                        error!(
                            failures = consecutive,
                            "Repeated credential failures, halting"
                        );
                        self.stop.cancel();
                        return Some(consecutive);
                    }
                }
                CycleEvent::Failed(report) => {
                    debug!(stage = report.stage, category = %report.category, "Failure reported");
                }
                CycleEvent::Completed => {
                    if !cycle_had_credential_failure {
                        consecutive = 0;
                    }
                    cycle_had_credential_failure = false;
                }
            }
        }
        None
    }
}
