//! Deadline and retry wrapper for collaborator calls.
//!
//! With a timeout set, each attempt runs on a helper thread and the stage
//! waits on a channel. A call that outlives its deadline is abandoned (the
//! thread is detached) and the stage fails; errors are retried up to
//! `max_attempts`. Without a timeout the call runs inline.
//!
//! A collaborator panic is caught in either mode and reported against the
//! stage that made the call, so optional stages can absorb it.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError};
use tracing::{debug, warn};

use crate::result::{Stage, StageFailure};

#[derive(Clone, Debug, PartialEq)]
pub struct StagePolicy {
    /// `None` disables the deadline.
    pub timeout: Option<Duration>,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for StagePolicy {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(1800)),
            max_attempts: 2,
            retry_backoff: Duration::from_secs(2),
        }
    }
}

impl StagePolicy {
    pub fn from_secs(timeout_secs: u64, max_attempts: u32) -> Self {
        Self {
            timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }
}

pub fn call_with_deadline<T, F>(stage: Stage, policy: &StagePolicy, f: F) -> Result<T, StageFailure>
where
    T: Send + 'static,
    F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
{
    let f = Arc::new(f);
    let attempts = policy.max_attempts.max(1);
    let mut last_err = None;

    for attempt in 1..=attempts {
        if attempt > 1 && !policy.retry_backoff.is_zero() {
            thread::sleep(policy.retry_backoff * (attempt - 1));
        }

        let caught = match policy.timeout {
            None => catch(&*f),
            Some(timeout) => {
                let (tx, rx) = bounded(1);
                let call = Arc::clone(&f);
                let spawned = thread::Builder::new()
                    .name(format!("{}-call", stage))
                    .spawn(move || {
                        // Receiver may be gone after a timeout
                        let _ = tx.send(catch(&*call));
                    });
                if let Err(e) = spawned {
                    return Err(StageFailure::Collaborator {
                        stage,
                        message: format!("cannot spawn worker thread: {}", e),
                    });
                }
                match rx.recv_timeout(timeout) {
                    Ok(outcome) => outcome,
                    Err(RecvTimeoutError::Timeout) => {
                        warn!(%stage, secs = timeout.as_secs(), "Collaborator call timed out");
                        return Err(StageFailure::TimedOut {
                            stage,
                            after: timeout,
                        });
                    }
                    Err(RecvTimeoutError::Disconnected) => {
                        Err("worker exited without a result".to_string())
                    }
                }
            }
        };

        let outcome = match caught {
            Ok(outcome) => outcome,
            Err(message) => {
                warn!(%stage, "Collaborator panicked: {}", message);
                return Err(StageFailure::Panicked { stage, message });
            }
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(err) => {
                debug!(%stage, attempt, error = ?err, "Collaborator call failed");
                if attempt < attempts {
                    warn!(%stage, attempt, "Collaborator call failed, retrying: {:#}", err);
                }
                last_err = Some(err);
            }
        }
    }

    Err(match last_err {
        Some(err) => StageFailure::collaborator(stage, &err),
        None => StageFailure::NoOutput(stage),
    })
}

fn catch<T>(f: &(dyn Fn() -> anyhow::Result<T> + Send + Sync)) -> Result<anyhow::Result<T>, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(payload.as_ref()))
}

pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
