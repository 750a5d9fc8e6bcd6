//! Bounded fixed-interval polling for objects that become visible
//! asynchronously after creation

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tfplug::Context;
use tokio::time::{sleep_until, Instant};

/// How long and how often to poll for a freshly created object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilizationConfig {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for StabilizationConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5 * 60),
            interval: Duration::from_secs(1),
        }
    }
}

/// Classification of a single poll attempt
#[derive(Debug)]
pub enum PollOutcome<T, E> {
    Ready(T),
    /// Keep polling
    NotYetAvailable(E),
    /// Stop polling immediately
    Fatal(E),
}

/// Successful result of a wait
#[derive(Debug)]
pub struct Polled<T> {
    pub value: T,
    pub attempts: u32,
    pub elapsed: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum PollError<E> {
    #[error("timed out after {timeout:?} ({attempts} attempts)")]
    Timeout {
        timeout: Duration,
        attempts: u32,
        last_reason: Option<E>,
    },

    #[error("{error}")]
    Fatal { attempts: u32, error: E },

    #[error("cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

impl<E> PollError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            PollError::Timeout { attempts, .. }
            | PollError::Fatal { attempts, .. }
            | PollError::Cancelled { attempts } => *attempts,
        }
    }
}

/// Polls until `attempt` reports Ready, reports Fatal, the timeout passes or
/// `ctx` is cancelled.
///
/// The first attempt runs immediately and later ones are spaced by the
/// configured interval. Timeout is only reported once the full bound has
/// elapsed, and an attempt still in flight at the deadline is abandoned.
pub async fn poll_until_ready<T, E, F, Fut>(
    ctx: &Context,
    config: &StabilizationConfig,
    mut attempt: F,
) -> Result<Polled<T>, PollError<E>>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = PollOutcome<T, E>>,
{
    let started = Instant::now();
    let deadline = started + config.timeout;
    let mut attempts = 0;
    let mut last_reason = None;

    loop {
        if ctx.is_cancelled() {
            return Err(PollError::Cancelled { attempts });
        }

        attempts += 1;
        let outcome = tokio::select! {
            outcome = attempt() => outcome,
            _ = ctx.cancelled() => return Err(PollError::Cancelled { attempts }),
            _ = sleep_until(deadline) => {
                tracing::debug!(attempts, "attempt still running at deadline");
                return Err(PollError::Timeout {
                    timeout: config.timeout,
                    attempts,
                    last_reason,
                });
            }
        };

        match outcome {
            PollOutcome::Ready(value) => {
                let elapsed = started.elapsed();
                tracing::debug!(attempts, ?elapsed, "object is ready");
                return Ok(Polled {
                    value,
                    attempts,
                    elapsed,
                });
            }
            PollOutcome::Fatal(error) => {
                tracing::debug!(attempts, %error, "polling halted");
                return Err(PollError::Fatal { attempts, error });
            }
            PollOutcome::NotYetAvailable(reason) => {
                tracing::debug!(attempts, %reason, "object not yet available");
                last_reason = Some(reason);
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(PollError::Timeout {
                timeout: config.timeout,
                attempts,
                last_reason,
            });
        }

        let wake = std::cmp::min(now + config.interval, deadline);
        tokio::select! {
            _ = sleep_until(wake) => {}
            _ = ctx.cancelled() => return Err(PollError::Cancelled { attempts }),
        }
    }
}
