//! Retry-until-success polling for eventually-consistent state
//!
//! A probe is invoked repeatedly until it succeeds or the deadline passes.
//! Probes classify their own failures: [`ProbeError::Retryable`] failures are
//! retried after [`POLL_INTERVAL`], [`ProbeError::Fatal`] failures end the
//! poll at once. When the deadline passes the last retryable failure is
//! returned, so the caller sees what kept failing rather than a bare timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;
use tracing::debug;

/// Fixed pause between probe attempts
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Failure reported by a probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeError<E> {
    /// Not converged yet; try again
    Retryable(E),
    /// Will never succeed; stop polling
    Fatal(E),
}

impl<E> ProbeError<E> {
    pub fn into_inner(self) -> E {
        match self {
            ProbeError::Retryable(e) | ProbeError::Fatal(e) => e,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, ProbeError::Fatal(_))
    }
}

/// Classified result of one probe invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome<T, E> {
    Success(T),
    RetryableFailure(E),
    FatalFailure(E),
}

impl<T, E> From<Result<T, ProbeError<E>>> for ProbeOutcome<T, E> {
    fn from(result: Result<T, ProbeError<E>>) -> Self {
        match result {
            Ok(v) => ProbeOutcome::Success(v),
            Err(ProbeError::Retryable(e)) => ProbeOutcome::RetryableFailure(e),
            Err(ProbeError::Fatal(e)) => ProbeOutcome::FatalFailure(e),
        }
    }
}

/// Classify plain results inside a probe
pub trait ProbeResultExt<T, E> {
    /// Errors are worth retrying
    fn retryable(self) -> Result<T, ProbeError<E>>;
    /// Errors abort the poll
    fn fatal(self) -> Result<T, ProbeError<E>>;
}

impl<T, E> ProbeResultExt<T, E> for Result<T, E> {
    fn retryable(self) -> Result<T, ProbeError<E>> {
        self.map_err(ProbeError::Retryable)
    }

    fn fatal(self) -> Result<T, ProbeError<E>> {
        self.map_err(ProbeError::Fatal)
    }
}

/// Why a poll ended without success
#[derive(Debug, Error)]
pub enum PollError<E> {
    #[error("Probe failed fatally: {0}")]
    Fatal(E),

    #[error("Polling interrupted after {attempts} attempts")]
    Interrupted { attempts: u32 },

    #[error("No success after {attempts} attempts in {elapsed:?}: {last}")]
    Timeout {
        attempts: u32,
        elapsed: Duration,
        last: E,
    },
}

impl<E> PollError<E> {
    /// The underlying probe failure, if there was one
    pub fn into_cause(self) -> Option<E> {
        match self {
            PollError::Fatal(e) => Some(e),
            PollError::Timeout { last, .. } => Some(last),
            PollError::Interrupted { .. } => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, PollError::Timeout { .. })
    }
}

/// Cross-thread interrupt for a blocked [`poll_until_with`]
///
/// Cloning shares the flag. Once raised the flag stays set.
#[derive(Clone, Default)]
pub struct Interrupter {
    inner: Arc<InterruptState>,
}

#[derive(Default)]
struct InterruptState {
    raised: Mutex<bool>,
    cond: Condvar,
}

impl Interrupter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag and wake any sleeping poller
    pub fn interrupt(&self) {
        let mut raised = self.inner.raised.lock();
        *raised = true;
        self.inner.cond.notify_all();
    }

    pub fn is_interrupted(&self) -> bool {
        *self.inner.raised.lock()
    }

    /// Sleep for `duration`; returns false if interrupted before or during it
    ///
    /// A duration too large to represent sleeps until interrupted.
    pub fn sleep(&self, duration: Duration) -> bool {
        let wake_at = Instant::now().checked_add(duration);
        let mut raised = self.inner.raised.lock();
        while !*raised {
            match wake_at {
                Some(at) => {
                    if self.inner.cond.wait_until(&mut raised, at).timed_out() {
                        break;
                    }
                }
                None => self.inner.cond.wait(&mut raised),
            }
        }
        !*raised
    }
}

impl std::fmt::Debug for Interrupter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interrupter")
            .field("interrupted", &self.is_interrupted())
            .finish()
    }
}

/// Invoke `probe` until it succeeds, fails fatally, or `timeout` elapses.
///
/// The deadline is fixed before the first attempt and only checked after an
/// attempt, so the probe always runs at least once. A timeout too large to
/// add to the current instant, such as `Duration::MAX`, means no deadline.
pub fn poll_until<T, E, F>(timeout: Duration, probe: F) -> Result<T, PollError<E>>
where
    F: FnMut() -> Result<T, ProbeError<E>>,
{
    poll_until_with(timeout, &Interrupter::new(), probe)
}

/// [`poll_until`] with an interrupt that ends the poll during a sleep
pub fn poll_until_with<T, E, F>(
    timeout: Duration,
    interrupter: &Interrupter,
    mut probe: F,
) -> Result<T, PollError<E>>
where
    F: FnMut() -> Result<T, ProbeError<E>>,
{
    let start = Instant::now();
    // None: the timeout is too large to represent, so there is no deadline
    let deadline = start.checked_add(timeout);
    let mut attempts = 0;

    loop {
        attempts += 1;
        let last = match probe() {
            Ok(v) => return Ok(v),
            Err(ProbeError::Fatal(e)) => return Err(PollError::Fatal(e)),
            Err(ProbeError::Retryable(e)) => e,
        };
        debug!(attempts, "probe not yet satisfied, retrying");

        if !interrupter.sleep(POLL_INTERVAL) {
            return Err(PollError::Interrupted { attempts });
        }
        if matches!(deadline, Some(d) if Instant::now() >= d) {
            return Err(PollError::Timeout {
                attempts,
                elapsed: start.elapsed(),
                last,
            });
        }
    }
}

/// Async form of [`poll_until`] for tests running inside a tokio runtime.
///
/// Dropping the returned future cancels the poll.
pub async fn eventually<T, E, F, Fut>(timeout: Duration, mut probe: F) -> Result<T, PollError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProbeError<E>>>,
{
    let start = tokio::time::Instant::now();
    let deadline = start.checked_add(timeout);
    let mut attempts = 0;

    loop {
        attempts += 1;
        let last = match probe().await {
            Ok(v) => return Ok(v),
            Err(ProbeError::Fatal(e)) => return Err(PollError::Fatal(e)),
            Err(ProbeError::Retryable(e)) => e,
        };
        debug!(attempts, "probe not yet satisfied, retrying");

        tokio::time::sleep(POLL_INTERVAL).await;
        if matches!(deadline, Some(d) if tokio::time::Instant::now() >= d) {
            return Err(PollError::Timeout {
                attempts,
                elapsed: start.elapsed(),
                last,
            });
        }
    }
}
