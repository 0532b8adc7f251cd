//! Readiness polling for resources that become usable asynchronously.
//!
//! The default policy waits as long as it takes: a one-shot provisioning run
//! has nothing better to do than wait for the cluster or repository it just
//! asked for. Callers that need an upper bound pass a timeout or a
//! [`CancellationToken`] through [`WaitPolicy`].

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{Error, Result};

/// Outcome of a single readiness probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness<T> {
    /// Resource reached its terminal ready state; carries its attributes
    Ready(T),
    /// Resource exists but is not ready; carries the observed status
    Pending(String),
}

/// What to do when a probe itself fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeErrorPolicy {
    /// The resource may simply not exist yet; keep polling
    Retry,
    /// Any probe failure is unexpected; stop and surface it
    Fail,
}

/// Interval, deadline and cancellation for a readiness wait
#[derive(Debug, Clone)]
pub struct WaitPolicy {
    /// Time between probes
    pub interval: Duration,
    /// Give up after this long (None = wait forever)
    pub timeout: Option<Duration>,
    /// External cancellation signal
    pub cancel: Option<CancellationToken>,
}

impl WaitPolicy {
    /// Poll every `interval`, forever
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            timeout: None,
            cancel: None,
        }
    }

    /// Bound the wait
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Stop waiting when `token` is cancelled
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Poll `probe` until it reports [`Readiness::Ready`].
///
/// Pending results sleep for `policy.interval` and try again. Probe errors are
/// either swallowed and retried or returned immediately, depending on
/// `on_error`. Exceeding `policy.timeout` yields [`Error::Timeout`]; a
/// cancelled token yields [`Error::Cancelled`].
pub async fn wait_until_ready<T, F, Fut>(
    policy: &WaitPolicy,
    what: &str,
    on_error: ProbeErrorPolicy,
    mut probe: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Readiness<T>>>,
{
    let deadline = policy.timeout.map(|t| Instant::now() + t);
    let mut attempt = 0u32;

    loop {
        if let Some(token) = &policy.cancel {
            if token.is_cancelled() {
                return Err(Error::Cancelled {
                    what: what.to_string(),
                });
            }
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(Error::Timeout {
                what: what.to_string(),
            });
        }

        attempt += 1;
        match probe().await {
            Ok(Readiness::Ready(value)) => {
                info!(resource = %what, attempt, "Resource is ready");
                return Ok(value);
            }
            Ok(Readiness::Pending(status)) => {
                info!(resource = %what, status = %status, "Resource not ready yet");
            }
            Err(e) if on_error == ProbeErrorPolicy::Retry => {
                debug!(resource = %what, error = %e, "Resource not available yet, retrying");
            }
            Err(e) => {
                warn!(resource = %what, error = %e, "Readiness probe failed");
                return Err(e);
            }
        }

        let sleep = tokio::time::sleep(policy.interval);
        match &policy.cancel {
            Some(token) => {
                tokio::select! {
                    _ = sleep => {}
                    _ = token.cancelled() => {
                        return Err(Error::Cancelled { what: what.to_string() });
                    }
                }
            }
            None => sleep.await,
        }
    }
}
