//! Bounded interval polling
//!
//! A probe is invoked once immediately and then once per interval until it
//! reports [`Progress::Done`], returns an error, or the [`WaitContext`] is
//! cancelled or passes its deadline. Each wait arms a fresh sleep after the
//! previous probe has finished, so a tick can never fire for a probe that
//! already ran and probes are never overlapped.

use crate::error::WaitError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Lower bound applied to poll intervals
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Outcome of a single probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress<T> {
    /// Terminal success
    Done(T),
    /// Not there yet; probe again after the interval
    Pending,
}

/// Interval and timeout of a wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitTiming {
    pub interval: Duration,
    /// Zero means "no timeout beyond the caller's context"
    pub timeout: Duration,
}

impl WaitTiming {
    pub const CLUSTER_READY: Self = Self::new(Duration::from_secs(10), Duration::from_secs(15 * 60));
    pub const CLUSTER_UPDATED: Self = Self::new(Duration::from_secs(10), Duration::from_secs(45 * 60));
    pub const CLUSTER_DELETED: Self = Self::new(Duration::from_secs(10), Duration::from_secs(20 * 60));
    /// Cluster created from a template becoming visible in the list
    pub const CLUSTER_APPEAR: Self = Self::new(Duration::from_secs(5), Duration::from_secs(10 * 60));
    pub const MACHINE_DEPLOYMENT_READY: Self = Self::new(Duration::from_secs(10), Duration::from_secs(15 * 60));
    pub const MACHINE_DEPLOYMENT_DELETED: Self = Self::new(Duration::from_secs(10), Duration::from_secs(10 * 60));
    pub const ADDON_READY: Self = Self::new(Duration::from_secs(10), Duration::from_secs(2 * 60));
    pub const APPLICATION_READY: Self = Self::new(Duration::from_secs(15), Duration::from_secs(5 * 60));

    #[must_use]
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Same interval, different timeout
    #[must_use]
    pub const fn with_timeout(self, timeout: Duration) -> Self {
        Self::new(self.interval, timeout)
    }
}

/// Cancellation and deadline bounding a wait
#[derive(Debug, Clone)]
pub struct WaitContext {
    cancel: CancellationToken,
    deadline: Option<(Instant, Duration)>,
}

impl Default for WaitContext {
    fn default() -> Self {
        Self::with_token(CancellationToken::new())
    }
}

impl WaitContext {
    /// Context with no deadline and a fresh cancellation token
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Context driven by an existing cancellation token
    #[must_use]
    pub fn with_token(cancel: CancellationToken) -> Self {
        Self { cancel, deadline: None }
    }

    /// Derive a child whose deadline is the earlier of this context's and
    /// `now + timeout`. Cancelling the parent cancels the child.
    ///
    /// A timeout too large to represent as an instant adds no deadline.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now().checked_add(timeout).map(|at| (at, timeout));
        let deadline = match (self.deadline, candidate) {
            (Some(current), Some(candidate)) if candidate.0 < current.0 => Some(candidate),
            (Some(current), _) => Some(current),
            (None, candidate) => candidate,
        };
        Self {
            cancel: self.cancel.child_token(),
            deadline,
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn timeout(&self) -> Duration {
        self.deadline.map_or(Duration::ZERO, |(_, timeout)| timeout)
    }

    async fn deadline_elapsed(&self) {
        match self.deadline {
            Some((at, _)) => tokio::time::sleep_until(at).await,
            None => std::future::pending().await,
        }
    }
}

/// Step-wise form of the poll loop.
///
/// The first [`tick`](Ticker::tick) returns at once; later ticks wait one
/// interval. Callers that carry state between attempts (update progress,
/// attempt-based logging) drive the loop themselves with a `Ticker`.
#[derive(Debug)]
pub struct Ticker {
    ctx: WaitContext,
    operation: String,
    interval: Duration,
    started: Instant,
    attempt: u32,
}

impl Ticker {
    /// Start a ticker; a non-zero `timing.timeout` narrows `ctx`'s deadline.
    pub fn new(ctx: &WaitContext, operation: impl Into<String>, timing: WaitTiming) -> Self {
        let ctx = if timing.timeout.is_zero() {
            ctx.clone()
        } else {
            ctx.with_timeout(timing.timeout)
        };
        Self {
            ctx,
            operation: operation.into(),
            interval: timing.interval.max(MIN_INTERVAL),
            started: Instant::now(),
            attempt: 0,
        }
    }

    /// Wait for the next attempt and return its 1-based number.
    pub async fn tick(&mut self) -> Result<u32, WaitError> {
        if self.attempt == 0 {
            if self.ctx.is_cancelled() {
                return Err(self.cancelled());
            }
        } else {
            tokio::select! {
                biased;
                () = self.ctx.cancel.cancelled() => return Err(self.cancelled()),
                () = tokio::time::sleep(self.interval) => {}
                () = self.ctx.deadline_elapsed() => return Err(self.timed_out()),
            }
        }

        self.attempt += 1;
        debug!(
            operation = %self.operation,
            attempt = self.attempt,
            elapsed = %format_duration(&self.elapsed()),
            "Probing"
        );
        Ok(self.attempt)
    }

    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    fn cancelled(&self) -> WaitError {
        warn!(operation = %self.operation, attempt = self.attempt, "Wait cancelled");
        WaitError::Cancelled {
            operation: self.operation.clone(),
            elapsed: self.elapsed(),
        }
    }

    fn timed_out(&self) -> WaitError {
        let elapsed = self.elapsed();
        warn!(
            operation = %self.operation,
            attempt = self.attempt,
            elapsed = %format_duration(&elapsed),
            "Wait timed out"
        );
        WaitError::Timeout {
            operation: self.operation.clone(),
            elapsed,
            timeout: self.ctx.timeout(),
        }
    }
}

/// Drive `probe` until it is done, fails, or `ctx` ends.
///
/// An `Err` from the probe is terminal and returned as-is; probes absorb
/// retryable failures themselves by returning [`Progress::Pending`].
pub async fn poll<T, F, Fut>(
    ctx: &WaitContext,
    operation: &str,
    interval: Duration,
    probe: F,
) -> Result<T, WaitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Progress<T>, WaitError>>,
{
    run(Ticker::new(ctx, operation, WaitTiming::new(interval, Duration::ZERO)), probe).await
}

/// [`poll`] with an additional timeout; a zero timeout relies on `ctx` alone.
pub async fn poll_with_timeout<T, F, Fut>(
    ctx: &WaitContext,
    operation: &str,
    timing: WaitTiming,
    probe: F,
) -> Result<T, WaitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Progress<T>, WaitError>>,
{
    run(Ticker::new(ctx, operation, timing), probe).await
}

async fn run<T, F, Fut>(mut ticker: Ticker, mut probe: F) -> Result<T, WaitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Progress<T>, WaitError>>,
{
    loop {
        ticker.tick().await?;
        if let Progress::Done(value) = probe().await? {
            debug!(
                operation = %ticker.operation(),
                attempts = ticker.attempt(),
                elapsed = %format_duration(&ticker.elapsed()),
                "Wait complete"
            );
            return Ok(value);
        }
    }
}

/// Render a duration the way Go does for whole seconds: `2m0s`, `45s`, `1h5m0s`.
#[must_use]
pub fn format_duration(duration: &Duration) -> String {
    let total = duration.as_secs();
    if total == 0 {
        return format!("{}ms", duration.as_millis());
    }
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
