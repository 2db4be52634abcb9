// src/core/attempt.rs

//! Deadline-bounded network attempts and the retry loop around them.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, warn};

use crate::core::error::ProbeError;

/// Step of the linear backoff: attempt `n` (1-based) waits `n * BACKOFF_STEP`.
pub const BACKOFF_STEP: Duration = Duration::from_millis(250);

/// Value of a completed attempt together with how long the action ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timed<T> {
    pub value: T,
    pub elapsed: Duration,
}

impl<T> Timed<T> {
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed.as_millis() as u64
    }
}

/// Races `action` against `deadline`.
///
/// When the deadline wins the action future is dropped before this returns,
/// which closes whatever socket or request it owned. Elapsed time starts when
/// the action is first polled.
pub async fn run_bounded<T, Fut>(deadline: Duration, action: Fut) -> Result<Timed<T>, ProbeError>
where
    Fut: Future<Output = Result<T, ProbeError>>,
{
    let started = Instant::now();
    match timeout(deadline, action).await {
        Ok(Ok(value)) => Ok(Timed {
            value,
            elapsed: started.elapsed(),
        }),
        Ok(Err(err)) => Err(err),
        Err(_) => {
            debug!(deadline_ms = deadline.as_millis() as u64, "Attempt deadline elapsed, aborted.");
            Err(ProbeError::timeout(deadline))
        }
    }
}

/// Result of the retry loop: the final attempt's result and how many ran.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T, ProbeError>,
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    retries: u32,
    step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    pub fn new(retries: u32) -> Self {
        Self {
            retries,
            step: BACKOFF_STEP,
        }
    }

    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self::new(0)
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Delay before the attempt following failed attempt number `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.step * attempt
    }

    /// Runs `attempt` until one result is accepted or the retries run out.
    ///
    /// `attempt` receives the zero-based attempt index. An `Ok` value that
    /// `accept` rejects counts as a failure and is retried like an error.
    /// Only the last attempt's result is returned.
    pub async fn run<T, F, Fut, A>(&self, mut attempt: F, accept: A) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ProbeError>>,
        A: Fn(&T) -> bool,
    {
        let mut made = 0;
        loop {
            let result = attempt(made).await;
            made += 1;

            let accepted = matches!(&result, Ok(value) if accept(value));
            if accepted || made > self.retries {
                return RetryOutcome {
                    result,
                    attempts: made,
                };
            }

            let delay = self.backoff(made);
            match &result {
                Err(err) => warn!(attempt = made, error = %err, delay_ms = delay.as_millis() as u64, "Attempt failed, retrying."),
                Ok(_) => debug!(attempt = made, delay_ms = delay.as_millis() as u64, "Attempt not accepted, retrying."),
            }
            sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_returns_value_and_elapsed() {
        let timed = run_bounded(Duration::from_secs(1), async {
            sleep(Duration::from_millis(40)).await;
            Ok::<_, ProbeError>(7)
        })
        .await
        .unwrap();
        assert_eq!(timed.value, 7);
        assert_eq!(timed.elapsed_ms(), 40);
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_passes_errors_through() {
        let err = run_bounded(Duration::from_secs(1), async {
            Err::<(), _>(ProbeError::transport("refused", Some("ECONNREFUSED")))
        })
        .await
        .unwrap_err();
        assert_eq!(err.code(), Some("ECONNREFUSED"));
    }

    #[tokio::test(start_paused = true)]
    async fn never_completing_action_is_aborted_at_deadline() {
        let dropped = Arc::new(AtomicBool::new(false));
        let guard = DropFlag(dropped.clone());
        let started = Instant::now();

        let err = run_bounded(Duration::from_millis(300), async move {
            let _guard = guard;
            std::future::pending::<Result<(), ProbeError>>().await
        })
        .await
        .unwrap_err();

        assert_eq!(err, ProbeError::Timeout { deadline_ms: 300 });
        assert!(dropped.load(Ordering::SeqCst), "action must be dropped on timeout");
        assert!(started.elapsed() < Duration::from_millis(350));
    }

    #[test]
    fn backoff_is_linear() {
        let policy = RetryPolicy::new(3);
        assert_eq!(policy.backoff(1), Duration::from_millis(250));
        assert_eq!(policy.backoff(2), Duration::from_millis(500));
        assert_eq!(policy.backoff(3), Duration::from_millis(750));
        assert_eq!(policy.max_attempts(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_failure_runs_retries_plus_one_attempts() {
        let calls = AtomicU32::new(0);
        let starts = std::sync::Mutex::new(Vec::new());
        let origin = Instant::now();

        let outcome = RetryPolicy::new(2)
            .run(
                |n| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    starts.lock().unwrap().push(origin.elapsed());
                    async move { Err::<(), _>(ProbeError::transport(format!("fail {n}"), None)) }
                },
                |_| true,
            )
            .await;

        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Only the final error surfaces.
        assert_eq!(outcome.result.unwrap_err().to_string(), "fail 2");

        let starts = starts.into_inner().unwrap();
        let gaps: Vec<_> = starts.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(gaps, vec![Duration::from_millis(250), Duration::from_millis(500)]);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_at_first_accepted_attempt() {
        let outcome = RetryPolicy::new(5)
            .run(|n| async move { Ok::<_, ProbeError>(n) }, |n| *n == 1)
            .await;
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.result.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_retries_means_one_attempt() {
        let started = Instant::now();
        let outcome = RetryPolicy::none()
            .run(|_| async { Err::<(), _>(ProbeError::timeout(Duration::from_secs(1))) }, |_| true)
            .await;
        assert_eq!(outcome.attempts, 1);
        assert!(outcome.result.unwrap_err().is_timeout());
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
