//! Per-call timeout/retry policy and the bounded fan-out used by the research
//! and classification stages.

use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::RequestConfig;
use crate::error::{CallError, CallResult};

/// Timeout and retry budget applied to every external call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallPolicy {
    pub call_timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl CallPolicy {
    pub fn from_config(config: &RequestConfig) -> Self {
        Self {
            call_timeout: Duration::from_millis(config.timeout_ms),
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }

    /// Backoff before retry number `retry` (1-based): `delay * 2^(retry-1)`.
    pub fn backoff(&self, retry: u32) -> Duration {
        self.retry_delay
            .saturating_mul(2u32.saturating_pow(retry.saturating_sub(1)))
    }

    /// Run `op` until it succeeds or the retry budget is spent. Every attempt
    /// is bounded by `call_timeout`; the last error is returned.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> CallResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CallResult<T>>,
    {
        let mut retries = 0;

        loop {
            let attempt = match tokio::time::timeout(self.call_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(CallError::ProviderTimeout {
                    timeout_ms: self.call_timeout.as_millis() as u64,
                }),
            };

            match attempt {
                Ok(value) => return Ok(value),
                Err(e) if retries < self.max_retries => {
                    retries += 1;
                    let delay = self.backoff(retries);
                    warn!(
                        call = label,
                        error = %e,
                        retry = retries,
                        delay_ms = delay.as_millis() as u64,
                        "External call failed, retrying"
                    );
                    sleep(delay).await;
                }
                Err(e) => {
                    warn!(call = label, error = %e, retries, "External call failed, budget spent");
                    return Err(e);
                }
            }
        }
    }
}

/// Why in-flight work was cut off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Cutoff {
    #[error("StageTimeout: stage deadline reached before the call completed")]
    Deadline,
    #[error("RunCancelled: grace period elapsed before the call completed")]
    Cancelled,
}

/// Resolves when `deadline` passes or, after `cancel` fires, when the grace
/// window ends, whichever is first.
pub async fn cutoff(deadline: Instant, cancel: &CancellationToken, grace: Duration) -> Cutoff {
    tokio::select! {
        _ = sleep_until(deadline) => Cutoff::Deadline,
        _ = cancel.cancelled() => {
            let grace_end = Instant::now() + grace;
            if grace_end < deadline {
                sleep_until(grace_end).await;
                Cutoff::Cancelled
            } else {
                sleep_until(deadline).await;
                Cutoff::Deadline
            }
        }
    }
}

/// Failure of one call as seen by a stage: either the call itself failed
/// after retries, or the stage stopped waiting for it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallFailure {
    #[error(transparent)]
    Call(#[from] CallError),
    #[error(transparent)]
    Cutoff(#[from] Cutoff),
}

/// Results of a fan-out, indexed by input position. `None` means the work
/// item did not finish before the cutoff.
#[derive(Debug)]
pub struct FanOut<T> {
    pub slots: Vec<Option<T>>,
    pub cutoff: Option<Cutoff>,
}

/// Run `work` over `items` with at most `limit` in flight, collecting
/// outputs into slots by index until everything finishes or `stop` resolves.
pub async fn fan_out<I, T, F, Fut, S>(items: Vec<I>, limit: usize, stop: S, mut work: F) -> FanOut<T>
where
    F: FnMut(usize, I) -> Fut,
    Fut: Future<Output = T>,
    S: Future<Output = Cutoff>,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut slots: Vec<Option<T>> = std::iter::repeat_with(|| None).take(items.len()).collect();

    let mut pending: FuturesUnordered<_> = items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let semaphore = Arc::clone(&semaphore);
            let job = work(index, item);
            async move {
                let _permit = semaphore.acquire_owned().await.ok();
                (index, job.await)
            }
        })
        .collect();

    tokio::pin!(stop);
    let mut stopped = None;

    loop {
        tokio::select! {
            next = pending.next() => match next {
                Some((index, output)) => slots[index] = Some(output),
                None => break,
            },
            reason = &mut stop => {
                stopped = Some(reason);
                break;
            }
        }
    }

    FanOut {
        slots,
        cutoff: stopped,
    }
}
