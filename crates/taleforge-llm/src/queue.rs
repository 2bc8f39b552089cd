//! Central request queue: concurrency slots, per-job timeout and bounded
//! retry with exponential backoff.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::LlmError;
use crate::provider::{Completion, CompletionOptions, ProviderAdapter, ProviderKind};

/// Queue tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    /// Cutoff per attempt, including the wait for a slot.
    pub timeout: Duration,
    /// Attempts per job, the first included.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub backoff_base: Duration,
    /// Jobs allowed in flight at once.
    pub max_concurrency: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            backoff_base: Duration::from_secs(2),
            max_concurrency: 1,
        }
    }
}

/// Exponential backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay after the first failed attempt.
    pub base: Duration,
}

impl BackoffPolicy {
    /// Delay after `attempt` (1-based) failed: `base * 2^(attempt - 1)`.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base.saturating_mul(1 << exponent)
    }
}

/// What a job asks the provider for.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// User segment of the prompt.
    pub prompt: String,
    /// Generation options.
    pub options: CompletionOptions,
}

/// One generation call travelling through the queue.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    /// Job identifier, for log correlation.
    pub id: Uuid,
    /// Target provider.
    pub provider: ProviderKind,
    /// What to generate.
    pub payload: GenerationRequest,
    /// Attempts started so far.
    pub attempt: u32,
    /// Attempt ceiling.
    pub max_attempts: u32,
    /// Per-attempt cutoff.
    pub timeout: Duration,
    /// Retry schedule.
    pub backoff: BackoffPolicy,
}

/// Funnels every generation call through a fixed number of slots.
#[derive(Debug, Clone)]
pub struct RequestQueue {
    config: QueueConfig,
    slots: Arc<Semaphore>,
}

impl RequestQueue {
    /// Creates a queue. A concurrency of zero is treated as one.
    #[must_use]
    pub fn new(config: QueueConfig) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            config,
        }
    }

    /// Queue configuration.
    #[must_use]
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Runs `payload` against `adapter`, retrying retryable failures.
    ///
    /// # Errors
    ///
    /// Returns the adapter's error when it is not retryable, and
    /// `LlmError::RetriesExhausted` once every attempt has failed.
    pub async fn submit(
        &self,
        adapter: &dyn ProviderAdapter,
        payload: GenerationRequest,
    ) -> Result<Completion, LlmError> {
        let mut job = QueuedJob {
            id: Uuid::new_v4(),
            provider: adapter.descriptor().kind,
            payload,
            attempt: 0,
            max_attempts: self.config.max_attempts.max(1),
            timeout: self.config.timeout,
            backoff: BackoffPolicy {
                base: self.config.backoff_base,
            },
        };

        loop {
            job.attempt += 1;
            debug!(job_id = %job.id, provider = %job.provider, attempt = job.attempt, "Running generation job");

            let error = match self.run_attempt(adapter, &job).await {
                Ok(completion) => return Ok(completion),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => e,
            };

            if job.attempt >= job.max_attempts {
                warn!(job_id = %job.id, provider = %job.provider, attempts = job.attempt, error = %error, "Generation job failed terminally");
                return Err(LlmError::RetriesExhausted {
                    provider: job.provider,
                    attempts: job.attempt,
                    last: Box::new(error),
                });
            }

            let delay = job.backoff.delay(job.attempt);
            warn!(
                job_id = %job.id,
                provider = %job.provider,
                attempt = job.attempt,
                retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "Retrying generation job"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn run_attempt(
        &self,
        adapter: &dyn ProviderAdapter,
        job: &QueuedJob,
    ) -> Result<Completion, LlmError> {
        let attempt = async {
            let _slot = self
                .slots
                .acquire()
                .await
                .map_err(|_| LlmError::QueueClosed)?;
            adapter
                .generate_completion(&job.payload.prompt, &job.payload.options)
                .await
        };

        match tokio::time::timeout(job.timeout, attempt).await {
            Ok(result) => result,
            Err(_) => {
                warn!(job_id = %job.id, provider = %job.provider, timeout_ms = u64::try_from(job.timeout.as_millis()).unwrap_or(u64::MAX), "Generation job timed out");
                Err(LlmError::Timeout {
                    provider: job.provider,
                    after: job.timeout,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::provider::{FinishReason, ProviderDescriptor};

    struct FlakyAdapter {
        descriptor: ProviderDescriptor,
        failures_left: AtomicU32,
        calls: AtomicU32,
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl FlakyAdapter {
        fn new(failures: u32, delay: Duration) -> Self {
            Self {
                descriptor: ProviderDescriptor {
                    kind: ProviderKind::Local,
                    default_model: "flaky".to_owned(),
                    max_tokens: 256,
                    chars_per_token: 4,
                },
                failures_left: AtomicU32::new(failures),
                calls: AtomicU32::new(0),
                delay,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ProviderAdapter for FlakyAdapter {
        fn descriptor(&self) -> &ProviderDescriptor {
            &self.descriptor
        }

        async fn generate_completion(
            &self,
            prompt: &str,
            _options: &CompletionOptions,
        ) -> Result<Completion, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let remaining = self.failures_left.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures_left.store(remaining - 1, Ordering::SeqCst);
                return Err(LlmError::Provider {
                    provider: ProviderKind::Local,
                    message: "connection reset".to_owned(),
                });
            }
            Ok(Completion {
                content: format!("echo: {prompt}"),
                tokens_used: 1,
                model: "flaky".to_owned(),
                finish_reason: FinishReason::Stop,
                tool_calls: Vec::new(),
                provider: ProviderKind::Local,
            })
        }
    }

    fn fast_config() -> QueueConfig {
        QueueConfig {
            timeout: Duration::from_millis(200),
            max_attempts: 3,
            backoff_base: Duration::from_millis(1),
            max_concurrency: 1,
        }
    }

    fn request(prompt: &str) -> GenerationRequest {
        GenerationRequest {
            prompt: prompt.to_owned(),
            options: CompletionOptions::default(),
        }
    }

    #[test]
    fn test_backoff_doubles_from_base() {
        let backoff = BackoffPolicy {
            base: Duration::from_secs(2),
        };
        assert_eq!(backoff.delay(1), Duration::from_secs(2));
        assert_eq!(backoff.delay(2), Duration::from_secs(4));
        assert_eq!(backoff.delay(3), Duration::from_secs(8));
    }

    #[tokio::test]
    async fn test_submit_retries_until_success() {
        let queue = RequestQueue::new(fast_config());
        let adapter = FlakyAdapter::new(2, Duration::ZERO);

        let completion = queue.submit(&adapter, request("hi")).await.unwrap();

        assert_eq!(completion.content, "echo: hi");
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_submit_surfaces_exhausted_retries() {
        let queue = RequestQueue::new(fast_config());
        let adapter = FlakyAdapter::new(10, Duration::ZERO);

        let err = queue.submit(&adapter, request("hi")).await.unwrap_err();

        assert!(matches!(err, LlmError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_submit_times_out_slow_job() {
        let queue = RequestQueue::new(QueueConfig {
            timeout: Duration::from_millis(10),
            max_attempts: 1,
            ..fast_config()
        });
        let adapter = FlakyAdapter::new(0, Duration::from_millis(500));

        let err = queue.submit(&adapter, request("hi")).await.unwrap_err();

        match err {
            LlmError::RetriesExhausted { last, .. } => {
                assert!(matches!(*last, LlmError::Timeout { .. }));
            }
            other => panic!("expected exhausted retries, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded_by_slots() {
        let queue = RequestQueue::new(QueueConfig {
            timeout: Duration::from_secs(5),
            ..fast_config()
        });
        let adapter = FlakyAdapter::new(0, Duration::from_millis(20));

        let (a, b, c) = tokio::join!(
            queue.submit(&adapter, request("a")),
            queue.submit(&adapter, request("b")),
            queue.submit(&adapter, request("c")),
        );

        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(adapter.peak.load(Ordering::SeqCst), 1);
    }
}
