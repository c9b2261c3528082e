use crate::config::RetryConfig;
use crate::error::RetryError;
use crate::events::RetryEvent;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::time;

/// Executes an operation under a retry budget, backoff schedule, and
/// optional deadline.
///
/// The deadline binds the whole sequence: each attempt races it directly,
/// and a backoff wait that would cross it short-circuits to a deadline
/// error instead of sleeping. The wrapped operation is given no way to
/// outlive the deadline, so a stuck downstream cannot pin the caller.
pub struct RetryPolicy<E> {
    config: Arc<RetryConfig<E>>,
}

impl<E> RetryPolicy<E> {
    /// Creates a policy from a configuration.
    pub fn new(config: Arc<RetryConfig<E>>) -> Self {
        Self { config }
    }

    /// Returns the configured attempt budget.
    pub fn max_attempts(&self) -> usize {
        self.config.max_attempts
    }

    /// Returns whether `error` is worth retrying under the configured
    /// predicate.
    pub fn should_retry(&self, error: &E) -> bool {
        self.config.predicate.as_ref().map_or(true, |p| p(error))
    }

    /// Runs `op` until it succeeds, the attempt budget runs out, or the
    /// deadline (the configured one, or `deadline` if given, whichever is
    /// sooner) expires.
    pub async fn run<T, F, Fut>(
        &self,
        deadline: Option<time::Instant>,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let started = Instant::now();
        let deadline = match (deadline, self.config.deadline) {
            (Some(explicit), Some(configured)) => {
                Some(explicit.min(time::Instant::now() + configured))
            }
            (Some(explicit), None) => Some(explicit),
            (None, Some(configured)) => Some(time::Instant::now() + configured),
            (None, None) => None,
        };

        let mut attempt = 0;
        loop {
            let result = match deadline {
                Some(at) => match time::timeout_at(at, op()).await {
                    Ok(result) => result,
                    Err(_) => {
                        let after = started.elapsed();
                        self.emit(RetryEvent::DeadlineExceeded {
                            gate_name: self.config.name.clone(),
                            timestamp: Instant::now(),
                            after,
                        });
                        return Err(RetryError::DeadlineExceeded { after });
                    }
                },
                None => op().await,
            };

            match result {
                Ok(response) => {
                    self.emit(RetryEvent::Succeeded {
                        gate_name: self.config.name.clone(),
                        timestamp: Instant::now(),
                        attempts: attempt + 1,
                    });

                    #[cfg(feature = "metrics")]
                    metrics::counter!("retry_outcomes_total", "executor" => self.config.name.clone(), "outcome" => "success")
                        .increment(1);

                    return Ok(response);
                }
                Err(error) => {
                    if !self.should_retry(&error) {
                        self.emit(RetryEvent::NotRetryable {
                            gate_name: self.config.name.clone(),
                            timestamp: Instant::now(),
                            attempts: attempt + 1,
                        });
                        return Err(RetryError::Exhausted {
                            attempts: attempt + 1,
                            last: error,
                        });
                    }

                    if attempt + 1 >= self.config.max_attempts {
                        self.emit(RetryEvent::Exhausted {
                            gate_name: self.config.name.clone(),
                            timestamp: Instant::now(),
                            attempts: attempt + 1,
                        });

                        #[cfg(feature = "metrics")]
                        metrics::counter!("retry_outcomes_total", "executor" => self.config.name.clone(), "outcome" => "exhausted")
                            .increment(1);

                        return Err(RetryError::Exhausted {
                            attempts: attempt + 1,
                            last: error,
                        });
                    }

                    let delay = self.config.schedule.delay_for(attempt);
                    if let Some(at) = deadline {
                        // A wait crossing the deadline cannot be followed by
                        // a useful attempt.
                        if time::Instant::now() + delay >= at {
                            let after = started.elapsed();
                            self.emit(RetryEvent::DeadlineExceeded {
                                gate_name: self.config.name.clone(),
                                timestamp: Instant::now(),
                                after,
                            });
                            return Err(RetryError::DeadlineExceeded { after });
                        }
                    }

                    self.emit(RetryEvent::Retrying {
                        gate_name: self.config.name.clone(),
                        timestamp: Instant::now(),
                        attempt: attempt + 1,
                        delay,
                    });

                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        executor = %self.config.name,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "retrying after failed attempt"
                    );

                    time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    fn emit(&self, event: RetryEvent) {
        self.config.event_listeners.emit(&event);
    }
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
        }
    }
}
