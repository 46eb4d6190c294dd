//! Quality-gated publishing with bounded retry
//!
//! A candidate moves from pending to exactly one terminal outcome:
//!
//! ```text
//! Pending ─┬─ score < threshold ──────────────► Skipped(LowQuality)
//!          ├─ fingerprint already seen ───────► Skipped(Duplicate)
//!          └─ transport attempts ─┬─ Ok(id) ──► Published(id)
//!                                 ├─ Forbidden ► Failed(Forbidden)
//!                                 └─ budget spent ► Failed(Exhausted)
//! ```
//!
//! Retry decisions are made by [`RetryPolicy::decide`], a pure function of the
//! attempt number and the error, so the waiting is the only side effect left
//! in the loop.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::dedup::DuplicateFilter;
use crate::error::TransportError;
use crate::transport::PublishTransport;
use crate::types::ContentCandidate;

pub const DEFAULT_QUALITY_THRESHOLD: f64 = 0.8;
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(60);

/// Why a candidate was not sent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    LowQuality { score: f64, threshold: f64 },
    Duplicate,
}

/// Why sending failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    Forbidden { message: String },
    Exhausted { attempts: u32, last_error: String },
}

/// Terminal state of one publish attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PublishOutcome {
    Published { external_id: String, attempts: u32 },
    Skipped { reason: SkipReason },
    Failed { reason: FailureReason },
}

/// What to do after a failed attempt
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    Retry(Duration),
    Abort(FailureReason),
}

/// Bounded retry with a fixed rate-limit cooldown and linear backoff
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub rate_limit_cooldown: Duration,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES,
            rate_limit_cooldown: DEFAULT_RATE_LIMIT_COOLDOWN,
            base_delay: DEFAULT_RETRY_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Decide the next step after attempt number `attempt` (1-based) failed
    ///
    /// Rate-limit cooldowns count against the attempt budget like any other
    /// failure. No wait is scheduled after the final attempt.
    pub fn decide(&self, attempt: u32, error: &TransportError) -> RetryDecision {
        match error {
            TransportError::Forbidden(message) => RetryDecision::Abort(FailureReason::Forbidden {
                message: message.clone(),
            }),
            _ if attempt >= self.max_attempts => RetryDecision::Abort(FailureReason::Exhausted {
                attempts: attempt,
                last_error: error.to_string(),
            }),
            TransportError::RateLimited(_) => RetryDecision::Retry(self.rate_limit_cooldown),
            _ => RetryDecision::Retry(self.base_delay * attempt),
        }
    }
}

/// Turns candidates into confirmed posts
pub struct Publisher<'a> {
    transport: &'a dyn PublishTransport,
    policy: RetryPolicy,
    quality_threshold: f64,
}

impl<'a> Publisher<'a> {
    pub fn new(transport: &'a dyn PublishTransport, policy: RetryPolicy, quality_threshold: f64) -> Self {
        Self {
            transport,
            policy,
            quality_threshold,
        }
    }

    /// Run one candidate through the gates and the transport
    ///
    /// On `Published` the caller is responsible for recording the success in
    /// the usage ledger.
    pub async fn publish(
        &self,
        candidate: &ContentCandidate,
        filter: &mut DuplicateFilter,
    ) -> PublishOutcome {
        if candidate.score < self.quality_threshold {
            warn!(
                score = candidate.score,
                threshold = self.quality_threshold,
                "Candidate below quality threshold, skipping"
            );
            return PublishOutcome::Skipped {
                reason: SkipReason::LowQuality {
                    score: candidate.score,
                    threshold: self.quality_threshold,
                },
            };
        }

        if filter.is_duplicate(&candidate.text) {
            warn!(topic = %candidate.topic, "Similar content already posted, skipping");
            return PublishOutcome::Skipped {
                reason: SkipReason::Duplicate,
            };
        }

        self.send_with_retry(candidate).await
    }

    async fn send_with_retry(&self, candidate: &ContentCandidate) -> PublishOutcome {
        let transport_name = self.transport.name();
        let mut attempt = 1;

        loop {
            let error = match self.transport.post(&candidate.text).await {
                Ok(external_id) => {
                    info!(
                        transport = transport_name,
                        %external_id,
                        attempt,
                        score = candidate.score,
                        topic = %candidate.topic,
                        length = candidate.length,
                        "Post published"
                    );
                    return PublishOutcome::Published {
                        external_id,
                        attempts: attempt,
                    };
                }
                Err(e) => e,
            };

            match self.policy.decide(attempt, &error) {
                RetryDecision::Retry(delay) => {
                    warn!(
                        transport = transport_name,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        "Transient error: {}. Retrying in {}",
                        error,
                        humantime::format_duration(delay)
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                RetryDecision::Abort(reason) => {
                    match &reason {
                        FailureReason::Forbidden { .. } => error!(
                            transport = transport_name,
                            "Permission denied by transport, check credentials: {}", error
                        ),
                        FailureReason::Exhausted { attempts, .. } => warn!(
                            transport = transport_name,
                            "Giving up after {} attempts: {}", attempts, error
                        ),
                    }
                    return PublishOutcome::Failed { reason };
                }
            }
        }
    }
}
