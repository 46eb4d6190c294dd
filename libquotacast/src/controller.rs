//! One scheduled tick of the publishing pipeline
//!
//! The steps always run in this order, and a later step never starts unless
//! the earlier ones allow it:
//!
//! 1. take the run lock and load the usage ledger
//! 2. check the quota (and the optional minimum interval)
//! 3. obtain a candidate, falling back to the pre-vetted list
//! 4. publish through the quality and duplicate gates
//! 5. record a confirmed post in the ledger and persist it
//!
//! The ledger is only mutated after the transport confirmed the post. Errors
//! never escape [`RunController::run_once`]; they become a
//! [`RunOutcome::SystemFailure`] in the returned report.

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::dedup::DuplicateFilter;
use crate::error::{QuotacastError, Result, StoreError};
use crate::generator::{fallback, ContentGenerator};
use crate::ledger::{QuotaStatus, UsageRecord};
use crate::publisher::{FailureReason, PublishOutcome, Publisher};
use crate::store::{lock_path_for, RunLock};
use crate::transport::PublishTransport;
use crate::types::ContentCandidate;

/// How a run ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Daily or monthly quota used up; nothing was generated or sent
    QuotaExhausted,
    /// The previous post is more recent than the configured minimum interval
    Throttled { retry_in_secs: u64 },
    /// Another run holds the lock
    Busy,
    /// A candidate went through the publisher
    Attempted { outcome: PublishOutcome },
    TimedOut,
    Cancelled,
    SystemFailure { message: String },
}

impl RunOutcome {
    /// Process exit status for this outcome
    ///
    /// 0 posted, 3 skipped by policy or quota, 2 forbidden, 1 any other failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Attempted {
                outcome: PublishOutcome::Published { .. },
            } => 0,
            RunOutcome::Attempted {
                outcome: PublishOutcome::Skipped { .. },
            }
            | RunOutcome::QuotaExhausted
            | RunOutcome::Throttled { .. }
            | RunOutcome::Busy => 3,
            RunOutcome::Attempted {
                outcome:
                    PublishOutcome::Failed {
                        reason: FailureReason::Forbidden { .. },
                    },
            } => 2,
            RunOutcome::Attempted {
                outcome: PublishOutcome::Failed { .. },
            }
            | RunOutcome::TimedOut
            | RunOutcome::Cancelled
            | RunOutcome::SystemFailure { .. } => 1,
        }
    }

    pub fn is_published(&self) -> bool {
        matches!(
            self,
            RunOutcome::Attempted {
                outcome: PublishOutcome::Published { .. }
            }
        )
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::QuotaExhausted => write!(f, "skipped: quota exhausted"),
            RunOutcome::Throttled { retry_in_secs } => write!(
                f,
                "skipped: minimum interval not reached (retry in {})",
                humantime::format_duration(Duration::from_secs(*retry_in_secs))
            ),
            RunOutcome::Busy => write!(f, "skipped: another run is in progress"),
            RunOutcome::Attempted { outcome } => match outcome {
                PublishOutcome::Published {
                    external_id,
                    attempts,
                } => write!(f, "published {} (attempt {})", external_id, attempts),
                PublishOutcome::Skipped { reason } => write!(f, "skipped: {:?}", reason),
                PublishOutcome::Failed { reason } => match reason {
                    FailureReason::Forbidden { message } => write!(f, "failed: forbidden ({})", message),
                    FailureReason::Exhausted {
                        attempts,
                        last_error,
                    } => write!(f, "failed after {} attempts: {}", attempts, last_error),
                },
            },
            RunOutcome::TimedOut => write!(f, "failed: run timed out"),
            RunOutcome::Cancelled => write!(f, "cancelled"),
            RunOutcome::SystemFailure { message } => write!(f, "system failure: {}", message),
        }
    }
}

/// Structured record of one run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub quota: Option<QuotaStatus>,
    pub topic: Option<String>,
    pub score: Option<f64>,
    pub used_fallback: bool,
    /// Whether a confirmed post was written to the ledger
    pub ledger_persisted: bool,
    pub outcome: RunOutcome,
}

impl RunReport {
    pub fn exit_code(&self) -> i32 {
        self.outcome.exit_code()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run {} at {}", self.run_id, self.started_at.to_rfc3339())?;
        if let Some(quota) = &self.quota {
            writeln!(
                f,
                "  Quota: {} today, {} this month remaining",
                quota.daily_remaining, quota.monthly_remaining
            )?;
        }
        if let Some(topic) = &self.topic {
            let source = if self.used_fallback { " (fallback)" } else { "" };
            writeln!(f, "  Topic: {}{}", topic, source)?;
        }
        if let Some(score) = self.score {
            writeln!(f, "  Score: {:.3}", score)?;
        }
        writeln!(f, "  Outcome: {}", self.outcome)?;
        write!(f, "  Elapsed: {}ms", self.elapsed_ms)
    }
}

/// Facts collected while a run progresses
#[derive(Default)]
struct RunDetails {
    quota: Option<QuotaStatus>,
    topic: Option<String>,
    score: Option<f64>,
    used_fallback: bool,
    ledger_persisted: bool,
}

/// Drives a single invocation of the pipeline
pub struct RunController<'a> {
    config: &'a Config,
    generator: &'a dyn ContentGenerator,
    transport: &'a dyn PublishTransport,
}

impl<'a> RunController<'a> {
    pub fn new(
        config: &'a Config,
        generator: &'a dyn ContentGenerator,
        transport: &'a dyn PublishTransport,
    ) -> Self {
        Self {
            config,
            generator,
            transport,
        }
    }

    /// Run one tick
    pub async fn run_once(&self, now: DateTime<Local>) -> RunReport {
        self.run_once_until(now, std::future::pending::<()>()).await
    }

    /// Run one tick, abandoning it when `cancel` completes
    ///
    /// `now` is the wall-clock start of the run; a confirmed post is stamped
    /// with `now` plus the monotonic time elapsed until confirmation.
    ///
    /// Cancellation only takes effect while generating or publishing; once the
    /// transport has confirmed a post, the ledger update always runs.
    pub async fn run_once_until<F>(&self, now: DateTime<Local>, cancel: F) -> RunReport
    where
        F: Future<Output = ()>,
    {
        let started = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let mut details = RunDetails::default();

        info!(%run_id, "Run started");
        let outcome = match self.execute(now, cancel, &mut details).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(%run_id, error = ?e, "Run failed: {}", e);
                RunOutcome::SystemFailure {
                    message: e.to_string(),
                }
            }
        };

        let report = RunReport {
            run_id,
            started_at: now.with_timezone(&Utc),
            elapsed_ms: started.elapsed().as_millis() as u64,
            quota: details.quota,
            topic: details.topic,
            score: details.score,
            used_fallback: details.used_fallback,
            ledger_persisted: details.ledger_persisted,
            outcome,
        };

        info!(
            run_id = %report.run_id,
            topic = report.topic.as_deref().unwrap_or("-"),
            score = report.score.unwrap_or_default(),
            exit_code = report.exit_code(),
            "Run finished: {}",
            report.outcome
        );
        report
    }

    async fn execute<F>(
        &self,
        now: DateTime<Local>,
        cancel: F,
        details: &mut RunDetails,
    ) -> Result<RunOutcome>
    where
        F: Future<Output = ()>,
    {
        let clock = Instant::now();
        let ledger = self.config.usage_ledger();

        let _lock = if self.config.storage.lock {
            let lock_path = lock_path_for(ledger.path());
            match RunLock::acquire(&lock_path, self.config.run_timeout() * 2) {
                Ok(lock) => Some(lock),
                Err(StoreError::Locked(path)) => {
                    warn!(path = %path.display(), "Another run is in progress, skipping");
                    return Ok(RunOutcome::Busy);
                }
                Err(e) => return Err(e.into()),
            }
        } else {
            None
        };

        let record = ledger.load(now)?;
        let quota = ledger.check_quota(&record);
        details.quota = Some(quota);
        info!(
            daily = record.daily_count,
            daily_limit = ledger.limits().daily,
            monthly = record.monthly_count,
            monthly_limit = ledger.limits().monthly,
            total = record.total_posts,
            "Usage status"
        );

        if !quota.allowed {
            warn!(
                daily_remaining = quota.daily_remaining,
                monthly_remaining = quota.monthly_remaining,
                "Posting quota exhausted"
            );
            return Ok(RunOutcome::QuotaExhausted);
        }

        if let Some(wait) = self.throttle_remaining(&record, now) {
            info!("Minimum interval not reached, next post in {}", humantime::format_duration(wait));
            return Ok(RunOutcome::Throttled {
                retry_in_secs: wait.as_secs(),
            });
        }

        let mut filter = DuplicateFilter::open(
            self.config.duplicate_index_path(),
            self.config.storage.duplicate_retention,
        )?;
        let publisher = Publisher::new(
            self.transport,
            self.config.retry_policy(),
            self.config.quality.threshold,
        );

        let work = async {
            let (candidate, used_fallback) = self.obtain_candidate().await?;
            info!(
                topic = %candidate.topic,
                score = candidate.score,
                length = candidate.length,
                fallback = used_fallback,
                "Candidate ready"
            );
            let outcome = publisher.publish(&candidate, &mut filter).await;
            Ok::<_, QuotacastError>((candidate, used_fallback, outcome))
        };

        let (candidate, used_fallback, outcome) = tokio::select! {
            result = timeout(self.config.run_timeout(), work) => match result {
                Ok(result) => result?,
                Err(_) => {
                    warn!(timeout = %humantime::format_duration(self.config.run_timeout()), "Run timed out before a post was confirmed");
                    return Ok(RunOutcome::TimedOut);
                }
            },
            _ = cancel => {
                warn!("Run cancelled before a post was confirmed");
                return Ok(RunOutcome::Cancelled);
            }
        };

        details.topic = Some(candidate.topic.clone());
        details.score = Some(candidate.score);
        details.used_fallback = used_fallback;

        if let PublishOutcome::Published { external_id, .. } = &outcome {
            // Charged to the day the post was confirmed, which may differ from `now`
            let confirmed_at = now
                + chrono::Duration::from_std(clock.elapsed()).unwrap_or_else(|_| chrono::Duration::zero());
            let mut record = record;
            record.roll_over(confirmed_at);
            let record = ledger.record_success(record, &candidate, external_id, confirmed_at);
            match ledger.persist(&record) {
                Ok(()) => details.ledger_persisted = true,
                Err(e) => warn!(
                    path = %ledger.path().display(),
                    "Failed to persist usage ledger, next run may exceed quota: {}", e
                ),
            }
        }

        Ok(RunOutcome::Attempted { outcome })
    }

    async fn obtain_candidate(&self) -> Result<(ContentCandidate, bool)> {
        match self.generator.generate().await {
            Ok(candidate) => Ok((candidate, false)),
            Err(e) => {
                warn!(
                    generator = self.generator.name(),
                    "Content generation failed, using fallback: {}", e
                );
                let candidate = fallback::pick_fallback(&mut rand::thread_rng())
                    .ok_or_else(|| QuotacastError::Generator("fallback list is empty".to_string()))?;
                Ok((candidate, true))
            }
        }
    }

    fn throttle_remaining(&self, record: &UsageRecord, now: DateTime<Local>) -> Option<Duration> {
        let min_interval = self.config.min_interval();
        if min_interval.is_zero() {
            return None;
        }

        let last = record.last_post_at()?;
        let since = (now.with_timezone(&Utc) - last).to_std().unwrap_or(Duration::ZERO);
        min_interval.checked_sub(since).filter(|wait| !wait.is_zero())
    }
}
