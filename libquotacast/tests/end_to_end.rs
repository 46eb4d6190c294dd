//! End-to-end pipeline tests
//!
//! Each test drives `RunController::run_once` against mock generators and
//! transports with all state in a temp directory, then inspects the
//! persisted ledger and duplicate index.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone};
use libquotacast::config::Config;
use libquotacast::dedup::DuplicateFilter;
use libquotacast::error::TransportError;
use libquotacast::generator::mock::MockGenerator;
use libquotacast::generator::ContentGenerator;
use libquotacast::ledger::UsageRecord;
use libquotacast::publisher::{FailureReason, PublishOutcome, SkipReason};
use libquotacast::transport::mock::MockTransport;
use libquotacast::{ContentCandidate, RunController, RunOutcome};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.storage.ledger_path = dir.path().join("usage_data.json").to_string_lossy().to_string();
    config.storage.duplicate_index_path =
        dir.path().join("content_hashes.json").to_string_lossy().to_string();
    config.publish.rate_limit_cooldown_secs = 0;
    config.publish.retry_base_delay_secs = 0;
    config
}

fn at(day: u32, hour: u32) -> DateTime<Local> {
    Local.with_ymd_and_hms(2025, 1, day, hour, 0, 0).unwrap()
}

fn candidate(text: &str, score: f64) -> ContentCandidate {
    ContentCandidate::new(text, vec!["#focus".to_string()], "Efficiency", score)
}

/// Hands out a different candidate on every call
struct SequenceGenerator {
    next: AtomicUsize,
}

impl SequenceGenerator {
    fn new() -> Self {
        Self {
            next: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ContentGenerator for SequenceGenerator {
    async fn generate(&self) -> libquotacast::Result<ContentCandidate> {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        Ok(candidate(&format!("Tip number {}: batch your email twice a day.", n), 0.9))
    }

    fn name(&self) -> &str {
        "sequence"
    }
}

fn load_ledger(config: &Config) -> Result<UsageRecord> {
    let content = std::fs::read_to_string(config.ledger_path())?;
    Ok(serde_json::from_str(&content)?)
}

#[tokio::test]
async fn test_fresh_ledger_publishes_and_records() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = test_config(&temp_dir);
    let generator = MockGenerator::returning(candidate(
        "Write the three decisions you need before the meeting starts.",
        0.92,
    ));
    let transport = MockTransport::scripted("mock", vec![Ok("123".to_string())]);

    let report = RunController::new(&config, &generator, &transport)
        .run_once(at(2, 9))
        .await;

    assert_eq!(
        report.outcome,
        RunOutcome::Attempted {
            outcome: PublishOutcome::Published {
                external_id: "123".to_string(),
                attempts: 1,
            }
        }
    );
    assert_eq!(report.exit_code(), 0);
    assert!(report.ledger_persisted);

    let record = load_ledger(&config)?;
    assert_eq!(record.daily_count, 1);
    assert_eq!(record.monthly_count, 1);
    assert_eq!(record.total_posts, 1);
    assert_eq!(record.quality_posts, 1);
    assert_eq!(record.post_history.len(), 1);
    assert_eq!(record.post_history[0].score, 0.92);
    assert_eq!(record.post_history[0].external_id, "123");

    let filter = DuplicateFilter::open(config.duplicate_index_path(), 100)?;
    assert_eq!(filter.index().len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_exhausted_daily_quota_stops_before_generation() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = test_config(&temp_dir);

    let ledger = config.usage_ledger();
    let mut record = UsageRecord::fresh(at(2, 8));
    record.daily_count = 3;
    record.monthly_count = 3;
    ledger.persist(&record)?;

    let generator = MockGenerator::returning(candidate("anything", 0.95));
    let transport = MockTransport::success("mock");

    let report = RunController::new(&config, &generator, &transport)
        .run_once(at(2, 12))
        .await;

    assert_eq!(report.outcome, RunOutcome::QuotaExhausted);
    assert_eq!(report.exit_code(), 3);
    assert!(!report.quota.unwrap().allowed);
    assert_eq!(generator.call_count(), 0);
    assert_eq!(transport.post_call_count(), 0);

    Ok(())
}

#[tokio::test]
async fn test_rate_limited_twice_exhausts_without_touching_ledger() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = test_config(&temp_dir);
    let generator = MockGenerator::returning(candidate(
        "Keep a running list of questions for your next one-on-one.",
        0.9,
    ));
    let transport = MockTransport::always_failing(
        "mock",
        TransportError::RateLimited("429 Too Many Requests".to_string()),
    );

    let report = RunController::new(&config, &generator, &transport)
        .run_once(at(2, 9))
        .await;

    match &report.outcome {
        RunOutcome::Attempted {
            outcome:
                PublishOutcome::Failed {
                    reason: FailureReason::Exhausted { attempts, .. },
                },
        } => assert_eq!(*attempts, 2),
        other => panic!("expected exhausted failure, got {:?}", other),
    }
    assert_eq!(report.exit_code(), 1);
    assert_eq!(transport.post_call_count(), 2);
    assert!(!config.ledger_path().exists());

    Ok(())
}

#[tokio::test]
async fn test_forbidden_is_not_retried() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = test_config(&temp_dir);
    let generator = MockGenerator::returning(candidate("Review your calendar every Friday.", 0.9));
    let transport = MockTransport::always_failing(
        "mock",
        TransportError::Forbidden("invalid credentials".to_string()),
    );

    let report = RunController::new(&config, &generator, &transport)
        .run_once(at(2, 9))
        .await;

    assert_eq!(report.exit_code(), 2);
    assert_eq!(transport.post_call_count(), 1);
    assert!(!config.ledger_path().exists());

    Ok(())
}

#[tokio::test]
async fn test_low_quality_candidate_is_skipped() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = test_config(&temp_dir);
    let generator = MockGenerator::returning(candidate("meh", 0.6));
    let transport = MockTransport::success("mock");

    let report = RunController::new(&config, &generator, &transport)
        .run_once(at(2, 9))
        .await;

    assert_eq!(
        report.outcome,
        RunOutcome::Attempted {
            outcome: PublishOutcome::Skipped {
                reason: SkipReason::LowQuality {
                    score: 0.6,
                    threshold: 0.8,
                },
            }
        }
    );
    assert_eq!(transport.post_call_count(), 0);
    assert!(!config.ledger_path().exists());

    Ok(())
}

#[tokio::test]
async fn test_repeated_content_is_skipped_on_next_run() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = test_config(&temp_dir);
    let generator = MockGenerator::returning(candidate(
        "Block two hours of deep work before lunch.",
        0.9,
    ));
    let transport = MockTransport::success("mock");
    let controller = RunController::new(&config, &generator, &transport);

    assert!(controller.run_once(at(2, 9)).await.outcome.is_published());

    let second = controller.run_once(at(2, 13)).await;
    assert_eq!(
        second.outcome,
        RunOutcome::Attempted {
            outcome: PublishOutcome::Skipped {
                reason: SkipReason::Duplicate
            }
        }
    );
    assert_eq!(transport.post_call_count(), 1);
    assert_eq!(load_ledger(&config)?.daily_count, 1);

    Ok(())
}

#[tokio::test]
async fn test_daily_quota_resets_next_day() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = test_config(&temp_dir);
    let generator = SequenceGenerator::new();
    let transport = MockTransport::success("mock");
    let controller = RunController::new(&config, &generator, &transport);

    for hour in [8, 12, 16] {
        let report = controller.run_once(at(2, hour)).await;
        assert!(report.outcome.is_published(), "{}", report.outcome);
    }

    let blocked = controller.run_once(at(2, 20)).await;
    assert_eq!(blocked.outcome, RunOutcome::QuotaExhausted);

    let next_day = controller.run_once(at(3, 8)).await;
    assert!(next_day.outcome.is_published());

    let record = load_ledger(&config)?;
    assert_eq!(record.current_date, "2025-01-03");
    assert_eq!(record.daily_count, 1);
    assert_eq!(record.monthly_count, 4);
    assert_eq!(record.total_posts, 4);
    assert_eq!(record.post_history.len(), 4);

    Ok(())
}

#[tokio::test]
async fn test_monthly_quota_blocks_until_next_month() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut config = test_config(&temp_dir);
    config.quota.monthly_limit = 2;
    let generator = SequenceGenerator::new();
    let transport = MockTransport::success("mock");
    let controller = RunController::new(&config, &generator, &transport);

    assert!(controller.run_once(at(10, 9)).await.outcome.is_published());
    assert!(controller.run_once(at(11, 9)).await.outcome.is_published());
    assert_eq!(
        controller.run_once(at(12, 9)).await.outcome,
        RunOutcome::QuotaExhausted
    );

    let february = Local.with_ymd_and_hms(2025, 2, 1, 9, 0, 0).unwrap();
    assert!(controller.run_once(february).await.outcome.is_published());

    let record = load_ledger(&config)?;
    assert_eq!(record.current_month, "2025-02");
    assert_eq!(record.monthly_count, 1);
    assert_eq!(record.total_posts, 3);

    Ok(())
}

#[tokio::test]
async fn test_history_is_capped() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut config = test_config(&temp_dir);
    config.quota.daily_limit = 10;
    config.storage.history_retention = 3;
    let generator = SequenceGenerator::new();
    let transport = MockTransport::success("mock");
    let controller = RunController::new(&config, &generator, &transport);

    for hour in 8..13 {
        assert!(controller.run_once(at(2, hour)).await.outcome.is_published());
    }

    let record = load_ledger(&config)?;
    assert_eq!(record.total_posts, 5);
    assert_eq!(record.post_history.len(), 3);
    let oldest = record.post_history[0].timestamp;
    assert!(oldest >= at(2, 10).with_timezone(&chrono::Utc));
    assert!(oldest < at(2, 11).with_timezone(&chrono::Utc));

    Ok(())
}
