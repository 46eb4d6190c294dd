//! Persistent usage ledger with calendar rollover
//!
//! The ledger is a single [`UsageRecord`] that is loaded at the start of an
//! invocation, passed explicitly through the pipeline and persisted at the end.
//! Rollover is keyed on the calendar date and month, never on elapsed time:
//! every load recomputes "today" and "this month" from the supplied clock and
//! resets whichever counter has a stale key.
//!
//! # Schema migration
//!
//! Missing fields take their defaults (zero counters, empty history, timestamps
//! set to load time). Timestamps without a UTC offset, as written by older
//! versions, are read as local time.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::store;
use crate::types::{ContentCandidate, PostRecord};

pub const CURRENT_SCHEMA_VERSION: u32 = 1;

pub const DEFAULT_DAILY_LIMIT: u32 = 3;
pub const DEFAULT_MONTHLY_LIMIT: u32 = 90;
pub const DEFAULT_HISTORY_RETENTION: usize = 50;

/// Format of the daily rollover key
pub const DATE_KEY_FORMAT: &str = "%Y-%m-%d";
/// Format of the monthly rollover key
pub const MONTH_KEY_FORMAT: &str = "%Y-%m";

/// Persisted usage counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    #[serde(default)]
    pub schema_version: u32,
    #[serde(default)]
    pub current_date: String,
    #[serde(default)]
    pub current_month: String,
    #[serde(default)]
    pub daily_count: u32,
    #[serde(default)]
    pub monthly_count: u32,
    #[serde(default)]
    pub total_posts: u32,
    #[serde(default)]
    pub quality_posts: u32,
    #[serde(default)]
    pub post_history: Vec<PostRecord>,
    #[serde(default, deserialize_with = "timestamp::deserialize_option")]
    pub last_update: Option<DateTime<Utc>>,
    #[serde(default = "Utc::now", deserialize_with = "timestamp::deserialize")]
    pub last_reset: DateTime<Utc>,
    #[serde(default = "Utc::now", deserialize_with = "timestamp::deserialize")]
    pub system_start: DateTime<Utc>,
}

/// Which counters a load reset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rollover {
    pub daily: bool,
    pub monthly: bool,
}

impl UsageRecord {
    /// A record with zeroed counters keyed to `now`
    pub fn fresh(now: DateTime<Local>) -> Self {
        let now_utc = now.with_timezone(&Utc);
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            current_date: now.format(DATE_KEY_FORMAT).to_string(),
            current_month: now.format(MONTH_KEY_FORMAT).to_string(),
            daily_count: 0,
            monthly_count: 0,
            total_posts: 0,
            quality_posts: 0,
            post_history: Vec::new(),
            last_update: None,
            last_reset: now_utc,
            system_start: now_utc,
        }
    }

    /// Reset counters whose calendar key no longer matches `now`
    ///
    /// The daily and monthly checks are independent; both fire when the record
    /// was last touched in an earlier month.
    pub fn roll_over(&mut self, now: DateTime<Local>) -> Rollover {
        let today = now.format(DATE_KEY_FORMAT).to_string();
        let this_month = now.format(MONTH_KEY_FORMAT).to_string();
        let mut rollover = Rollover::default();

        if self.current_date != today {
            info!(from = %self.current_date, to = %today, "Daily counter reset");
            self.current_date = today;
            self.daily_count = 0;
            self.last_reset = now.with_timezone(&Utc);
            rollover.daily = true;
        }

        if self.current_month != this_month {
            info!(from = %self.current_month, to = %this_month, "Monthly counter reset");
            self.current_month = this_month;
            self.monthly_count = 0;
            self.last_reset = now.with_timezone(&Utc);
            rollover.monthly = true;
        }

        rollover
    }

    /// Timestamp of the most recent confirmed post
    pub fn last_post_at(&self) -> Option<DateTime<Utc>> {
        self.post_history.last().map(|p| p.timestamp)
    }
}

/// Configured post ceilings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaLimits {
    pub daily: u32,
    pub monthly: u32,
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self {
            daily: DEFAULT_DAILY_LIMIT,
            monthly: DEFAULT_MONTHLY_LIMIT,
        }
    }
}

/// Result of a quota check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaStatus {
    pub allowed: bool,
    pub daily_remaining: i64,
    pub monthly_remaining: i64,
}

/// File-backed usage ledger
pub struct UsageLedger {
    path: PathBuf,
    limits: QuotaLimits,
    history_retention: usize,
}

impl UsageLedger {
    pub fn new(path: impl Into<PathBuf>, limits: QuotaLimits, history_retention: usize) -> Self {
        Self {
            path: path.into(),
            limits,
            history_retention,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn limits(&self) -> QuotaLimits {
        self.limits
    }

    /// Load the record, creating a fresh one if none exists, then apply rollover
    ///
    /// Loading never writes; the rolled-over record is persisted only when the
    /// caller persists it.
    pub fn load(&self, now: DateTime<Local>) -> Result<UsageRecord, StoreError> {
        let mut record = match store::read_json::<UsageRecord>(&self.path)? {
            Some(record) => record,
            None => {
                info!(path = %self.path.display(), "No usage ledger found, starting fresh");
                UsageRecord::fresh(now)
            }
        };

        if record.schema_version < CURRENT_SCHEMA_VERSION {
            debug!(
                from = record.schema_version,
                to = CURRENT_SCHEMA_VERSION,
                "Migrating usage ledger schema"
            );
            record.schema_version = CURRENT_SCHEMA_VERSION;
        }

        record.roll_over(now);
        Ok(record)
    }

    /// Remaining quota for the record
    pub fn check_quota(&self, record: &UsageRecord) -> QuotaStatus {
        let daily_remaining = i64::from(self.limits.daily) - i64::from(record.daily_count);
        let monthly_remaining = i64::from(self.limits.monthly) - i64::from(record.monthly_count);

        QuotaStatus {
            allowed: daily_remaining > 0 && monthly_remaining > 0,
            daily_remaining,
            monthly_remaining,
        }
    }

    /// Account for a confirmed publication
    pub fn record_success(
        &self,
        mut record: UsageRecord,
        candidate: &ContentCandidate,
        external_id: &str,
        now: DateTime<Local>,
    ) -> UsageRecord {
        let now_utc = now.with_timezone(&Utc);

        record.daily_count += 1;
        record.monthly_count += 1;
        record.total_posts += 1;
        record.quality_posts += 1;

        record
            .post_history
            .push(PostRecord::from_candidate(candidate, external_id, now_utc));
        if record.post_history.len() > self.history_retention {
            let excess = record.post_history.len() - self.history_retention;
            record.post_history.drain(..excess);
        }

        record.last_update = Some(now_utc);

        if record.daily_count > self.limits.daily || record.monthly_count > self.limits.monthly {
            warn!(
                daily = record.daily_count,
                monthly = record.monthly_count,
                "Recorded post exceeds configured quota"
            );
        }

        record
    }

    /// Atomically overwrite the durable store
    pub fn persist(&self, record: &UsageRecord) -> Result<(), StoreError> {
        store::write_json_atomic(&self.path, record)
    }
}

/// Serde helpers accepting both RFC 3339 and offset-less ISO timestamps
pub(crate) mod timestamp {
    use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
    use serde::{de, Deserialize, Deserializer};

    pub fn parse(raw: &str) -> Result<DateTime<Utc>, String> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Ok(dt.with_timezone(&Utc));
        }

        let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map_err(|e| format!("invalid timestamp '{}': {}", raw, e))?;
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| format!("timestamp '{}' does not exist in local time", raw))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(de::Error::custom)
    }

    pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => parse(&raw).map(Some).map_err(de::Error::custom),
            None => Ok(None),
        }
    }
}
