//! Quotacast - quota-governed content publishing
//!
//! Each invocation of the pipeline generates at most one piece of content,
//! scores it, filters out near-duplicates and publishes it through an
//! external transport, while a durable usage ledger keeps the number of
//! posts within daily and monthly limits.

pub mod config;
pub mod controller;
pub mod dedup;
pub mod error;
pub mod generator;
pub mod ledger;
pub mod logging;
pub mod publisher;
pub mod scorer;
pub mod store;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use controller::{RunController, RunOutcome, RunReport};
pub use error::{QuotacastError, Result};
pub use generator::ContentGenerator;
pub use ledger::{QuotaStatus, UsageLedger, UsageRecord};
pub use publisher::{PublishOutcome, Publisher};
pub use transport::PublishTransport;
pub use types::{ContentCandidate, PostRecord, Topic};
