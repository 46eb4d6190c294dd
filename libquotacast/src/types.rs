//! Core types for Quotacast

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ledger::timestamp;

/// A generated piece of content that has not been published yet.
///
/// Owned by a single publish attempt and discarded afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentCandidate {
    /// Final text sent to the transport (base text plus hashtags)
    pub text: String,
    /// Text before hashtags were appended; this is what gets scored
    pub base_text: String,
    pub score: f64,
    pub topic: String,
    pub hashtags: Vec<String>,
    /// Character count of `text`
    pub length: usize,
}

impl ContentCandidate {
    pub fn new(base_text: &str, hashtags: Vec<String>, topic: &str, score: f64) -> Self {
        let text = if hashtags.is_empty() {
            base_text.to_string()
        } else {
            format!("{} {}", base_text, hashtags.join(" "))
        };
        let length = text.chars().count();
        Self {
            text,
            base_text: base_text.to_string(),
            score,
            topic: topic.to_string(),
            hashtags,
            length,
        }
    }
}

/// A confirmed publication, kept in the ledger history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub timestamp: DateTime<Utc>,
    #[serde(alias = "tweet_id")]
    pub external_id: String,
    #[serde(alias = "quality_score")]
    pub score: f64,
    pub topic: String,
    #[serde(alias = "content_length")]
    pub length: usize,
    #[serde(default)]
    pub hashtags: Vec<String>,
}

impl PostRecord {
    pub fn from_candidate(
        candidate: &ContentCandidate,
        external_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            timestamp,
            external_id: external_id.to_string(),
            score: candidate.score,
            topic: candidate.topic.clone(),
            length: candidate.length,
            hashtags: candidate.hashtags.clone(),
        }
    }
}

/// A subject the generator can write about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub name: String,
    pub prompt: String,
    pub hashtags: Vec<String>,
    /// Weight in (0, 1] applied to the quality score and to topic selection
    #[serde(default = "default_multiplier")]
    pub quality_multiplier: f64,
}

fn default_multiplier() -> f64 {
    1.0
}
