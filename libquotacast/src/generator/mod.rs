//! Content generation seam and candidate composition
//!
//! Writing the actual text is delegated to a [`ContentGenerator`]. This module
//! owns everything around it: the topic catalog with weighted selection,
//! hashtag selection, truncation to the post length limit and scoring of the
//! resulting [`ContentCandidate`].

use async_trait::async_trait;
use rand::distributions::WeightedIndex;
use rand::prelude::*;

use crate::error::Result;
use crate::scorer;
use crate::types::{ContentCandidate, Topic};

pub mod command;
pub mod fallback;

// Mock generator is available for all builds (not just tests) to support integration tests
pub mod mock;

/// Maximum characters in a published post
pub const MAX_POST_CHARS: usize = 280;
/// Hashtags attached to each composed post
pub const HASHTAGS_PER_POST: usize = 2;

const ELLIPSIS: &str = "...";

/// Source of candidates
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Produce one scored candidate
    ///
    /// # Errors
    ///
    /// Returns `QuotacastError::Generator` when no text could be produced; the
    /// caller then falls back to the pre-vetted list.
    async fn generate(&self) -> Result<ContentCandidate>;

    /// Short identifier used in logs
    fn name(&self) -> &str;
}

/// Topics a generator may write about
#[derive(Debug, Clone, PartialEq)]
pub struct TopicCatalog {
    topics: Vec<Topic>,
}

impl TopicCatalog {
    pub fn new(topics: Vec<Topic>) -> Self {
        Self { topics }
    }

    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    /// Pick a topic at random, weighted by its quality multiplier
    ///
    /// Returns `None` for an empty catalog or when no topic has positive weight.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&Topic> {
        let weights = self.topics.iter().map(|t| t.quality_multiplier.max(0.0));
        let dist = WeightedIndex::new(weights).ok()?;
        self.topics.get(dist.sample(rng))
    }
}

impl Default for TopicCatalog {
    fn default() -> Self {
        Self::new(default_topics())
    }
}

/// Built-in topic catalog
pub fn default_topics() -> Vec<Topic> {
    fn topic(name: &str, prompt: &str, hashtags: &[&str], quality_multiplier: f64) -> Topic {
        Topic {
            name: name.to_string(),
            prompt: prompt.to_string(),
            hashtags: hashtags.iter().map(|h| h.to_string()).collect(),
            quality_multiplier,
        }
    }

    vec![
        topic(
            "Efficiency techniques",
            "Share a business efficiency technique that can be applied today, in 2-3 concrete steps \
             and under 140 characters. Include numbers or the time it saves.",
            &["#efficiency", "#productivity", "#timesaving"],
            1.0,
        ),
        topic(
            "Growth mindset",
            "Describe one concrete daily habit that leads to growth, with how to practice it and \
             the expected benefit, in under 140 characters.",
            &["#growth", "#habits", "#selfinvestment"],
            0.95,
        ),
        topic(
            "Problem-solving frameworks",
            "Introduce a thinking framework for solving everyday work problems, with the steps to \
             use it, in under 140 characters.",
            &["#problemsolving", "#thinking", "#frameworks"],
            1.0,
        ),
        topic(
            "Team effectiveness",
            "Share a concrete way to improve team productivity or collaboration, with the steps \
             and the effect, in under 140 characters.",
            &["#teamwork", "#leadership", "#management"],
            0.9,
        ),
        topic(
            "Tool tips",
            "Recommend a tool, app or feature that dramatically improves work efficiency, with a \
             setup tip, in under 140 characters.",
            &["#tools", "#apps", "#digital"],
            0.95,
        ),
    ]
}

/// Pick up to [`HASHTAGS_PER_POST`] distinct hashtags from the topic
pub fn pick_hashtags<R: Rng + ?Sized>(topic: &Topic, rng: &mut R) -> Vec<String> {
    topic
        .hashtags
        .choose_multiple(rng, HASHTAGS_PER_POST)
        .cloned()
        .collect()
}

/// Build a scored candidate from generated text
///
/// The base text is truncated with an ellipsis so that base, separator and
/// hashtags fit in [`MAX_POST_CHARS`]. Only the base text is scored.
pub fn compose(base_text: &str, topic: &Topic, hashtags: Vec<String>) -> ContentCandidate {
    let hashtag_chars = hashtags.join(" ").chars().count();
    let max_base = MAX_POST_CHARS.saturating_sub(hashtag_chars + 2);
    let base = truncate_with_ellipsis(base_text.trim(), max_base);
    let score = scorer::score(&base, topic.quality_multiplier);

    ContentCandidate::new(&base, hashtags, &topic.name, score)
}

fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(ELLIPSIS.len());
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;

    fn tools_topic() -> Topic {
        Topic {
            name: "Tools".to_string(),
            prompt: "Recommend a tool".to_string(),
            hashtags: vec!["#tools".to_string(), "#apps".to_string(), "#digital".to_string()],
            quality_multiplier: 0.95,
        }
    }

    #[test]
    fn test_default_catalog_is_valid() {
        let catalog = TopicCatalog::default();
        assert_eq!(catalog.topics().len(), 5);
        for topic in catalog.topics() {
            assert!(topic.quality_multiplier > 0.0 && topic.quality_multiplier <= 1.0);
            assert!(topic.hashtags.len() >= HASHTAGS_PER_POST);
        }
    }

    #[test]
    fn test_choose_is_reproducible_with_seed() {
        let catalog = TopicCatalog::default();
        let a = catalog.choose(&mut StdRng::seed_from_u64(7)).cloned();
        let b = catalog.choose(&mut StdRng::seed_from_u64(7)).cloned();
        assert!(a.is_some());
        assert_eq!(a, b);
    }

    #[test]
    fn test_choose_skips_zero_weight_topics() {
        let mut zero = tools_topic();
        zero.name = "Never".to_string();
        zero.quality_multiplier = 0.0;
        let catalog = TopicCatalog::new(vec![zero, tools_topic()]);

        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..50 {
            assert_eq!(catalog.choose(&mut rng).unwrap().name, "Tools");
        }
    }

    #[test]
    fn test_choose_empty_catalog() {
        let catalog = TopicCatalog::new(Vec::new());
        assert!(catalog.choose(&mut StdRng::seed_from_u64(1)).is_none());
    }

    #[test]
    fn test_pick_hashtags_distinct() {
        let hashtags = pick_hashtags(&tools_topic(), &mut StdRng::seed_from_u64(3));
        assert_eq!(hashtags.len(), 2);
        assert_ne!(hashtags[0], hashtags[1]);
    }

    #[test]
    fn test_compose_scores_base_text_with_multiplier() {
        let base = "Try a launcher app: 3 shortcuts save 10 minutes a day.";
        let candidate = compose(base, &tools_topic(), vec!["#tools".to_string()]);

        assert_eq!(candidate.base_text, base);
        assert_eq!(candidate.text, format!("{} #tools", base));
        assert_eq!(candidate.topic, "Tools");
        assert_eq!(candidate.score, scorer::score(base, 0.95));
    }

    #[test]
    fn test_compose_truncates_long_text() {
        let hashtags = vec!["#tools".to_string(), "#apps".to_string()];
        let base = "word ".repeat(100);
        let candidate = compose(&base, &tools_topic(), hashtags);

        assert!(candidate.base_text.ends_with("..."));
        assert_eq!(candidate.base_text.chars().count(), MAX_POST_CHARS - "#tools #apps".len() - 2);
        assert!(candidate.length <= MAX_POST_CHARS);
    }

    #[test]
    fn test_truncate_counts_characters() {
        let text = "→".repeat(10);
        let truncated = truncate_with_ellipsis(&text, 5);
        assert_eq!(truncated, "→→...");
        assert_eq!(truncate_with_ellipsis("short", 5), "short");
    }
}
