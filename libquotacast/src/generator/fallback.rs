//! Pre-vetted fallback candidates
//!
//! Used when the configured generator fails, or as the only source when no
//! generator is configured. These still go through the quality and duplicate
//! gates like any other candidate.

use async_trait::async_trait;
use rand::prelude::*;

use crate::error::{QuotacastError, Result};
use crate::generator::ContentGenerator;
use crate::scorer;
use crate::types::ContentCandidate;

/// Topic multiplier applied when scoring fallback text
pub const FALLBACK_MULTIPLIER: f64 = 1.0;

/// The built-in candidates, scored like generated content
pub fn fallback_candidates() -> Vec<ContentCandidate> {
    fn candidate(base: &str, hashtags: &[&str], topic: &str) -> ContentCandidate {
        ContentCandidate::new(
            base,
            hashtags.iter().map(|h| h.to_string()).collect(),
            topic,
            scorer::score(base, FALLBACK_MULTIPLIER),
        )
    }

    vec![
        candidate(
            "Before a meeting starts, write the 3 decisions it must reach on the whiteboard. \
             This simple technique cuts a 30 min meeting to 15 min.",
            &["#efficiency", "#meetings"],
            "Efficiency",
        ),
        candidate(
            "Try the five whys technique: ask why five times, then apply the fix to the root \
             cause. This method can solve the real problem instead of symptoms.",
            &["#problemsolving", "#thinking"],
            "Problem solving",
        ),
        candidate(
            "Start each morning with a 5 minute planning habit: use a checklist to pick the one \
             key task and finish it first. Small steps like this boost results.",
            &["#productivity", "#habits"],
            "Habits",
        ),
    ]
}

/// Pick one fallback candidate at random
pub fn pick_fallback<R: Rng + ?Sized>(rng: &mut R) -> Option<ContentCandidate> {
    fallback_candidates().choose(rng).cloned()
}

/// Generator that only serves fallback candidates
pub struct FallbackGenerator;

#[async_trait]
impl ContentGenerator for FallbackGenerator {
    async fn generate(&self) -> Result<ContentCandidate> {
        pick_fallback(&mut rand::thread_rng())
            .ok_or_else(|| QuotacastError::Generator("fallback list is empty".to_string()))
    }

    fn name(&self) -> &str {
        "fallback"
    }
}
