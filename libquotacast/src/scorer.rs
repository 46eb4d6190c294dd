//! Deterministic content quality scoring
//!
//! A linear, additive heuristic over lexical features. All vocabulary and
//! weights live in [`ScoringRules`] so they can be swapped without touching
//! the algorithm:
//!
//! 1. start from a base score
//! 2. add tiered bonuses for concrete, actionable and benefit vocabulary
//! 3. add specificity bonuses for digits and enumeration glyphs
//! 4. add a length-fit bonus
//! 5. multiply by the topic weight, clamp to 1.0 and round to 3 decimals
//!
//! # Examples
//!
//! ```
//! use libquotacast::scorer;
//!
//! assert_eq!(scorer::score("", 1.0), 0.6);
//! let s = scorer::score("Use this checklist to save 10 minutes.", 1.0);
//! assert!(s > 0.6 && s <= 1.0);
//! ```

use std::collections::BTreeSet;
use std::ops::RangeInclusive;

/// A vocabulary with count-tiered bonuses
///
/// `tiers` is ordered from the highest minimum count to the lowest; the first
/// tier whose minimum is met wins.
#[derive(Debug, Clone, Copy)]
pub struct Vocabulary {
    pub terms: &'static [&'static str],
    pub tiers: &'static [(usize, f64)],
}

impl Vocabulary {
    /// Number of distinct terms present in the normalized text
    fn matches(&self, normalized: &str) -> usize {
        self.terms
            .iter()
            .filter(|term| normalized.contains(&format!(" {} ", term)))
            .count()
    }

    fn bonus(&self, normalized: &str) -> f64 {
        let count = self.matches(normalized);
        self.tiers
            .iter()
            .find(|(min, _)| count >= *min)
            .map(|(_, bonus)| *bonus)
            .unwrap_or(0.0)
    }
}

/// Every weight and word list used by the scorer
#[derive(Debug, Clone)]
pub struct ScoringRules {
    pub base: f64,
    pub concrete: Vocabulary,
    pub actionable: Vocabulary,
    pub benefit: Vocabulary,
    pub digit_bonus: f64,
    pub structure_glyphs: &'static [char],
    pub structure_bonus: f64,
    /// Ordered preferred band first
    pub length_bands: &'static [(RangeInclusive<usize>, f64)],
}

const CONCRETE_TERMS: &[&str] = &[
    "method",
    "procedure",
    "step",
    "steps",
    "how to",
    "tip",
    "tips",
    "technique",
    "tool",
    "app",
    "setting",
    "settings",
    "shortcut",
    "template",
    "checklist",
    "practice",
];

const ACTIONABLE_TERMS: &[&str] = &[
    "can", "start", "try", "use", "run", "adopt", "apply", "write", "implement", "leverage",
    "schedule",
];

const BENEFIT_TERMS: &[&str] = &[
    "effective",
    "improve",
    "improves",
    "boost",
    "solve",
    "solves",
    "cut",
    "cuts",
    "save",
    "saves",
    "faster",
    "efficient",
    "efficiency",
    "easy",
    "easier",
    "results",
    "benefit",
];

pub const DEFAULT_RULES: ScoringRules = ScoringRules {
    base: 0.6,
    concrete: Vocabulary {
        terms: CONCRETE_TERMS,
        tiers: &[(3, 0.15), (2, 0.10), (1, 0.05)],
    },
    actionable: Vocabulary {
        terms: ACTIONABLE_TERMS,
        tiers: &[(2, 0.10), (1, 0.05)],
    },
    benefit: Vocabulary {
        terms: BENEFIT_TERMS,
        tiers: &[(1, 0.10)],
    },
    digit_bonus: 0.03,
    structure_glyphs: &[':', '：', '→', '・', '•', '①', '②', '③'],
    structure_bonus: 0.02,
    length_bands: &[(90..=180, 0.05), (70..=220, 0.03)],
};

impl ScoringRules {
    /// Score `content` under these rules
    pub fn score(&self, content: &str, topic_multiplier: f64) -> f64 {
        let normalized = normalize(content);
        let mut total = self.base;

        total += self.concrete.bonus(&normalized);
        total += self.actionable.bonus(&normalized);
        total += self.benefit.bonus(&normalized);

        if content.chars().any(char::is_numeric) {
            total += self.digit_bonus;
        }
        if content.chars().any(|c| self.structure_glyphs.contains(&c)) {
            total += self.structure_bonus;
        }

        let length = content.chars().count();
        if let Some((_, bonus)) = self.length_bands.iter().find(|(band, _)| band.contains(&length)) {
            total += bonus;
        }

        round3((total * topic_multiplier).min(1.0))
    }
}

/// Score `content` with the default rules
pub fn score(content: &str, topic_multiplier: f64) -> f64 {
    DEFAULT_RULES.score(content, topic_multiplier)
}

/// Lowercase words joined by single spaces, padded so every term can be
/// matched as ` term `
fn normalize(content: &str) -> String {
    let words: Vec<String> = content
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect();
    format!(" {} ", words.join(" "))
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Distinct vocabulary terms found in `content`, for diagnostics
pub fn matched_terms(content: &str, rules: &ScoringRules) -> BTreeSet<&'static str> {
    let normalized = normalize(content);
    [rules.concrete, rules.actionable, rules.benefit]
        .iter()
        .flat_map(|v| v.terms.iter())
        .filter(|term| normalized.contains(&format!(" {} ", term)))
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RICH: &str = "Use a checklist and a template: write 3 steps, then try the routine. \
                        It will save time and improve focus.";

    #[test]
    fn test_empty_content_scores_base() {
        assert_eq!(score("", 1.0), 0.6);
        assert_eq!(score("", 0.9), 0.54);
    }

    #[test]
    fn test_rich_content_clamps_to_one() {
        assert_eq!(score(RICH, 1.0), 1.0);
    }

    #[test]
    fn test_multiplier_applies_before_clamp() {
        // 0.6 + 0.15 + 0.10 + 0.10 + 0.03 + 0.02 + 0.05 = 1.05
        assert_eq!(score(RICH, 0.9), 0.945);
    }

    #[test]
    fn test_concrete_tiers() {
        assert_eq!(score("tip", 1.0), 0.65);
        assert_eq!(score("tip tool", 1.0), 0.7);
        assert_eq!(score("tip tool app", 1.0), 0.75);
        assert_eq!(score("tip tool app template", 1.0), 0.75);
    }

    #[test]
    fn test_repeated_term_counts_once() {
        assert_eq!(score("tool tool tool", 1.0), 0.65);
    }

    #[test]
    fn test_actionable_and_benefit_bonuses() {
        assert_eq!(score("try", 1.0), 0.65);
        assert_eq!(score("try use", 1.0), 0.7);
        assert_eq!(score("faster", 1.0), 0.7);
    }

    #[test]
    fn test_terms_match_whole_words_only() {
        // "because" must not count as "use", "capped" not as "app"
        assert_eq!(score("because capped", 1.0), 0.6);
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        assert_eq!(score("CHECKLIST", 1.0), score("checklist", 1.0));
    }

    #[test]
    fn test_specificity_bonuses() {
        assert_eq!(score("42", 1.0), 0.63);
        assert_eq!(score("a → b", 1.0), 0.62);
        assert_eq!(score("step 1: go", 1.0), 0.7);
    }

    #[test]
    fn test_non_ascii_digits_earn_digit_bonus() {
        assert_eq!(score("３０分", 1.0), score("30分", 1.0));
        assert_eq!(score("３０分", 1.0), 0.63);
    }

    #[test]
    fn test_length_bands() {
        let filler = |n: usize| "x".repeat(n);
        assert_eq!(score(&filler(69), 1.0), 0.6);
        assert_eq!(score(&filler(70), 1.0), 0.63);
        assert_eq!(score(&filler(90), 1.0), 0.65);
        assert_eq!(score(&filler(180), 1.0), 0.65);
        assert_eq!(score(&filler(181), 1.0), 0.63);
        assert_eq!(score(&filler(220), 1.0), 0.63);
        assert_eq!(score(&filler(221), 1.0), 0.6);
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        let text = "→".repeat(90);
        // 90 characters but 270 bytes; glyph bonus plus preferred band
        assert_eq!(score(&text, 1.0), 0.67);
    }

    #[test]
    fn test_adding_concrete_term_never_lowers_score() {
        let bases = [
            "Plan your morning before opening email and try to finish one item",
            "Review the week on Friday so Monday starts clean",
            "",
        ];
        for base in bases {
            let before = score(base, 1.0);
            let after = score(&format!("{} checklist", base), 1.0);
            assert!(after >= before, "{:?}: {} -> {}", base, before, after);
        }
    }

    #[test]
    fn test_score_is_deterministic_and_bounded() {
        for (content, m) in [(RICH, 1.0), (RICH, 0.5), ("", 0.95), ("try 3 tips", 0.9)] {
            let a = score(content, m);
            let b = score(content, m);
            assert_eq!(a, b);
            assert!((0.0..=1.0).contains(&a));
        }
    }

    #[test]
    fn test_matched_terms_reports_vocabulary_hits() {
        let terms = matched_terms(RICH, &DEFAULT_RULES);
        assert!(terms.contains("checklist"));
        assert!(terms.contains("save"));
        assert!(!terms.contains("app"));
    }
}
