//! Per-person risk scoring and ranking.

use crate::core::mood::{classify_sentiment, Sentiment};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Sentiment counts for one person (or one bucket) over a window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoodTally {
    pub positive: u64,
    pub neutral: u64,
    pub negative: u64,
}

impl MoodTally {
    pub fn new(positive: u64, neutral: u64, negative: u64) -> Self {
        Self {
            positive,
            neutral,
            negative,
        }
    }

    pub fn total(&self) -> u64 {
        self.positive + self.neutral + self.negative
    }

    pub fn add(&mut self, sentiment: Sentiment) {
        match sentiment {
            Sentiment::Positive => self.positive += 1,
            Sentiment::Neutral => self.neutral += 1,
            Sentiment::Negative => self.negative += 1,
        }
    }

    /// Classify a raw mood string and count it.
    pub fn add_raw(&mut self, raw_mood: &str) {
        self.add(classify_sentiment(raw_mood));
    }

    /// `round(100 * (negative + max(0, neutral - positive)) / total)`, 0 when empty.
    pub fn risk_score(&self) -> u32 {
        let total = self.total();
        if total == 0 {
            return 0;
        }
        let neutral_over_positive = self.neutral.saturating_sub(self.positive);
        percent(self.negative + neutral_over_positive, total)
    }

    /// Categorical flag: any negative, or more neutral than positive.
    pub fn risk_by_rule(&self) -> bool {
        self.negative > 0 || self.neutral > self.positive
    }

    /// Whether non-positive events outnumber positive ones.
    pub fn leans_non_positive(&self) -> bool {
        self.negative + self.neutral > self.positive
    }

    pub fn positive_percent(&self) -> u32 {
        percent(self.positive, self.total())
    }

    pub fn neutral_percent(&self) -> u32 {
        percent(self.neutral, self.total())
    }

    pub fn negative_percent(&self) -> u32 {
        percent(self.negative, self.total())
    }
}

/// Rounded percentage, 0 when `total` is 0.
pub fn percent(part: u64, total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    (part as f64 * 100.0 / total as f64).round() as u32
}

/// A person with their tally, ready for ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskEntry {
    pub name: String,
    pub tally: MoodTally,
    pub risk_score: u32,
    pub risk_by_rule: bool,
}

impl RiskEntry {
    pub fn new(name: impl Into<String>, tally: MoodTally) -> Self {
        Self {
            name: name.into(),
            risk_score: tally.risk_score(),
            risk_by_rule: tally.risk_by_rule(),
            tally,
        }
    }
}

/// The single ranking policy used by every ranked list.
///
/// Risk score descending, then negative count descending, then neutral count
/// descending, then name ascending.
pub fn rank_order(a: &RiskEntry, b: &RiskEntry) -> Ordering {
    b.risk_score
        .cmp(&a.risk_score)
        .then_with(|| b.tally.negative.cmp(&a.tally.negative))
        .then_with(|| b.tally.neutral.cmp(&a.tally.neutral))
        .then_with(|| a.name.cmp(&b.name))
}

/// Sort people with at least one event and keep the first `limit`.
pub fn rank(entries: impl IntoIterator<Item = RiskEntry>, limit: usize) -> Vec<RiskEntry> {
    let mut ranked: Vec<RiskEntry> = entries
        .into_iter()
        .filter(|e| e.tally.total() > 0)
        .collect();
    ranked.sort_by(rank_order);
    ranked.truncate(limit);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_score_example() {
        let tally = MoodTally::new(1, 3, 0);
        assert_eq!(tally.risk_score(), 50);
        assert!(tally.risk_by_rule());
    }

    #[test]
    fn test_risk_score_empty_and_positive() {
        assert_eq!(MoodTally::default().risk_score(), 0);
        assert!(!MoodTally::default().risk_by_rule());

        let happy = MoodTally::new(5, 2, 0);
        assert_eq!(happy.risk_score(), 0);
        assert!(!happy.risk_by_rule());
    }

    #[test]
    fn test_risk_by_rule_with_single_negative() {
        let tally = MoodTally::new(9, 0, 1);
        assert_eq!(tally.risk_score(), 10);
        assert!(tally.risk_by_rule());
        assert!(!tally.leans_non_positive());
    }

    #[test]
    fn test_add_raw_classifies() {
        let mut tally = MoodTally::default();
        tally.add_raw("Happy");
        tally.add_raw("Злой");
        tally.add_raw("surprised");
        assert_eq!(tally, MoodTally::new(1, 1, 1));
        assert_eq!(tally.negative_percent(), 33);
    }

    #[test]
    fn test_rank_tie_breaks() {
        let entries = vec![
            RiskEntry::new("cora", MoodTally::new(0, 2, 0)),
            RiskEntry::new("anna", MoodTally::new(0, 0, 2)),
            RiskEntry::new("boris", MoodTally::new(0, 1, 1)),
            RiskEntry::new("dan", MoodTally::new(3, 0, 0)),
            RiskEntry::new("eve", MoodTally::new(0, 0, 1)),
            RiskEntry::new("ghost", MoodTally::default()),
        ];
        let ranked = rank(entries, 10);
        let names: Vec<&str> = ranked.iter().map(|e| e.name.as_str()).collect();
        // anna/boris/cora/eve all score 100; negatives, then neutrals, then name decide
        assert_eq!(names, vec!["anna", "boris", "eve", "cora", "dan"]);
    }

    #[test]
    fn test_rank_limit() {
        let entries = (0..30).map(|i| RiskEntry::new(format!("p{i:02}"), MoodTally::new(1, 0, 0)));
        assert_eq!(rank(entries, 20).len(), 20);
    }
}
