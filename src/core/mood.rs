//! Mood classification.
//!
//! Two granularities are used throughout the crate:
//! - [`MoodClass`]: the seven expression labels produced at detection time
//! - [`Sentiment`]: the coarse positive/neutral/negative grouping used for analytics
//!
//! Sentiment is never stored. It is always recomputed from the raw mood string
//! with [`classify_sentiment`], so every consumer agrees on the mapping.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Expression label reported for a face at detection time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoodClass {
    Neutral,
    Happy,
    Sad,
    Angry,
    Fearful,
    Disgusted,
    Surprised,
}

impl MoodClass {
    /// Every detection-time mood, in a fixed order.
    pub const ALL: [MoodClass; 7] = [
        MoodClass::Neutral,
        MoodClass::Happy,
        MoodClass::Sad,
        MoodClass::Angry,
        MoodClass::Fearful,
        MoodClass::Disgusted,
        MoodClass::Surprised,
    ];

    /// The wire label, as produced by the expression model.
    pub fn as_str(&self) -> &'static str {
        match self {
            MoodClass::Neutral => "neutral",
            MoodClass::Happy => "happy",
            MoodClass::Sad => "sad",
            MoodClass::Angry => "angry",
            MoodClass::Fearful => "fearful",
            MoodClass::Disgusted => "disgusted",
            MoodClass::Surprised => "surprised",
        }
    }
}

impl fmt::Display for MoodClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MoodClass {
    type Err = UnknownMood;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase();
        MoodClass::ALL
            .into_iter()
            .find(|m| m.as_str() == key)
            .ok_or(UnknownMood(key))
    }
}

/// Returned when an expression label is outside the known set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMood(pub String);

impl fmt::Display for UnknownMood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown mood label '{}'", self.0)
    }
}

impl std::error::Error for UnknownMood {}

/// Coarse analytics-time grouping of a mood string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

/// Settings for [`classify_expression`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Minimum winning score; below it the face is reported as neutral
    pub confidence_threshold: f64,
    /// Labels that may be reported; anything else collapses to neutral
    pub allowed: Vec<MoodClass>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.45,
            allowed: MoodClass::ALL.to_vec(),
        }
    }
}

/// Pick the dominant expression from a model score vector.
///
/// Returns [`MoodClass::Neutral`] when the vector is empty, when the best
/// score is below the confidence threshold, or when the winning label is not
/// in the allowed set.
pub fn classify_expression(scores: &HashMap<String, f64>, config: &ClassifierConfig) -> MoodClass {
    let mut best: Option<(&str, f64)> = None;
    for (label, &score) in scores {
        if !score.is_finite() {
            continue;
        }
        let better = match best {
            None => true,
            // Tie on score resolves by label so HashMap order cannot leak through
            Some((best_label, best_score)) => {
                score > best_score || (score == best_score && label.as_str() < best_label)
            }
        };
        if better {
            best = Some((label.as_str(), score));
        }
    }

    let Some((label, score)) = best else {
        return MoodClass::Neutral;
    };
    if score < config.confidence_threshold {
        return MoodClass::Neutral;
    }

    match label.parse::<MoodClass>() {
        Ok(mood) if config.allowed.contains(&mood) => mood,
        _ => MoodClass::Neutral,
    }
}

/// Ordered rule table. The first class whose cue set matches wins.
const SENTIMENT_RULES: &[(Sentiment, &[&str])] = &[
    (
        Sentiment::Negative,
        &[
            "нег", "зл", "грус", "трев", "раздраж", "скук", "испуган", "отвращ", "angry", "sad",
            "fear", "disgust", "negative",
        ],
    ),
    (
        Sentiment::Positive,
        &["поз", "счаст", "рад", "happy", "positive"],
    ),
];

/// Map a free-text mood string to a [`Sentiment`].
///
/// Total and idempotent: any string (including the empty string) maps to
/// exactly one class, defaulting to neutral.
pub fn classify_sentiment(raw_mood: &str) -> Sentiment {
    let mood = raw_mood.trim().to_lowercase();
    SENTIMENT_RULES
        .iter()
        .find(|(_, cues)| cues.iter().any(|cue| mood.contains(cue)))
        .map(|(sentiment, _)| *sentiment)
        .unwrap_or(Sentiment::Neutral)
}
