use serde::{Deserialize, Serialize};

/// Default subdirectory name of the positive (enrolled user) class.
pub const DEFAULT_POSITIVE_CLASS: &str = "user";
/// Default subdirectory name of the negative (everyone else) class.
pub const DEFAULT_NEGATIVE_CLASS: &str = "others";

/// Default decision threshold on the corrected score.
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// The two class directory names a training run was labelled with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassNames {
    pub positive: String,
    pub negative: String,
}

impl ClassNames {
    pub fn new(positive: impl Into<String>, negative: impl Into<String>) -> Self {
        Self {
            positive: positive.into(),
            negative: negative.into(),
        }
    }
}

impl Default for ClassNames {
    fn default() -> Self {
        Self::new(DEFAULT_POSITIVE_CLASS, DEFAULT_NEGATIVE_CLASS)
    }
}

/// Which class the training loader assigned to label index 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    /// negative = 0, positive = 1. Raw scores already mean P(positive).
    Normal,
    /// positive = 0, negative = 1. Raw scores must be reflected.
    Inverted,
    /// Class names did not match the configured pair.
    Unknown,
}

impl Orientation {
    /// Orientation to act on: `Unknown` falls back to `Normal`.
    pub fn effective(self) -> Orientation {
        match self {
            Orientation::Unknown => Orientation::Normal,
            other => other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Orientation::Normal => "normal",
            Orientation::Inverted => "inverted",
            Orientation::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final yes/no decision derived from a corrected score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub is_positive: bool,
    /// Corrected score, read as P(positive).
    pub probability: f32,
    /// Confidence of the winning side: max(p, 1 - p).
    pub confidence: f32,
}

/// Everything one inference produced, from raw output to decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub raw: f32,
    pub corrected: f32,
    pub orientation: Orientation,
    pub threshold: f32,
    pub verdict: Verdict,
}
