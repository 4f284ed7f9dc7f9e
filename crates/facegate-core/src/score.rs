//! Score correction and thresholding.

use crate::types::{Orientation, Prediction, Verdict};

/// Thresholds shown by the CLI decision table.
pub const DECISION_TABLE_THRESHOLDS: [f32; 4] = [0.3, 0.5, 0.7, 0.9];

/// Reflect a raw score when the labels were trained inverted.
///
/// `Unknown` passes through unchanged.
pub fn correct(raw: f32, orientation: Orientation) -> f32 {
    match orientation {
        Orientation::Normal | Orientation::Unknown => raw,
        Orientation::Inverted => 1.0 - raw,
    }
}

impl Verdict {
    /// Decide on a corrected score. Ties at the threshold count as positive.
    pub fn from_corrected(corrected: f32, threshold: f32) -> Self {
        Self {
            is_positive: corrected >= threshold,
            probability: corrected,
            confidence: corrected.max(1.0 - corrected),
        }
    }
}

impl Prediction {
    pub fn from_raw(raw: f32, orientation: Orientation, threshold: f32) -> Self {
        let corrected = correct(raw, orientation);
        if orientation == Orientation::Inverted {
            tracing::debug!(raw, corrected, "applied label inversion");
        }
        Self {
            raw,
            corrected,
            orientation,
            threshold,
            verdict: Verdict::from_corrected(corrected, threshold),
        }
    }

    /// Decision at each of the given thresholds, for tuning.
    pub fn decisions_at(&self, thresholds: &[f32]) -> Vec<(f32, bool)> {
        thresholds
            .iter()
            .map(|&t| (t, self.corrected >= t))
            .collect()
    }
}

/// Format a fraction as a percentage with two decimals ("82.00%").
pub fn format_percentage(fraction: f32) -> String {
    format!("{:.2}%", fraction * 100.0)
}
