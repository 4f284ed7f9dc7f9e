//! Model health diagnostics.
//!
//! Scores a handful of images from each class directory and summarises what
//! came back. The classic failure is a model that collapsed to a constant
//! output (everything ~0 or everything ~1); the report flags that alongside
//! the label orientation and the input tensor statistics, so a bad export, a
//! missing `/255` or swapped labels can be told apart.

use crate::classifier::{Predictor, Scorer};
use crate::dataset::list_images;
use crate::orientation::{resolve_orientation, OrientationError};
use crate::preprocess::{PreprocessStrategy, TensorStats};
use crate::score::correct;
use crate::types::{ClassNames, Orientation};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Scores below this count as "zero" when checking for a collapsed model.
const COLLAPSED_LOW: f32 = 0.001;
/// Scores above this count as "one".
const COLLAPSED_HIGH: f32 = 0.999;

pub const DEFAULT_SAMPLES_PER_CLASS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleClass {
    Positive,
    Negative,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreStats {
    pub count: usize,
    pub min: f32,
    pub max: f32,
    pub mean: f32,
}

impl ScoreStats {
    /// `None` for an empty slice.
    pub fn of(scores: &[f32]) -> Option<Self> {
        if scores.is_empty() {
            return None;
        }
        let min = scores.iter().copied().fold(f32::INFINITY, f32::min);
        let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mean = scores.iter().sum::<f32>() / scores.len() as f32;
        Some(Self {
            count: scores.len(),
            min,
            max,
            mean,
        })
    }
}

/// Overall shape of the raw scores across all sampled images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionHealth {
    /// Every score is ~0.
    AllZero,
    /// Every score is ~1.
    AllOne,
    Normal,
    /// Nothing could be scored.
    NoData,
}

impl PredictionHealth {
    pub fn classify(scores: &[f32]) -> Self {
        if scores.is_empty() {
            PredictionHealth::NoData
        } else if scores.iter().all(|&s| s < COLLAPSED_LOW) {
            PredictionHealth::AllZero
        } else if scores.iter().all(|&s| s > COLLAPSED_HIGH) {
            PredictionHealth::AllOne
        } else {
            PredictionHealth::Normal
        }
    }

    pub fn remedies(self) -> &'static [&'static str] {
        match self {
            PredictionHealth::AllZero => &[
                "check input normalization: pixels must be scaled to [0, 1] (divide by 255.0)",
                "retrain the model, e.g. with a higher learning rate (0.001)",
                "check the architecture: final layer Dense(1, sigmoid) with binary_crossentropy loss",
            ],
            PredictionHealth::AllOne => &["model always predicts 1: check the dataset labels"],
            PredictionHealth::Normal => &[],
            PredictionHealth::NoData => &["not enough images to diagnose"],
        }
    }
}

/// One scored image.
#[derive(Debug, Clone, Serialize)]
pub struct SampleResult {
    pub file: PathBuf,
    pub class: SampleClass,
    pub raw: f32,
    pub corrected: f32,
    pub input: TensorStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    pub dataset: PathBuf,
    pub orientation: Orientation,
    pub strategy: PreprocessStrategy,
    pub samples: Vec<SampleResult>,
    pub positive: Option<ScoreStats>,
    pub negative: Option<ScoreStats>,
    pub health: PredictionHealth,
    pub remedies: Vec<String>,
}

impl DiagnosticReport {
    fn raw_scores(&self, class: SampleClass) -> Vec<f32> {
        self.samples
            .iter()
            .filter(|s| s.class == class)
            .map(|s| s.raw)
            .collect()
    }
}

/// Run the full diagnostic pass against `dataset_root`.
///
/// Fails only if the dataset itself is missing. Class directories that do
/// not exist and images that do not decode are skipped with a warning.
pub fn diagnose<S: Scorer>(
    predictor: &mut Predictor<S>,
    dataset_root: &Path,
    names: &ClassNames,
    samples_per_class: usize,
) -> Result<DiagnosticReport, OrientationError> {
    let orientation = resolve_orientation(dataset_root, names)?;

    let mut samples = Vec::new();
    for (class, dir_name) in [
        (SampleClass::Positive, &names.positive),
        (SampleClass::Negative, &names.negative),
    ] {
        let dir = dataset_root.join(dir_name);
        let images = match list_images(&dir) {
            Ok(images) => images,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "class directory unavailable, skipping");
                continue;
            }
        };

        for path in images.into_iter().take(samples_per_class) {
            match predictor.score_path_with_stats(&path) {
                Ok((raw, input)) => {
                    tracing::debug!(file = %path.display(), ?class, raw, "scored sample");
                    samples.push(SampleResult {
                        file: path,
                        class,
                        raw,
                        corrected: correct(raw, orientation),
                        input,
                    });
                }
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "failed to score sample");
                }
            }
        }
    }

    let all: Vec<f32> = samples.iter().map(|s| s.raw).collect();
    let health = PredictionHealth::classify(&all);

    let mut report = DiagnosticReport {
        dataset: dataset_root.to_path_buf(),
        orientation,
        strategy: predictor.strategy(),
        samples,
        positive: None,
        negative: None,
        health,
        remedies: health.remedies().iter().map(|r| r.to_string()).collect(),
    };
    report.positive = ScoreStats::of(&report.raw_scores(SampleClass::Positive));
    report.negative = ScoreStats::of(&report.raw_scores(SampleClass::Negative));

    tracing::info!(
        samples = report.samples.len(),
        ?health,
        orientation = %orientation,
        "diagnostics complete"
    );

    Ok(report)
}
