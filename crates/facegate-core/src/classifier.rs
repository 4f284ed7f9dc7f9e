//! Binary face classifier via ONNX Runtime.
//!
//! The model is a CNN exported from a directory-labelled training run. It
//! takes one NHWC image tensor and emits either a single sigmoid output or a
//! two-way softmax; both are reduced to P(label 1).

use crate::preprocess::{PreprocessError, PreprocessStrategy, TensorStats};
use crate::types::{Orientation, Prediction, DEFAULT_THRESHOLD};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("model file not found: {0}; export the trained classifier to ONNX and point FACEGATE_MODEL_PATH at it")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

#[derive(Error, Debug)]
pub enum PredictError {
    #[error("preprocessing: {0}")]
    Preprocess(#[from] PreprocessError),
    #[error("classifier: {0}")]
    Classifier(#[from] ClassifierError),
}

/// Anything that turns an input tensor into a raw score in [0, 1].
pub trait Scorer {
    fn score(&mut self, input: &Array4<f32>) -> Result<f32, ClassifierError>;
}

impl<S: Scorer + ?Sized> Scorer for Box<S> {
    fn score(&mut self, input: &Array4<f32>) -> Result<f32, ClassifierError> {
        (**self).score(input)
    }
}

/// ONNX Runtime session for the binary classifier.
pub struct OnnxClassifier {
    session: Session,
}

impl OnnxClassifier {
    /// Load the classifier from an ONNX file.
    pub fn load(model_path: &str) -> Result<Self, ClassifierError> {
        if !Path::new(model_path).exists() {
            return Err(ClassifierError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded classifier model"
        );

        Ok(Self { session })
    }
}

impl Scorer for OnnxClassifier {
    fn score(&mut self, input: &Array4<f32>) -> Result<f32, ClassifierError> {
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::InferenceFailed(format!("score extraction: {e}")))?;

        score_from_output(data)
    }
}

/// Reduce a raw output tensor to P(label 1).
///
/// One value: sigmoid output. Two values: softmax over [label 0, label 1].
fn score_from_output(data: &[f32]) -> Result<f32, ClassifierError> {
    let score = match data {
        [p] => *p,
        [_, p1] => *p1,
        other => {
            return Err(ClassifierError::InferenceFailed(format!(
                "expected 1 or 2 output values for a single image, got {}",
                other.len()
            )))
        }
    };

    if !score.is_finite() {
        return Err(ClassifierError::InferenceFailed(format!(
            "model produced a non-finite score: {score}"
        )));
    }
    if !(0.0..=1.0).contains(&score) {
        tracing::warn!(score, "score outside [0, 1], clamping");
    }

    Ok(score.clamp(0.0, 1.0))
}

/// A scorer bundled with everything needed to turn images into decisions.
pub struct Predictor<S> {
    scorer: S,
    strategy: PreprocessStrategy,
    orientation: Orientation,
    threshold: f32,
}

impl<S: Scorer> Predictor<S> {
    pub fn new(scorer: S, strategy: PreprocessStrategy, orientation: Orientation) -> Self {
        Self {
            scorer,
            strategy,
            orientation,
            threshold: DEFAULT_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn strategy(&self) -> PreprocessStrategy {
        self.strategy
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Raw model output for an already preprocessed tensor.
    pub fn raw_score(&mut self, input: &Array4<f32>) -> Result<f32, ClassifierError> {
        self.scorer.score(input)
    }

    pub fn predict_tensor(&mut self, input: &Array4<f32>) -> Result<Prediction, ClassifierError> {
        self.predict_tensor_at(input, self.threshold)
    }

    /// Like [`predict_tensor`](Self::predict_tensor) with a one-off threshold.
    pub fn predict_tensor_at(
        &mut self,
        input: &Array4<f32>,
        threshold: f32,
    ) -> Result<Prediction, ClassifierError> {
        let raw = self.scorer.score(input)?;
        let prediction = Prediction::from_raw(raw, self.orientation, threshold);
        tracing::debug!(
            raw,
            corrected = prediction.corrected,
            positive = prediction.verdict.is_positive,
            "prediction"
        );
        Ok(prediction)
    }

    pub fn predict_bytes(&mut self, bytes: &[u8]) -> Result<Prediction, PredictError> {
        let input = self.strategy.preprocess_bytes(bytes)?;
        Ok(self.predict_tensor(&input)?)
    }

    pub fn predict_path(&mut self, path: &Path) -> Result<Prediction, PredictError> {
        self.predict_path_at(path, self.threshold)
    }

    pub fn predict_path_at(&mut self, path: &Path, threshold: f32) -> Result<Prediction, PredictError> {
        let input = self.strategy.preprocess_path(path)?;
        Ok(self.predict_tensor_at(&input, threshold)?)
    }

    /// Preprocess and score a file, keeping the input statistics.
    pub fn score_path_with_stats(&mut self, path: &Path) -> Result<(f32, TensorStats), PredictError> {
        let input = self.strategy.preprocess_path(path)?;
        let stats = TensorStats::of(&input);
        let raw = self.scorer.score(&input)?;
        Ok((raw, stats))
    }
}
