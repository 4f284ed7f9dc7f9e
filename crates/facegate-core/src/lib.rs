//! facegate-core: binary face classification toolkit.
//!
//! Resolves the label orientation of a directory-labelled training set,
//! corrects raw classifier scores accordingly, and runs the classifier via
//! ONNX Runtime behind a pluggable preprocessing strategy.

pub mod classifier;
pub mod dataset;
pub mod diagnostics;
pub mod orientation;
pub mod preprocess;
pub mod score;
pub mod types;

pub use classifier::{ClassifierError, OnnxClassifier, PredictError, Predictor, Scorer};
pub use orientation::{resolve_orientation, ClassOrdering, OrientationError};
pub use preprocess::{PreprocessError, PreprocessStrategy, TensorStats};
pub use score::correct;
pub use types::{ClassNames, Orientation, Prediction, Verdict, DEFAULT_THRESHOLD};
