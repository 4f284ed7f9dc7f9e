use crate::config::Config;
use facegate_core::{
    resolve_orientation, ClassifierError, OnnxClassifier, Orientation, PredictError, Prediction,
    PreprocessError, Predictor, Scorer,
};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("classifier error: {0}")]
    Classifier(#[from] ClassifierError),
    #[error("preprocessing error: {0}")]
    Preprocess(#[from] PreprocessError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

impl From<PredictError> for EngineError {
    fn from(e: PredictError) -> Self {
        match e {
            PredictError::Preprocess(e) => EngineError::Preprocess(e),
            PredictError::Classifier(e) => EngineError::Classifier(e),
        }
    }
}

/// Messages sent from HTTP handlers to the engine thread.
enum EngineRequest {
    Predict {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<Prediction, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Request a prediction for one encoded image.
    pub async fn predict(&self, image: Vec<u8>) -> Result<Prediction, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Predict {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Determine label orientation for the configured dataset.
///
/// A missing dataset is not fatal: the daemon logs it and serves scores
/// uncorrected.
pub fn detect_orientation(config: &Config) -> Orientation {
    let Some(root) = config.dataset_root.as_deref() else {
        tracing::info!("no dataset configured, assuming normal label orientation");
        return Orientation::Normal;
    };

    match resolve_orientation(root, &config.class_names) {
        Ok(orientation) => orientation,
        Err(e) => {
            tracing::warn!(error = %e, "orientation detection failed, assuming normal");
            Orientation::Normal
        }
    }
}

/// Load the classifier described by `config` (fail-fast).
pub fn load_predictor(config: &Config) -> Result<Predictor<OnnxClassifier>, EngineError> {
    let orientation = detect_orientation(config);
    let model_path = config.model_path_str();
    let classifier = OnnxClassifier::load(&model_path)?;
    tracing::info!(
        path = %model_path,
        strategy = config.strategy.name(),
        size = config.strategy.size(),
        orientation = %orientation,
        "classifier loaded"
    );
    Ok(Predictor::new(classifier, config.strategy, orientation).with_threshold(config.threshold))
}

/// Spawn the engine on a dedicated OS thread.
///
/// The predictor is moved onto the thread and owned there for the life of
/// the process; handlers reach it only through the returned handle.
pub fn spawn_engine<S>(mut predictor: Predictor<S>, queue_depth: usize) -> Result<EngineHandle, EngineError>
where
    S: Scorer + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(queue_depth.max(1));

    std::thread::Builder::new()
        .name("facegate-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Predict { image, reply } => {
                        let result = predictor.predict_bytes(&image).map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}
