use facegate_core::{ClassNames, PreprocessStrategy, DEFAULT_THRESHOLD};
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid FACEGATE_BIND_ADDR {0:?}: {1}")]
    BindAddr(String, std::net::AddrParseError),
    #[error("invalid preprocessing: {0}")]
    Strategy(#[from] facegate_core::PreprocessError),
    #[error("FACEGATE_THRESHOLD must be within [0, 1], got {0}")]
    Threshold(f32),
}

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address (default: 0.0.0.0:7777).
    pub bind_addr: SocketAddr,
    /// Path to the ONNX classifier.
    pub model_path: PathBuf,
    /// Training dataset root, used only to detect label orientation.
    pub dataset_root: Option<PathBuf>,
    /// Preprocessing the classifier was trained with.
    pub strategy: PreprocessStrategy,
    /// Decision threshold on the corrected score.
    pub threshold: f32,
    /// Display name of the enrolled person, used in response messages.
    pub subject: String,
    /// Positive/negative class directory names of the training set.
    pub class_names: ClassNames,
    /// Maximum accepted upload size in bytes.
    pub max_upload_bytes: usize,
    /// Pending requests the engine queue holds before callers wait.
    pub queue_depth: usize,
}

impl Config {
    /// Load configuration from `FACEGATE_*` environment variables with defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind = lookup("FACEGATE_BIND_ADDR").unwrap_or_else(|| "0.0.0.0:7777".to_string());
        let bind_addr = bind
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::BindAddr(bind.clone(), e))?;

        let mut strategy: PreprocessStrategy = match lookup("FACEGATE_PREPROCESS") {
            Some(name) => name.parse()?,
            None => PreprocessStrategy::default(),
        };
        if let Some(size) = parse_opt::<u32>(&lookup, "FACEGATE_INPUT_SIZE") {
            strategy = strategy.with_size(size)?;
        }

        let threshold = parse_or(&lookup, "FACEGATE_THRESHOLD", DEFAULT_THRESHOLD);
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::Threshold(threshold));
        }

        let defaults = ClassNames::default();
        let class_names = ClassNames::new(
            lookup("FACEGATE_POSITIVE_CLASS").unwrap_or(defaults.positive),
            lookup("FACEGATE_NEGATIVE_CLASS").unwrap_or(defaults.negative),
        );

        Ok(Self {
            bind_addr,
            model_path: lookup("FACEGATE_MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("models/classifier.onnx")),
            dataset_root: lookup("FACEGATE_DATASET_DIR")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            strategy,
            threshold,
            subject: lookup("FACEGATE_SUBJECT").unwrap_or_else(|| "the enrolled user".to_string()),
            class_names,
            max_upload_bytes: parse_or::<usize>(&lookup, "FACEGATE_MAX_UPLOAD_BYTES", 10 * 1024 * 1024),
            queue_depth: parse_or::<usize>(&lookup, "FACEGATE_QUEUE_DEPTH", 8).max(1),
        })
    }

    /// Model path as the string form ONNX Runtime expects.
    pub fn model_path_str(&self) -> String {
        self.model_path.to_string_lossy().into_owned()
    }
}

fn parse_opt<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.parse().ok())
}

fn parse_or<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    parse_opt(lookup, key).unwrap_or(default)
}
