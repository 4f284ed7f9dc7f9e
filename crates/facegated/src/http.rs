//! HTTP surface of the daemon.
//!
//! `POST /api/upload` takes a multipart form with an `image` file field and
//! answers whether the face belongs to the enrolled subject.

use crate::engine::{EngineError, EngineHandle};
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use facegate_core::dataset::is_upload_allowed;
use facegate_core::score::format_percentage;
use facegate_core::{Orientation, PreprocessStrategy};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Multipart field carrying the uploaded image.
const IMAGE_FIELD: &str = "image";

/// Static facts about the loaded service, shared by all handlers.
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    pub subject: String,
    pub model_path: String,
    pub strategy: PreprocessStrategy,
    pub orientation: Orientation,
    pub threshold: f32,
}

#[derive(Clone)]
pub struct AppState {
    engine: EngineHandle,
    info: Arc<ServiceInfo>,
}

impl AppState {
    pub fn new(engine: EngineHandle, info: ServiceInfo) -> Self {
        Self {
            engine,
            info: Arc::new(info),
        }
    }
}

/// Body of a successful upload.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub is_same: bool,
    /// Confidence of the reported side, in [0.5, 1].
    pub confidence: f32,
    pub percentage: String,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    MissingImage,
    EmptyFileName,
    UnsupportedFormat,
    BadMultipart(MultipartError),
    InvalidImage(String),
    ModelUnavailable,
    Processing(String),
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Preprocess(e) => ApiError::InvalidImage(e.to_string()),
            EngineError::ChannelClosed | EngineError::Spawn(_) => ApiError::ModelUnavailable,
            EngineError::Classifier(e) => ApiError::Processing(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::MissingImage => (StatusCode::BAD_REQUEST, "no image file in request".to_string()),
            ApiError::EmptyFileName => (StatusCode::BAD_REQUEST, "no file selected".to_string()),
            ApiError::UnsupportedFormat => (StatusCode::BAD_REQUEST, "unsupported file format".to_string()),
            ApiError::BadMultipart(e) => (e.status(), format!("malformed upload: {}", e.body_text())),
            ApiError::InvalidImage(detail) => {
                tracing::debug!(%detail, "rejecting undecodable upload");
                (StatusCode::BAD_REQUEST, "unable to process the image".to_string())
            }
            ApiError::ModelUnavailable => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "recognition model unavailable".to_string(),
            ),
            ApiError::Processing(detail) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("processing failed: {detail}"),
            ),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/api/upload", post(upload))
        .route("/api/status", get(status))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(ApiError::BadMultipart)? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(ApiError::BadMultipart)?;
        upload = Some((file_name, bytes));
        break;
    }

    let (file_name, bytes) = upload.ok_or(ApiError::MissingImage)?;
    if file_name.is_empty() {
        return Err(ApiError::EmptyFileName);
    }
    if !is_upload_allowed(&file_name) {
        return Err(ApiError::UnsupportedFormat);
    }

    tracing::info!(file = %file_name, bytes = bytes.len(), "upload received");
    let prediction = state.engine.predict(bytes.to_vec()).await?;

    let verdict = prediction.verdict;
    let percentage = format_percentage(verdict.confidence);
    let subject = &state.info.subject;
    let message = if verdict.is_positive {
        format!("This is {subject} with {percentage} confidence")
    } else {
        format!("This is not {subject} with {percentage} confidence")
    };

    tracing::info!(
        raw = prediction.raw,
        corrected = prediction.corrected,
        is_same = verdict.is_positive,
        "upload classified"
    );

    Ok(Json(UploadResponse {
        is_same: verdict.is_positive,
        confidence: verdict.confidence,
        percentage,
        message,
    }))
}

async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "model": state.info.model_path,
        "strategy": state.info.strategy,
        "orientation": state.info.orientation,
        "threshold": state.info.threshold,
        "subject": state.info.subject,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::spawn_engine;
    use axum::body::Body;
    use axum::http::Request;
    use facegate_core::{ClassifierError, Predictor, Scorer};
    use ndarray::Array4;
    use tower::ServiceExt;

    const BOUNDARY: &str = "facegate-test-boundary";

    struct ConstScorer(f32);

    impl Scorer for ConstScorer {
        fn score(&mut self, _input: &Array4<f32>) -> Result<f32, ClassifierError> {
            Ok(self.0)
        }
    }

    struct FailingScorer;

    impl Scorer for FailingScorer {
        fn score(&mut self, _input: &Array4<f32>) -> Result<f32, ClassifierError> {
            Err(ClassifierError::InferenceFailed("output tensor missing".into()))
        }
    }

    /// Takes the engine thread down with it.
    struct PanickingScorer;

    impl Scorer for PanickingScorer {
        fn score(&mut self, _input: &Array4<f32>) -> Result<f32, ClassifierError> {
            panic!("session poisoned")
        }
    }

    fn app(score: f32, orientation: Orientation) -> Router {
        app_with(ConstScorer(score), orientation)
    }

    fn app_with<S: Scorer + Send + 'static>(scorer: S, orientation: Orientation) -> Router {
        let strategy = PreprocessStrategy::Rgb { size: 4 };
        let engine = spawn_engine(Predictor::new(scorer, strategy, orientation), 2).unwrap();
        let info = ServiceInfo {
            subject: "Damien".into(),
            model_path: "test.onnx".into(),
            strategy,
            orientation,
            threshold: 0.5,
        };
        router(AppState::new(engine, info), 1024 * 1024)
    }

    fn png() -> Vec<u8> {
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgb8(image::RgbImage::new(6, 6))
            .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn multipart_request(field: &str, file_name: Option<&str>, data: &[u8]) -> Request<Body> {
        let disposition = match file_name {
            Some(name) => format!("form-data; name=\"{field}\"; filename=\"{name}\""),
            None => format!("form-data; name=\"{field}\""),
        };
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(format!("Content-Disposition: {disposition}\r\n").as_bytes());
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/api/upload")
            .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap()
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_upload_positive() {
        let (status, body) = send(
            app(0.82, Orientation::Normal),
            multipart_request("image", Some("face.png"), &png()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_same"], true);
        assert_eq!(body["percentage"], "82.00%");
        assert_eq!(body["message"], "This is Damien with 82.00% confidence");
    }

    #[tokio::test]
    async fn test_upload_inverted_labels() {
        let (status, body) = send(
            app(0.82, Orientation::Inverted),
            multipart_request("image", Some("face.jpg"), &png()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_same"], false);
        assert_eq!(body["percentage"], "82.00%");
        assert_eq!(body["message"], "This is not Damien with 82.00% confidence");
    }

    #[tokio::test]
    async fn test_upload_missing_image_field() {
        let (status, body) = send(
            app(0.5, Orientation::Normal),
            multipart_request("photo", Some("face.png"), &png()),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "no image file in request");
    }

    #[tokio::test]
    async fn test_upload_empty_file_name() {
        let (status, body) = send(
            app(0.5, Orientation::Normal),
            multipart_request("image", None, &png()),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "no file selected");
    }

    #[tokio::test]
    async fn test_upload_unsupported_extension() {
        let (status, body) = send(
            app(0.5, Orientation::Normal),
            multipart_request("image", Some("face.tiff"), &png()),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "unsupported file format");
    }

    #[tokio::test]
    async fn test_upload_undecodable_image() {
        let (status, body) = send(
            app(0.5, Orientation::Normal),
            multipart_request("image", Some("face.png"), b"not a png"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "unable to process the image");
    }

    #[tokio::test]
    async fn test_upload_inference_failure_is_500() {
        let (status, body) = send(
            app_with(FailingScorer, Orientation::Normal),
            multipart_request("image", Some("face.png"), &png()),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let message = body["error"].as_str().unwrap();
        assert!(message.starts_with("processing failed"), "{message}");
        assert!(message.contains("output tensor missing"), "{message}");
    }

    #[tokio::test]
    async fn test_upload_after_engine_exit_is_500() {
        let app = app_with(PanickingScorer, Orientation::Normal);

        let (status, body) = send(
            app.clone(),
            multipart_request("image", Some("face.png"), &png()),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "recognition model unavailable");

        // the engine thread is gone; later requests fail the same way
        let (status, body) = send(app, multipart_request("image", Some("face.png"), &png())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "recognition model unavailable");
    }

    #[tokio::test]
    async fn test_status() {
        let req = Request::builder().uri("/api/status").body(Body::empty()).unwrap();
        let (status, body) = send(app(0.5, Orientation::Inverted), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["orientation"], "inverted");
        assert_eq!(body["strategy"]["kind"], "rgb");
        assert_eq!(body["subject"], "Damien");
    }
}
