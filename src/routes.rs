use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection}, DefaultBodyLimit, Multipart,
        State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use minijinja::Environment;
use serde::Serialize;
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::inference::{InferenceService, OutputPolicy, Prediction};
use crate::upload::TempUpload;

/// Multipart field names accepted for the uploaded image.
const UPLOAD_FIELDS: [&str; 2] = ["file", "image"];

const INDEX_TEMPLATE: &str = "index.html";

static TEMPLATE_ENV: OnceLock<Environment<'static>> = OnceLock::new();

pub struct AppState {
    pub service: Arc<InferenceService>,
    pub upload_dir: PathBuf,
    pub body_limit_bytes: usize,
}

pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state.body_limit_bytes;
    Router::new()
        .route("/", get(index_page).post(predict_page))
        .route("/predict", post(predict_json))
        .route("/predict_electronics", post(predict_electronics_page))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "OK" }))
}

async fn index_page() -> Response {
    render_page(StatusCode::OK, "/", None, None)
}

async fn predict_json(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let policy = state.service.policy();
    let prediction = classify_upload(&state, multipart).await?;
    Ok(Json(prediction_json(&prediction, policy)))
}

async fn predict_page(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    page_response("/", classify_upload(&state, multipart).await)
}

async fn predict_electronics_page(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    // Errors on this route are JSON; only a successful prediction renders a page.
    match classify_upload(&state, multipart).await {
        Ok(prediction) => render_page(
            StatusCode::OK,
            "/predict_electronics",
            Some(&prediction),
            None,
        ),
        Err(err) => err.into_response(),
    }
}

/// Shapes a prediction the way JSON clients expect for the active policy.
pub fn prediction_json(prediction: &Prediction, policy: OutputPolicy) -> serde_json::Value {
    match (policy, prediction.confidence) {
        (OutputPolicy::Confidence, Some(confidence)) => {
            json!({ "class": prediction.label, "confidence": confidence })
        }
        _ => json!({ "prediction": prediction.label }),
    }
}

async fn classify_upload(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Prediction, AppError> {
    let multipart = multipart.map_err(|e| AppError::Validation(e.to_string()))?;
    let (filename, bytes) = read_upload(multipart).await?;

    let upload = TempUpload::persist(&state.upload_dir, &bytes).await?;
    tracing::debug!(%filename, size = bytes.len(), path = %upload.path().display(), "upload stored");

    let service = state.service.clone();
    let result = tokio::task::spawn_blocking(move || {
        let bytes = upload.read()?;
        service.predict(&bytes)
        // `upload` drops here and removes the file.
    })
    .await
    .map_err(|e| AppError::Processing(e.to_string()))?;

    match &result {
        Ok(prediction) => {
            tracing::info!(%filename, label = %prediction.label, confidence = ?prediction.confidence, "classified upload");
        }
        Err(err) => {
            tracing::warn!(%filename, "classification failed: {err}");
        }
    }
    result
}

/// Pulls the first `file`/`image` field out of the form.
async fn read_upload(mut multipart: Multipart) -> Result<(String, Vec<u8>), AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(multipart_error)?
    {
        let is_upload = field
            .name()
            .map(|name| UPLOAD_FIELDS.contains(&name))
            .unwrap_or(false);
        if !is_upload {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        if filename.is_empty() {
            return Err(AppError::Validation("No file selected".into()));
        }

        let bytes = field
            .bytes()
            .await
            .map_err(multipart_error)?;
        return Ok((filename, bytes.to_vec()));
    }

    Err(AppError::Validation("No file part in the request".into()))
}

/// Oversized bodies keep axum's 413; every other form failure is a 400.
fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(err.to_string())
    } else {
        AppError::Validation(err.to_string())
    }
}

#[derive(Serialize)]
struct PageContext<'a> {
    action: &'a str,
    field: &'a str,
    prediction: Option<PagePrediction<'a>>,
    error: Option<String>,
}

#[derive(Serialize)]
struct PagePrediction<'a> {
    label: &'a str,
    confidence: Option<String>,
}

fn page_response(action: &str, result: Result<Prediction, AppError>) -> Response {
    match result {
        Ok(prediction) => render_page(StatusCode::OK, action, Some(&prediction), None),
        Err(err) => render_page(err.status_code(), action, None, Some(err.to_string())),
    }
}

fn render_page(
    status: StatusCode,
    action: &str,
    prediction: Option<&Prediction>,
    error: Option<String>,
) -> Response {
    let ctx = PageContext {
        action,
        field: if action == "/" { "image" } else { "file" },
        prediction: prediction.map(|p| PagePrediction {
            label: &p.label,
            confidence: p.confidence.map(|c| format!("{:.2}%", c * 100.0)),
        }),
        error,
    };

    let rendered = template_env()
        .get_template(INDEX_TEMPLATE)
        .and_then(|tpl| tpl.render(&ctx));

    match rendered {
        Ok(body) => (status, Html(body)).into_response(),
        Err(err) => {
            tracing::error!("failed to render page: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to render page").into_response()
        }
    }
}

fn template_env() -> &'static Environment<'static> {
    TEMPLATE_ENV.get_or_init(|| {
        let mut env = Environment::new();
        if let Err(err) = env.add_template(INDEX_TEMPLATE, include_str!("../templates/index.html")) {
            tracing::error!("invalid page template: {err}");
        }
        env
    })
}
