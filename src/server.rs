use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::{
    error::{PlantError, Result},
    service::{PredictionResponse, Predictor},
};

pub const UPLOAD_FIELD: &str = "file";

pub struct AppState {
    pub predictor: Predictor,
}

pub type SharedState = Arc<AppState>;

pub fn router(predictor: Predictor) -> Router {
    let body_limit_bytes = predictor.config().server.body_limit_bytes();
    let shared_state = Arc::new(AppState { predictor });

    Router::new()
        .route("/predict", post(predict_handler))
        .route("/classes", get(classes_handler))
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .with_state(shared_state)
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
}

async fn predict_handler(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<PredictionResponse>> {
    let mut image_data = None;

    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(UPLOAD_FIELD) {
            image_data = Some(field.bytes().await?);
            break;
        }
    }

    let image_data = image_data
        .filter(|bytes| !bytes.is_empty())
        .ok_or(PlantError::MissingUpload)?;
    tracing::debug!("received upload of {} bytes", image_data.len());

    // Decode, resize and inference are CPU bound.
    let predictor = state.predictor.clone();
    let result = tokio::task::spawn_blocking(move || predictor.predict(&image_data))
        .await
        .map_err(|e| PlantError::Inference(e.to_string()))??;

    tracing::info!(
        "predicted {} ({:.2}%)",
        result.predicted_class,
        result.confidence
    );
    Ok(Json(result))
}

async fn classes_handler(State(state): State<SharedState>) -> Json<serde_json::Value> {
    let config = state.predictor.config();
    Json(json!({
        "classes": config.classes,
        "image_size": config.model.image_size,
    }))
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "OK" }))
}
