use std::path::PathBuf;

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type Result<T, E = PlantError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum PlantError {
    #[error("failed to load config {path}: {reason}")]
    ConfigLoad { path: PathBuf, reason: String },

    #[error("failed to load model {path}: {reason}")]
    ModelLoad { path: PathBuf, reason: String },

    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("model produced {scores} scores but {classes} classes are configured")]
    ConfigMismatch { scores: usize, classes: usize },

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("invalid multipart body: {message}")]
    Multipart { status: StatusCode, message: String },

    #[error("No file uploaded")]
    MissingUpload,
}

impl PlantError {
    pub fn config_load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        PlantError::ConfigLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn model_load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        PlantError::ModelLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            PlantError::Decode(_) => StatusCode::BAD_REQUEST,
            PlantError::Multipart { status, .. } => *status,
            PlantError::MissingUpload => StatusCode::UNPROCESSABLE_ENTITY,
            PlantError::ConfigMismatch { .. }
            | PlantError::Inference(_)
            | PlantError::ConfigLoad { .. }
            | PlantError::ModelLoad { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<MultipartError> for PlantError {
    fn from(err: MultipartError) -> Self {
        PlantError::Multipart {
            status: err.status(),
            message: err.body_text(),
        }
    }
}

impl IntoResponse for PlantError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {self}");
        } else {
            tracing::warn!("rejected request: {self}");
        }

        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_errors_map_to_client_statuses() {
        assert_eq!(PlantError::MissingUpload.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            PlantError::Multipart {
                status: StatusCode::PAYLOAD_TOO_LARGE,
                message: "length limit exceeded".into(),
            }
            .status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            PlantError::ConfigMismatch { scores: 2, classes: 3 }.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn mismatch_message_names_both_counts() {
        let err = PlantError::ConfigMismatch { scores: 38, classes: 3 };
        assert_eq!(
            err.to_string(),
            "model produced 38 scores but 3 classes are configured"
        );
    }
}
