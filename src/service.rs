use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    config::AppConfig,
    error::{PlantError, Result},
    model::Classifier,
    preprocess::preprocess_image,
};

/// Body of a successful `POST /predict`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub predicted_class: String,
    pub confidence: f64,
    pub remedy: String,
}

/// Ties the configuration to a loaded model. Cheap to clone; both halves are
/// shared read-only.
#[derive(Clone)]
pub struct Predictor {
    config: Arc<AppConfig>,
    model: Arc<dyn Classifier>,
}

impl Predictor {
    /// Rejects a model whose declared shape disagrees with the configuration.
    pub fn new(config: Arc<AppConfig>, model: Arc<dyn Classifier>) -> Result<Self> {
        if let Some(scores) = model.output_classes() {
            if scores != config.class_count() {
                return Err(PlantError::ConfigMismatch {
                    scores,
                    classes: config.class_count(),
                });
            }
        }
        if let Some(size) = model.input_size() {
            if size != config.model.image_size {
                return Err(PlantError::model_load(
                    &config.model.path,
                    format!(
                        "model expects {size}x{size} input but image_size is {}",
                        config.model.image_size
                    ),
                ));
            }
        }

        Ok(Predictor { config, model })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn predict(&self, image_data: &[u8]) -> Result<PredictionResponse> {
        let tensor = preprocess_image(image_data, self.config.model.image_size)?;
        let scores = self.model.infer(&tensor)?;
        self.interpret(&scores)
    }

    /// Maps a score vector to the labelled response.
    pub fn interpret(&self, scores: &[f32]) -> Result<PredictionResponse> {
        let classes = &self.config.classes;
        if scores.len() != classes.len() {
            return Err(PlantError::ConfigMismatch {
                scores: scores.len(),
                classes: classes.len(),
            });
        }

        let (index, best) = argmax(scores)
            .ok_or_else(|| PlantError::Inference("model returned no finite scores".into()))?;
        let predicted_class = classes
            .get(index)
            .cloned()
            .ok_or(PlantError::ConfigMismatch {
                scores: scores.len(),
                classes: classes.len(),
            })?;

        Ok(PredictionResponse {
            remedy: self.config.remedy_for(&predicted_class).to_string(),
            confidence: confidence(best),
            predicted_class,
        })
    }
}

/// Index and value of the largest score; ties go to the lowest index.
pub fn argmax(scores: &[f32]) -> Option<(usize, f32)> {
    if scores.iter().any(|s| !s.is_finite()) {
        return None;
    }

    scores
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (i, s)| match best {
            Some((_, b)) if b >= s => best,
            _ => Some((i, s)),
        })
}

/// `100 * score` rounded to two decimals, clamped to `[0, 100]`.
pub fn confidence(score: f32) -> f64 {
    let pct = (score as f64 * 100.0 * 100.0).round() / 100.0;
    pct.clamp(0.0, 100.0)
}
