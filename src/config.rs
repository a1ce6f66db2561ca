use std::{
    collections::{HashMap, HashSet},
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::error::{PlantError, Result};

pub const DEFAULT_CONFIG_PATH: &str = "conf/config.yaml";
pub const NO_REMEDY: &str = "No specific remedy available";

const DEFAULT_SIGNATURE: &str = "serving_default";
const DEFAULT_TAG: &str = "serve";

/// Everything the service reads from `config.yaml`. Built once at startup and
/// shared read-only afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub model: ModelConfig,
    /// Index `i` names the class scored at output position `i`.
    pub classes: Vec<String>,
    #[serde(default)]
    pub remedies: HashMap<String, String>,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// SavedModel export directory.
    pub path: PathBuf,
    /// Edge length of the square input image.
    pub image_size: u32,
    #[serde(default = "default_signature")]
    pub signature: String,
    #[serde(default = "default_tags")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub body_limit_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "0.0.0.0".into(),
            port: 8000,
            body_limit_mb: 5,
        }
    }
}

impl ServerConfig {
    pub fn body_limit_bytes(&self) -> usize {
        self.body_limit_mb * 1024 * 1024
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_signature() -> String {
    DEFAULT_SIGNATURE.into()
}

fn default_tags() -> Vec<String> {
    vec![DEFAULT_TAG.into()]
}

impl AppConfig {
    /// Reads the YAML file at `path`, applies the `PLANTMD_PORT` and
    /// `PLANTMD_BODY_LIMIT_MB` overrides and validates the result.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| PlantError::config_load(path, e))?;

        let mut config: AppConfig =
            serde_yaml::from_str(&raw).map_err(|e| PlantError::config_load(path, e))?;
        config
            .server
            .apply_env()
            .and_then(|_| config.validate())
            .map_err(|reason| PlantError::config_load(path, reason))?;

        Ok(config)
    }

    /// Parses an in-memory document; no environment overrides are applied.
    pub fn from_yaml(raw: &str) -> Result<Self> {
        let config: AppConfig =
            serde_yaml::from_str(raw).map_err(|e| PlantError::config_load("<inline>", e))?;
        config
            .validate()
            .map_err(|reason| PlantError::config_load("<inline>", reason))?;
        Ok(config)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.model.image_size == 0 {
            return Err("model.image_size must be a positive integer".into());
        }
        if self.classes.is_empty() {
            return Err("classes must list at least one label".into());
        }

        let mut seen = HashSet::new();
        for class in &self.classes {
            if !seen.insert(class.as_str()) {
                return Err(format!("class `{class}` is listed more than once"));
            }
        }

        if self.server.body_limit_mb == 0 {
            return Err("server.body_limit_mb must be positive".into());
        }

        for label in self.remedies.keys() {
            if !seen.contains(label.as_str()) {
                tracing::warn!("remedy for `{label}` matches no configured class");
            }
        }

        Ok(())
    }

    /// Remedy text for `label`, or the fixed placeholder.
    pub fn remedy_for(&self, label: &str) -> &str {
        self.remedies
            .get(label)
            .map(String::as_str)
            .unwrap_or(NO_REMEDY)
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }
}

impl ServerConfig {
    fn apply_env(&mut self) -> std::result::Result<(), String> {
        if let Ok(port) = env::var("PLANTMD_PORT") {
            self.port = port
                .parse()
                .map_err(|_| format!("PLANTMD_PORT must be a valid port, got `{port}`"))?;
        }
        if let Ok(mb) = env::var("PLANTMD_BODY_LIMIT_MB") {
            self.body_limit_mb = mb
                .parse()
                .map_err(|_| format!("PLANTMD_BODY_LIMIT_MB must be an integer, got `{mb}`"))?;
        }
        Ok(())
    }
}
