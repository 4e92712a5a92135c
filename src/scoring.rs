use std::path::Path;

use base64::Engine;
use serde::Deserialize;
use tracing::info;

use crate::error::{ConfigError, ModelError};
use crate::models::FeatureVector;

/// Maps feature vectors to predicted academic-performance scores.
pub trait ScoringModel {
    fn predict(&self, features: &[FeatureVector]) -> Result<Vec<f64>, ModelError>;
}

/// Exported regression weights: `intercept + coefficients · features`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LinearModel {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LinearModel {
    pub fn from_json(bytes: &[u8]) -> Result<Self, ConfigError> {
        let model: LinearModel = serde_json::from_slice(bytes)
            .map_err(|err| ConfigError::InvalidModel(err.to_string()))?;

        if model.coefficients.len() != 3 {
            return Err(ConfigError::InvalidModel(format!(
                "expected 3 coefficients, found {}",
                model.coefficients.len()
            )));
        }
        if !model.intercept.is_finite() || model.coefficients.iter().any(|c| !c.is_finite()) {
            return Err(ConfigError::InvalidModel(
                "weights must be finite numbers".to_string(),
            ));
        }
        Ok(model)
    }

    pub fn from_base64(encoded: &str) -> Result<Self, ConfigError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|err| ConfigError::InvalidModel(format!("bad base64: {err}")))?;
        Self::from_json(&bytes)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let bytes = std::fs::read(path).map_err(|err| {
            ConfigError::InvalidModel(format!("{}: {err}", path.display()))
        })?;
        let model = Self::from_json(&bytes)?;
        info!(path = %path.display(), "loaded scoring model");
        Ok(model)
    }
}

impl ScoringModel for LinearModel {
    fn predict(&self, features: &[FeatureVector]) -> Result<Vec<f64>, ModelError> {
        features
            .iter()
            .enumerate()
            .map(|(index, FeatureVector(values))| {
                let score = self.intercept
                    + self
                        .coefficients
                        .iter()
                        .zip(values.iter())
                        .map(|(weight, value)| weight * value)
                        .sum::<f64>();
                if score.is_finite() {
                    Ok(score)
                } else {
                    Err(ModelError::NonFinite(index))
                }
            })
            .collect()
    }
}
