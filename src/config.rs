//! Settings resolution: CLI flag (or its env var) > config file > default.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::ConfigError;
use crate::intake::RECORD_COLUMNS;
use crate::scoring::LinearModel;

pub const DEFAULT_CONFIG_FILE: &str = "survey-ledger.toml";
pub const DEFAULT_LEDGER_FILE: &str = "survey-ledger.csv";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Csv,
    Postgres,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub store: StoreSection,
    pub model: ModelSection,
    pub intake: IntakeSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub backend: Option<Backend>,
    pub path: Option<PathBuf>,
    pub database_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ModelSection {
    pub path: Option<PathBuf>,
    /// Base64 of the JSON artifact, for deployments that keep it in a secret.
    pub base64: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct IntakeSection {
    pub required_columns: Option<Vec<String>>,
}

impl FileConfig {
    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// An explicit path must exist; the default file is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = explicit.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        match std::fs::read_to_string(path) {
            Ok(text) => {
                debug!(path = %path.display(), "loaded config file");
                Self::parse(&text, path)
            }
            Err(err) if explicit.is_none() && err.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.display().to_string(),
                source,
            }),
        }
    }
}

/// Values that came from the command line or the environment.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub backend: Option<Backend>,
    pub ledger: Option<PathBuf>,
    pub database_url: Option<String>,
    pub model: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModelSource {
    Path(PathBuf),
    Base64(String),
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub backend: Backend,
    pub ledger_path: PathBuf,
    pub database_url: Option<String>,
    pub model: Option<ModelSource>,
    pub required_columns: Vec<String>,
}

impl Settings {
    pub fn resolve(file: FileConfig, overrides: Overrides) -> Self {
        let model = overrides
            .model
            .or(file.model.path)
            .map(ModelSource::Path)
            .or(file.model.base64.map(ModelSource::Base64));

        Settings {
            backend: overrides
                .backend
                .or(file.store.backend)
                .unwrap_or(Backend::Csv),
            ledger_path: overrides
                .ledger
                .or(file.store.path)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LEDGER_FILE)),
            database_url: overrides.database_url.or(file.store.database_url),
            model,
            required_columns: file.intake.required_columns.unwrap_or_else(|| {
                RECORD_COLUMNS.iter().map(|column| column.to_string()).collect()
            }),
        }
    }

    pub fn database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::MissingDatabaseUrl)
    }

    pub fn load_model(&self) -> Result<LinearModel, ConfigError> {
        match &self.model {
            Some(ModelSource::Path(path)) => LinearModel::from_path(path),
            Some(ModelSource::Base64(encoded)) => LinearModel::from_base64(encoded),
            None => Err(ConfigError::MissingModel),
        }
    }
}
