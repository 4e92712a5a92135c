use thiserror::Error;

/// Fatal problems with the environment: processing stops.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("no scoring model configured (set [model].path or [model].base64)")]
    MissingModel,
    #[error("scoring model artifact could not be loaded: {0}")]
    InvalidModel(String),
    #[error("DATABASE_URL must be set when using the postgres backend")]
    MissingDatabaseUrl,
}

/// Recoverable input problems, reported before anything is written.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("{field} is required")]
    MissingField { field: &'static str },
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: i64,
        max: i64,
        value: i64,
    },
    #[error("upload is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("row {row}: {column} value {value:?} is not a whole number")]
    NotANumber {
        row: usize,
        column: String,
        value: String,
    },
    #[error("row {row}: unrecognized gender {value:?}")]
    UnknownGender { row: usize, value: String },
    #[error("row {row}: unrecognized bullying type {value:?}")]
    UnknownCategory { row: usize, value: String },
    #[error("row {row}: {field} is empty")]
    EmptyCell { row: usize, field: String },
    #[error("upload contains no data rows")]
    EmptyBatch,
    #[error("could not read upload: {0}")]
    Unreadable(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("ledger io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ledger csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("row has {actual} cells, ledger expects {expected}")]
    RowWidth { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model returned {actual} scores for {expected} inputs")]
    ShapeMismatch { expected: usize, actual: usize },
    #[error("model produced a non-finite score for input {0}")]
    NonFinite(usize),
}

/// Failures of a scoring-and-saving pass once its input is valid.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Model(#[from] ModelError),
    /// The score was computed but the append did not go through.
    #[error("predicted score {score:.2} was not saved: {source}")]
    NotPersisted {
        score: f64,
        #[source]
        source: StoreError,
    },
    #[error("upload stopped after saving {saved} of {total} rows: {source}")]
    BatchInterrupted {
        saved: usize,
        total: usize,
        #[source]
        source: StoreError,
    },
}

pub type Result<T> = std::result::Result<T, LedgerError>;
