use reqwest::StatusCode;

/// Failure of the external query executor. Carried as the cause of
/// [`PipelineError::QueryExecution`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("store rejected credentials ({status}): {body}")]
    Unauthorized { status: StatusCode, body: String },
    #[error("store returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("flux query failed: {message}")]
    Flux { message: String, reference: Option<String> },
    #[error("malformed store response: {0}")]
    Csv(#[from] csv::Error),
}

/// Ways a store result can disagree with the `_time` / `_field` / `_value`
/// wire schema.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaMismatch {
    #[error("partition {partition} is missing required column `{column}`")]
    MissingColumn { partition: usize, column: &'static str },
    #[error("row {row} has {len} cells, expected at least {expected}")]
    ShortRow { row: usize, len: usize, expected: usize },
    #[error("row {row} has an unparseable timestamp `{value}`")]
    InvalidTimestamp { row: usize, value: String },
    #[error("row {row} has a non-numeric value `{value}`")]
    InvalidValue { row: usize, value: String },
    #[error("row {row} carries field `{field}` which is not registered for measurement `{measurement}`")]
    UnexpectedField {
        row: usize,
        field: String,
        measurement: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("lookback must be a positive number of days, got {days}")]
    InvalidRange { days: i64 },
    #[error("query execution failed: {0}")]
    QueryExecution(#[source] StoreError),
    #[error("store result does not match the expected schema: {0}")]
    SchemaMismatch(#[from] SchemaMismatch),
}

impl PipelineError {
    /// Stable machine-readable tag used by the HTTP layer.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRange { .. } => "invalid_range",
            Self::QueryExecution(_) => "query_execution",
            Self::SchemaMismatch(_) => "schema_mismatch",
        }
    }
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        Self::QueryExecution(err)
    }
}

/// A bucket, measurement or field name that cannot be placed inside a Flux
/// string literal as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} name `{value}`: {reason}")]
pub struct InvalidName {
    pub kind: &'static str,
    pub value: String,
    pub reason: &'static str,
}

/// A sensor query spec that cannot be built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidSpec {
    #[error(transparent)]
    Name(#[from] InvalidName),
    #[error("default lookback must be at least one day, got {days}")]
    Lookback { days: i64 },
}
