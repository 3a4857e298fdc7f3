use thiserror::Error;

/// Main error type for the pipeline
#[derive(Error, Debug)]
pub enum FolioError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Storage errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // Brokerage API errors
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    // Pipeline errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for FolioError
pub type Result<T> = std::result::Result<T, FolioError>;

/// Errors from the document-store boundary
#[derive(Error, Debug)]
pub enum StoreError {
    // Driver errors
    #[error("Store transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Store response decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Unsupported statement: {0}")]
    Unsupported(String),

    // Identifier errors
    #[error("Malformed record id {0:?}: expected 'table:key' with both parts non-empty")]
    MalformedRecordId(String),

    // Write integrity errors
    #[error("Create on '{table}' returned no record")]
    CreateReturnedNothing { table: &'static str },

    #[error("Create on '{table}' returned a record without an id")]
    MissingRecordId { table: &'static str },

    #[error("Unique index violation on '{table}': {detail}")]
    UniqueViolation { table: String, detail: String },

    // Connection errors
    #[error("Unsupported database url {0:?}")]
    UnsupportedUrl(String),
}

/// Errors from the brokerage REST client
#[derive(Error, Debug)]
pub enum BrokerError {
    // Transport errors
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Response decode error: {0}")]
    Decode(#[from] serde_json::Error),

    // Protocol errors
    #[error("Authentication rejected with status {status}")]
    Auth { status: u16 },

    #[error("Request to {path} failed with status {status}")]
    Status { status: u16, path: String },

    #[error("Request to {path} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        attempts: u32,
        path: String,
        last_error: String,
    },

    // Argument validation errors
    #[error("Candle count {0} out of range (1..=1000)")]
    InvalidCandleCount(u32),

    #[error("page_size and page_number must both be >= 1")]
    InvalidPage,

    // Lookup errors
    #[error("Instrument not found for symbol {0:?}")]
    InstrumentNotFound(String),
}

/// Errors that abort a pipeline run
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid run type {0:?}: must be \"market_open\" or \"market_close\"")]
    InvalidRunType(String),

    #[error("Portfolio fetch failed: {0}")]
    PortfolioFetch(#[source] BrokerError),

    #[error("Snapshot persistence failed: {0}")]
    Snapshot(#[from] StoreError),
}
