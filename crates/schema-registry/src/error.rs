use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    /// The registry rejected the credentials (HTTP 401/403).
    ///
    /// Kept apart from [`RegistryError::Status`] so callers can point the user
    /// at their API key instead of at the schema itself.
    #[error("not authenticated with the schema registry: {0}")]
    NotAuthenticated(String),

    #[error("schema registry returned {status} (error code {error_code}): {message}")]
    Status {
        status: u16,
        error_code: i64,
        message: String,
    },

    #[error("schema registry request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("schema registry endpoint is not configured")]
    MissingEndpoint,

    #[error("invalid references file {path}: {message}")]
    InvalidReferences { path: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RegistryError {
    pub fn is_not_authenticated(&self) -> bool {
        matches!(self, RegistryError::NotAuthenticated(_))
    }

    /// Whether the registry reported that the schema or subject does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::Status { status: 404, .. })
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;
