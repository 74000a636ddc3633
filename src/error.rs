use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Resource not found: {resource} {name} in namespace {namespace}")]
    NotFound {
        resource: String,
        name: String,
        namespace: String,
    },

    #[error("Resource already exists: {resource} {name} in namespace {namespace}")]
    AlreadyExists {
        resource: String,
        name: String,
        namespace: String,
    },

    #[error("Conflict on {name}: resource version mismatch, expected {expected}, got {actual}")]
    Conflict {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Conversion error at {path}: {message}")]
    Conversion { path: String, message: String },

    #[error("Invalid label selector: {0}")]
    InvalidSelector(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The watch fell behind and `missed` events were dropped from its queue.
    #[error("Too old resource version: watch missed {missed} events")]
    Expired { missed: u64 },

    #[error("Kind {kind} not registered in scheme for {group}/{version}")]
    KindNotRegistered {
        group: String,
        version: String,
        kind: String,
    },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("JSON patch error: {0}")]
    PatchError(#[from] json_patch::PatchError),

    #[error("Fixture error: {0}")]
    Fixture(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::AlreadyExists { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, Error::Expired { .. })
    }
}
