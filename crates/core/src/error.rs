use std::path::PathBuf;

use crate::domain::Backend;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("EXIF parsing error: {0}")]
    Exif(#[from] exif::Error),

    #[error("walkdir error: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("config parse error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("catalog schema version {db} is newer than this build supports ({code})")]
    SchemaTooNew { db: u32, code: u32 },

    #[error("cannot {operation} on {backend} without valid credentials")]
    Capability {
        backend: Backend,
        operation: &'static str,
    },

    #[error("{backend} does not support {operation}")]
    Unsupported {
        backend: Backend,
        operation: &'static str,
    },

    #[error("network error: {0}")]
    Transient(String),

    #[error("unexpected response: {0}")]
    Protocol(String),

    #[error("{backend} rejected the request (status {status}): {message}")]
    Rejected {
        backend: Backend,
        status: u16,
        message: String,
    },

    #[error("{backend} is out of sync for tour {tour_id}{}; run `tourer forcesync`, then retry", photo_suffix(.photo_id))]
    OutOfSync {
        backend: Backend,
        tour_id: String,
        photo_id: Option<String>,
    },

    #[error("operation aborted: {0}")]
    ConfirmationDeclined(String),

    #[error("tour not found: {0}")]
    TourNotFound(String),

    #[error("photo not found: {0}")]
    PhotoNotFound(String),

    #[error("tour {0} already exists")]
    TourNameTaken(String),

    #[error("{field} too long, should be no more than {max} characters")]
    FieldTooLong { field: &'static str, max: usize },

    #[error("tour {tour_id} is already synced to {backend}")]
    AlreadyIntegrated { tour_id: String, backend: Backend },

    #[error("tour {tour_id} is not synced to {backend}")]
    NotIntegrated { tour_id: String, backend: Backend },

    #[error("unknown backend: {0}")]
    UnknownBackend(String),

    #[error("invalid decimal value: {0:?}")]
    InvalidDecimal(String),

    #[error("{mode} is not a valid transport for {domain} tours")]
    InvalidTransport { domain: String, mode: String },

    #[error("path does not exist: {}", .0.display())]
    PathNotFound(PathBuf),
}

fn photo_suffix(photo_id: &Option<String>) -> String {
    match photo_id {
        Some(id) => format!(" (photo {id})"),
        None => String::new(),
    }
}

impl Error {
    /// Whether the failure may succeed if the same request is sent again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_))
    }
}

/// Only failures on the wire are worth resending. A request that could not
/// be built, a redirect loop or an undecodable body fails the same way again.
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() || err.is_body() {
            Error::Transient(err.to_string())
        } else {
            Error::Protocol(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
