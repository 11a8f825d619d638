//! Error types for pull operations

/// Errors from pull operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not authenticated: run `appssync auth` first")]
    NotAuthenticated,

    #[error("fetching project content failed: {0}")]
    Source(#[from] project_source::SourceError),

    #[error("write error: {0}")]
    Write(String),

    #[error("token refresh failed: {0}")]
    RefreshFailed(#[from] google_auth::Error),
}

/// Result alias for pull operations.
pub type Result<T> = std::result::Result<T, Error>;
