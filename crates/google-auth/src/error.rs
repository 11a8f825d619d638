//! Error types for OAuth authentication operations

/// Errors from OAuth authentication operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("client configuration error: {0}")]
    Config(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
