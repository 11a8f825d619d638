//! Token storage for the OAuth credential
//!
//! One credential per config directory, persisted as a small JSON record
//! (`access_token`, `token_type`, `refresh_token`, `expiry`). The layout
//! matches the token files written by the common OAuth2 client libraries, so
//! an existing `token.json` keeps working.
//!
//! Writes go to a temp file in the same directory and are renamed over the
//! target, so a reader never observes a half-written record.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use common::Secret;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::token::TokenResponse;

/// A bearer credential obtained from a successful code exchange.
///
/// Valid for use iff `access_token` is non-empty. `expiry` is advisory and
/// only consulted by callers that want to refresh before use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: Secret<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<Secret<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

fn default_token_type() -> String {
    "Bearer".to_owned()
}

impl Credential {
    /// Build a credential from a token endpoint response received at `now`.
    ///
    /// `expires_in` is a delta in seconds; it becomes an absolute timestamp.
    /// A delta too large to represent means no expiry.
    pub fn from_response(response: TokenResponse, now: DateTime<Utc>) -> Self {
        Self {
            access_token: Secret::new(response.access_token),
            token_type: response
                .token_type
                .filter(|t| !t.is_empty())
                .unwrap_or_else(default_token_type),
            refresh_token: response
                .refresh_token
                .filter(|t| !t.is_empty())
                .map(Secret::new),
            expiry: response
                .expires_in
                .and_then(|secs| i64::try_from(secs).ok())
                .and_then(Duration::try_seconds)
                .and_then(|delta| now.checked_add_signed(delta)),
        }
    }

    /// True when the access token is usable at all.
    pub fn is_valid(&self) -> bool {
        !self.access_token.is_empty()
    }

    /// Expiry timestamp, treating the zero time some writers emit
    /// (`0001-01-01T00:00:00Z`) as "no expiry".
    pub fn effective_expiry(&self) -> Option<DateTime<Utc>> {
        self.expiry.filter(|e| e.timestamp() > 0)
    }

    /// True when the credential expires within `skew` of `now`.
    pub fn expires_within(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        self.effective_expiry()
            .is_some_and(|expiry| expiry <= now + skew)
    }
}

/// File-backed store for the single credential.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the credential record.
    ///
    /// `NotFound` when the file does not exist, `Decode` when it cannot be
    /// parsed. No retries.
    pub async fn load(&self) -> Result<Credential> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!(
                    "token file {}",
                    self.path.display()
                )));
            }
            Err(e) => {
                return Err(Error::Io(format!(
                    "reading token file {}: {e}",
                    self.path.display()
                )));
            }
        };
        let credential: Credential = serde_json::from_str(&contents)
            .map_err(|e| Error::Decode(format!("parsing token file: {e}")))?;
        debug!(path = %self.path.display(), "loaded token");
        Ok(credential)
    }

    /// Persist the credential, replacing any previous one wholesale.
    ///
    /// The file is created with 0600 permissions (owner read/write only).
    pub async fn store(&self, credential: &Credential) -> Result<()> {
        let json = serde_json::to_string_pretty(credential)
            .map_err(|e| Error::Write(format!("serializing token: {e}")))?;
        write_atomic(&self.path, json.as_bytes()).await?;
        info!(path = %self.path.display(), "stored token");
        Ok(())
    }
}

/// Write `data` to `path` through a temp file + rename.
async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
        _ => PathBuf::from("."),
    };
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| Error::Write(format!("creating token directory {}: {e}", dir.display())))?;

    let tmp_path = dir.join(format!(".token.tmp.{}", std::process::id()));

    if let Err(e) = write_private(&tmp_path, data).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e);
    }

    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(Error::Write(format!("renaming temp token file: {e}")));
    }

    debug!(path = %path.display(), "persisted token");
    Ok(())
}

/// Create (or truncate) `path` readable by the owner only, then write `data`.
async fn write_private(path: &Path, data: &[u8]) -> Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options
        .open(path)
        .await
        .map_err(|e| Error::Write(format!("creating temp token file: {e}")))?;

    // A leftover temp file keeps its old mode across truncate
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(|e| Error::Write(format!("setting token file permissions: {e}")))?;
    }

    file.write_all(data)
        .await
        .map_err(|e| Error::Write(format!("writing temp token file: {e}")))?;
    file.sync_all()
        .await
        .map_err(|e| Error::Write(format!("syncing temp token file: {e}")))?;
    Ok(())
}
