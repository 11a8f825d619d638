//! Access token refresh before a pull
//!
//! The authorization flow never refreshes; the stored expiry is advisory.
//! When it says the token is (about to be) stale and a refresh token is on
//! hand, the pull path renews it and persists the replacement so the next
//! invocation starts from the fresh token.

use chrono::{DateTime, Duration, Utc};
use google_auth::{Credential, TokenExchanger, TokenStore};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Refresh when the token expires within this many seconds.
pub const REFRESH_SKEW_SECS: i64 = 60;

/// Return a credential that is not known to be expired at `now`.
///
/// Credentials without expiry, or without a refresh token, are returned
/// unchanged. A refreshed credential keeps the old refresh token when the
/// provider does not issue a new one.
pub async fn ensure_fresh(
    credential: Credential,
    exchanger: &dyn TokenExchanger,
    store: &TokenStore,
    now: DateTime<Utc>,
) -> Result<Credential> {
    if !credential.expires_within(now, Duration::seconds(REFRESH_SKEW_SECS)) {
        debug!("stored token still fresh");
        return Ok(credential);
    }

    let Some(refresh) = credential.refresh_token.clone() else {
        warn!("stored token expired and no refresh token is available");
        return Ok(credential);
    };

    let response = exchanger.refresh(refresh.expose()).await?;
    let mut refreshed = Credential::from_response(response, now);
    if refreshed.refresh_token.is_none() {
        refreshed.refresh_token = Some(refresh);
    }

    store
        .store(&refreshed)
        .await
        .map_err(|e| Error::Write(e.to_string()))?;
    info!(expiry = ?refreshed.expiry, "refreshed access token");
    Ok(refreshed)
}
