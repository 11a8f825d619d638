//! State tokens and authorization URL construction

use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use url::Url;

use crate::client::ClientConfig;
use crate::constants::{SCOPE_DELIMITER, STATE_PREFIX};
use crate::error::{Error, Result};

/// Generate a fresh single-use state token.
///
/// Format: `st<unix-nanos><random>`. The nanosecond seed keeps successive
/// tokens distinct; the 16 random bytes make the value unguessable.
pub fn generate_state() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let mut bytes = [0u8; 16];
    rand::rng().fill(&mut bytes);
    format!("{STATE_PREFIX}{nanos}{}", URL_SAFE_NO_PAD.encode(bytes))
}

/// Build the full authorization URL for the offline-access code flow.
///
/// `redirect_uri` must be the local callback URL the listener serves; the
/// provider sends the browser back there with `state` and `code`.
pub fn build_authorization_url(
    client: &ClientConfig,
    redirect_uri: &str,
    state: &str,
    challenge: &str,
) -> Result<String> {
    let mut url = Url::parse(&client.auth_uri)
        .map_err(|e| Error::Config(format!("invalid auth_uri {}: {e}", client.auth_uri)))?;

    url.query_pairs_mut()
        .append_pair("client_id", &client.client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("response_type", "code")
        .append_pair("scope", &client.scopes.join(SCOPE_DELIMITER))
        .append_pair("access_type", "offline")
        .append_pair("state", state)
        .append_pair("code_challenge", challenge)
        .append_pair("code_challenge_method", "S256");

    Ok(url.into())
}
