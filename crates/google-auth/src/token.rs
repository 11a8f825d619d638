//! OAuth token exchange and refresh
//!
//! Handles the two token endpoint interactions:
//! 1. Authorization code exchange (flow completion)
//! 2. Token refresh (before a pull, when the stored token has expired)
//!
//! Both POST a form to the client's `token_uri` with different grant types.
//! `TokenExchanger` is the seam the flow coordinator and the pull command
//! depend on, so tests can substitute a stub endpoint.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::ClientConfig;
use crate::error::{Error, Result};

/// Response from the token endpoint for both exchange and refresh.
///
/// Google omits `refresh_token` on refresh responses and on repeat consents;
/// `expires_in` is a delta in seconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Exchange an authorization code for tokens.
///
/// `verifier` is the PKCE verifier of the in-flight request; `redirect_uri`
/// must equal the one sent in the authorization URL.
pub async fn exchange_code(
    http: &reqwest::Client,
    client: &ClientConfig,
    code: &str,
    verifier: &str,
    redirect_uri: &str,
) -> Result<TokenResponse> {
    let response = http
        .post(&client.token_uri)
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("code_verifier", verifier),
            ("client_id", client.client_id.as_str()),
            ("client_secret", client.client_secret.expose().as_str()),
            ("redirect_uri", redirect_uri),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token exchange request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::TokenExchange(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    let token = response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid token response: {e}")))?;
    debug!(
        has_refresh_token = token.refresh_token.is_some(),
        "authorization code exchanged"
    );
    Ok(token)
}

/// Refresh an access token using a refresh token.
pub async fn refresh_token(
    http: &reqwest::Client,
    client: &ClientConfig,
    refresh: &str,
) -> Result<TokenResponse> {
    let response = http
        .post(&client.token_uri)
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh),
            ("client_id", client.client_id.as_str()),
            ("client_secret", client.client_secret.expose().as_str()),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        // invalid_grant comes back as 400; 401 means the client itself is rejected
        if status.as_u16() == 400 || status.as_u16() == 401 {
            return Err(Error::InvalidCredentials(format!(
                "refresh token rejected ({status}): {body}"
            )));
        }

        return Err(Error::TokenExchange(format!(
            "token refresh returned {status}: {body}"
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid refresh response: {e}")))
}

/// Abstraction over the provider's token endpoint.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn TokenExchanger>`).
pub trait TokenExchanger: Send + Sync {
    /// Trade an authorization code for tokens.
    fn exchange<'a>(
        &'a self,
        code: &'a str,
        verifier: &'a str,
        redirect_uri: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenResponse>> + Send + 'a>>;

    /// Obtain a fresh access token from a refresh token.
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenResponse>> + Send + 'a>>;
}

/// `TokenExchanger` backed by the real token endpoint of `client.token_uri`.
pub struct GoogleTokenClient {
    http: reqwest::Client,
    client: ClientConfig,
}

impl GoogleTokenClient {
    pub fn new(http: reqwest::Client, client: ClientConfig) -> Self {
        Self { http, client }
    }
}

impl TokenExchanger for GoogleTokenClient {
    fn exchange<'a>(
        &'a self,
        code: &'a str,
        verifier: &'a str,
        redirect_uri: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenResponse>> + Send + 'a>> {
        Box::pin(exchange_code(
            &self.http,
            &self.client,
            code,
            verifier,
            redirect_uri,
        ))
    }

    fn refresh<'a>(
        &'a self,
        refresh: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenResponse>> + Send + 'a>> {
        Box::pin(refresh_token(&self.http, &self.client, refresh))
    }
}
