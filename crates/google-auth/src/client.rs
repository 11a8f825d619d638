//! OAuth client configuration
//!
//! The client id/secret pair comes from three places. For each of the two
//! values independently, the first non-empty one wins:
//! 1. CLI override
//! 2. credentials descriptor (`credentials.json` as downloaded from the
//!    Google Cloud console, `installed` or `web` shape)
//! 3. `GOOGLE_CLIENT_ID` / `GOOGLE_CLIENT_SECRET`

use std::path::Path;

use common::Secret;
use serde::Deserialize;
use tracing::{debug, info};

use crate::constants::{
    AUTHORIZE_ENDPOINT, ENV_CLIENT_ID, ENV_CLIENT_SECRET, SCOPES, TOKEN_ENDPOINT,
};
use crate::error::{Error, Result};

/// Resolved OAuth client settings used by the authorization flow.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub auth_uri: String,
    pub token_uri: String,
    pub scopes: Vec<String>,
}

/// The inner object of a provider-issued credentials descriptor.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientDescriptor {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Secret<String>,
    #[serde(default)]
    pub auth_uri: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
}

#[derive(Deserialize)]
struct DescriptorFile {
    installed: Option<ClientDescriptor>,
    web: Option<ClientDescriptor>,
}

impl ClientDescriptor {
    /// Parse a descriptor document. Either the `installed` or the `web`
    /// section must be present.
    pub fn parse(contents: &str) -> Result<Self> {
        let file: DescriptorFile = serde_json::from_str(contents)
            .map_err(|e| Error::Decode(format!("parsing credentials descriptor: {e}")))?;
        file.installed
            .or(file.web)
            .ok_or_else(|| Error::Decode("credentials descriptor has no installed or web client".into()))
    }

    /// Load a descriptor from disk.
    ///
    /// Returns `Ok(None)` when the file does not exist and `required` is
    /// false. An unreadable or malformed file is always an error.
    pub async fn load(path: &Path, required: bool) -> Result<Option<Self>> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if required {
                    return Err(Error::NotFound(format!(
                        "credentials file {}",
                        path.display()
                    )));
                }
                debug!(path = %path.display(), "no credentials file, using environment");
                return Ok(None);
            }
            Err(e) => {
                return Err(Error::Io(format!(
                    "reading credentials file {}: {e}",
                    path.display()
                )));
            }
        };
        let descriptor = Self::parse(&contents)?;
        info!(path = %path.display(), "loaded client credentials descriptor");
        Ok(Some(descriptor))
    }
}

impl ClientConfig {
    /// Resolve the client configuration from a credentials file, CLI
    /// overrides and the process environment.
    pub async fn resolve(
        credentials_path: &Path,
        credentials_required: bool,
        cli_client_id: Option<&str>,
        cli_client_secret: Option<&str>,
    ) -> Result<Self> {
        let descriptor = ClientDescriptor::load(credentials_path, credentials_required).await?;
        let env_id = std::env::var(ENV_CLIENT_ID).ok();
        let env_secret = std::env::var(ENV_CLIENT_SECRET).ok();
        Self::merge(
            descriptor,
            cli_client_id,
            cli_client_secret,
            env_id.as_deref(),
            env_secret.as_deref(),
        )
    }

    /// Apply the precedence rules to already-gathered inputs.
    pub fn merge(
        descriptor: Option<ClientDescriptor>,
        cli_client_id: Option<&str>,
        cli_client_secret: Option<&str>,
        env_client_id: Option<&str>,
        env_client_secret: Option<&str>,
    ) -> Result<Self> {
        let file_id = descriptor.as_ref().map(|d| d.client_id.as_str());
        let file_secret = descriptor.as_ref().map(|d| d.client_secret.expose().as_str());

        let client_id = first_non_empty([cli_client_id, file_id, env_client_id])
            .ok_or_else(|| {
                Error::Config(format!(
                    "no client id: pass --clientid, add credentials.json or set {ENV_CLIENT_ID}"
                ))
            })?
            .to_owned();
        let client_secret = first_non_empty([cli_client_secret, file_secret, env_client_secret])
            .ok_or_else(|| {
                Error::Config(format!(
                    "no client secret: pass --clientsecret, add credentials.json or set {ENV_CLIENT_SECRET}"
                ))
            })?;
        let client_secret = Secret::from(client_secret);

        let auth_uri = descriptor
            .as_ref()
            .and_then(|d| d.auth_uri.clone())
            .unwrap_or_else(|| AUTHORIZE_ENDPOINT.to_owned());
        let token_uri = descriptor
            .as_ref()
            .and_then(|d| d.token_uri.clone())
            .unwrap_or_else(|| TOKEN_ENDPOINT.to_owned());

        Ok(Self {
            client_id,
            client_secret,
            auth_uri,
            token_uri,
            scopes: SCOPES.iter().map(|s| s.to_string()).collect(),
        })
    }
}

fn first_non_empty<'a, const N: usize>(candidates: [Option<&'a str>; N]) -> Option<&'a str> {
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|v| !v.is_empty())
}
