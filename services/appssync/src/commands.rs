//! Command implementations: `auth`, `pull` and the bare entry point

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use google_auth::{ClientConfig, GoogleTokenClient, TokenExchanger, TokenStore};
use project_source::{AppsScriptSource, ProjectContentSource};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::Settings;
use crate::coordinator::Coordinator;
use crate::error::FlowError;
use crate::server::{self, CALLBACK_PATH, START_PATH};

/// Everything a command needs, resolved once at startup.
pub struct Invocation {
    pub settings: Settings,
    pub client: ClientConfig,
    pub http: reqwest::Client,
}

impl Invocation {
    fn store(&self) -> TokenStore {
        TokenStore::new(self.settings.token_path.clone())
    }
}

/// True when a usable token is already stored.
///
/// A missing, unreadable or empty token file all mean "authorize first".
pub async fn has_valid_token(store: &TokenStore) -> bool {
    match store.load().await {
        Ok(credential) => credential.is_valid(),
        Err(google_auth::Error::NotFound(_)) => false,
        Err(e) => {
            warn!(error = %e, path = %store.path().display(), "ignoring unusable token file");
            false
        }
    }
}

/// `auth`: run the flow unless a valid token exists (or `force` is set).
pub async fn auth(inv: &Invocation, extra_args: &[String], force: bool) -> Result<()> {
    if !extra_args.is_empty() {
        return Err(FlowError::InvalidArgument(format!(
            "auth takes no arguments, got: {}",
            extra_args.join(" ")
        ))
        .into());
    }

    if !force && has_valid_token(&inv.store()).await {
        println!("Already authenticated.");
        return Ok(());
    }

    authorize(inv).await
}

/// `pull <scriptId>`: download a project into `dir` (or the configured assets dir).
pub async fn pull(inv: &Invocation, script_ids: &[String], dir: Option<&Path>) -> Result<()> {
    let [script_id] = script_ids else {
        return Err(FlowError::InvalidArgument(format!(
            "pull takes exactly one scriptId, got {}",
            script_ids.len()
        ))
        .into());
    };
    pull_into(inv, script_id, dir.unwrap_or(&inv.settings.assets.dir)).await
}

/// No command: authorize when no valid token exists, otherwise pull `script_id`.
pub async fn entry(inv: &Invocation, script_id: &str, dir: Option<&Path>) -> Result<()> {
    if !has_valid_token(&inv.store()).await {
        return authorize(inv).await;
    }
    pull_into(inv, script_id, dir.unwrap_or(&inv.settings.assets.dir)).await
}

async fn authorize(inv: &Invocation) -> Result<()> {
    let listen_addr = inv.settings.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind callback listener to {listen_addr}"))?;

    let exchanger = Arc::new(GoogleTokenClient::new(inv.http.clone(), inv.client.clone()));
    let coordinator = Arc::new(Coordinator::new(
        inv.client.clone(),
        inv.settings.redirect_uri(CALLBACK_PATH),
        inv.settings.server.callback_timeout(),
        exchanger,
        inv.store(),
    ));

    info!(addr = %listen_addr, "callback listener ready");
    println!(
        "Go to the following link in your browser and authorize the tool first:\n\n{}{START_PATH}\n",
        inv.settings.server.endpoint.trim_end_matches('/')
    );

    server::serve_flow(
        listener,
        coordinator,
        inv.settings.server.max_connections,
        inv.settings.server.shutdown_grace(),
    )
    .await?;

    println!(
        "Authorized. Token stored in {}",
        inv.settings.token_path.display()
    );
    Ok(())
}

async fn pull_into(inv: &Invocation, script_id: &str, dest: &Path) -> Result<()> {
    let exchanger = GoogleTokenClient::new(inv.http.clone(), inv.client.clone());
    let source = AppsScriptSource::new(inv.http.clone());

    println!("Pulling assets for scriptId '{script_id}'.");
    let count = pull_with(&inv.store(), &exchanger, &source, script_id, dest).await?;
    println!("Pulled {count} files for scriptId '{script_id}'.");
    Ok(())
}

/// Load the stored token, refresh it if stale, then pull.
pub async fn pull_with(
    store: &TokenStore,
    exchanger: &dyn TokenExchanger,
    source: &dyn ProjectContentSource,
    script_id: &str,
    dest: &Path,
) -> Result<usize> {
    if script_id.is_empty() {
        return Err(FlowError::InvalidArgument("no scriptId given (use --id)".into()).into());
    }

    let credential = match store.load().await {
        Ok(credential) => credential,
        Err(google_auth::Error::NotFound(_)) => {
            return Err(script_pull::Error::NotAuthenticated.into());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read {}", store.path().display()));
        }
    };

    let credential = script_pull::ensure_fresh(credential, exchanger, store, Utc::now()).await?;
    let count = script_pull::pull(source, script_id, &credential, dest).await?;
    Ok(count)
}
