//! appssync
//!
//! Command-line tool that:
//! 1. Authorizes against Google with the OAuth2 authorization-code flow,
//!    receiving the callback on a short-lived local listener
//! 2. Stores the resulting token in the config directory
//! 3. Pulls an Apps Script project's files to local disk with that token

mod commands;
mod config;
mod coordinator;
mod error;
mod flow;
mod server;
mod shutdown;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use google_auth::ClientConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::Invocation;
use crate::config::Settings;

/// Bounds every outbound request, including the code exchange
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Parser)]
#[command(name = "appssync", version, about = "Pull Google Apps Script projects to local disk")]
struct Cli {
    /// Config directory holding credentials.json, token.json and config.toml
    #[arg(long, global = true)]
    config: Option<String>,

    /// Client credentials file (default: <config>/credentials.json)
    #[arg(long, global = true)]
    cred: Option<PathBuf>,

    /// Google OAuth client id
    #[arg(long, global = true)]
    clientid: Option<String>,

    /// Google OAuth client secret
    #[arg(long, global = true)]
    clientsecret: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    /// Apps Script id to pull when no command is given
    #[arg(long, env = "APPS_SCRIPT_ID", default_value = "")]
    id: String,

    /// Target directory for pulled files when no command is given
    #[arg(long)]
    path: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Authorize this tool and store the token
    Auth {
        /// Run the flow even if a valid token is stored
        #[arg(long)]
        force: bool,

        #[arg(hide = true)]
        extra: Vec<String>,
    },
    /// Pull a project's files
    Pull {
        /// Apps Script id
        #[arg(value_name = "SCRIPT_ID")]
        script_ids: Vec<String>,

        /// Target directory (default: the configured assets dir)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

fn init_tracing(json: bool) {
    // LOG_LEVEL first, then RUST_LOG, then "info"
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config_dir = Settings::resolve_dir(cli.config.as_deref());
    info!(path = %config_dir.display(), "loading configuration");

    let settings = Settings::load(&config_dir, cli.cred.as_deref())
        .with_context(|| format!("failed to load config from {}", config_dir.display()))?;

    let client = ClientConfig::resolve(
        &settings.credentials_path,
        settings.credentials_explicit,
        cli.clientid.as_deref(),
        cli.clientsecret.as_deref(),
    )
    .await
    .context("failed to resolve OAuth client configuration")?;

    info!(
        config_dir = %settings.config_dir.display(),
        endpoint = %settings.server.endpoint,
        listen_addr = %settings.server.listen_addr,
        token = %settings.token_path.display(),
        "configuration loaded"
    );

    let http = reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .context("failed to build HTTP client")?;

    let inv = Invocation {
        settings,
        client,
        http,
    };

    match &cli.command {
        Some(Command::Auth { force, extra }) => commands::auth(&inv, extra, *force).await,
        Some(Command::Pull { script_ids, dir }) => {
            commands::pull(&inv, script_ids, dir.as_deref()).await
        }
        None => commands::entry(&inv, &cli.id, cli.path.as_deref()).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_pull_with_global_flags() {
        let cli = Cli::try_parse_from([
            "appssync",
            "pull",
            "abc123",
            "--dir",
            "out",
            "--config",
            "/tmp/conf",
            "--clientid",
            "cid",
        ])
        .unwrap();
        assert_eq!(cli.config.as_deref(), Some("/tmp/conf"));
        assert_eq!(cli.clientid.as_deref(), Some("cid"));
        match cli.command {
            Some(Command::Pull { script_ids, dir }) => {
                assert_eq!(script_ids, vec!["abc123".to_string()]);
                assert_eq!(dir, Some(PathBuf::from("out")));
            }
            other => panic!("expected pull, got {other:?}"),
        }
    }

    #[test]
    fn parses_auth_with_extra_args_for_validation() {
        let cli = Cli::try_parse_from(["appssync", "auth", "--force", "stray"]).unwrap();
        match cli.command {
            Some(Command::Auth { force, extra }) => {
                assert!(force);
                assert_eq!(extra, vec!["stray".to_string()]);
            }
            other => panic!("expected auth, got {other:?}"),
        }
    }

    #[test]
    fn bare_invocation_uses_id_and_path() {
        let cli = Cli::try_parse_from(["appssync", "--id", "s1", "--path", "gas"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.id, "s1");
        assert_eq!(cli.path, Some(PathBuf::from("gas")));
    }
}
