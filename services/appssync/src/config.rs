//! Settings types and loading
//!
//! Precedence: CLI args > env vars > config file > defaults.
//! Everything lives in one config directory (default `.config`): the
//! optional `config.toml`, the client `credentials.json` and `token.json`.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Env override for the config directory
pub const ENV_CONFIG_DIR: &str = "APPSSYNC_CONFIG_DIR";

/// Env override for the public base URL of the local listener
pub const ENV_ENDPOINT: &str = "APPSSYNC_ENDPOINT";

pub const DEFAULT_CONFIG_DIR: &str = ".config";
pub const CONFIG_FILE: &str = "config.toml";
pub const CREDENTIALS_FILE: &str = "credentials.json";
pub const TOKEN_FILE: &str = "token.json";
pub const DEFAULT_ASSETS_DIR: &str = "appsscript";

/// Resolved settings for one invocation
#[derive(Debug)]
pub struct Settings {
    pub config_dir: PathBuf,
    pub credentials_path: PathBuf,
    /// True when the credentials path was given explicitly (`--cred`);
    /// a missing explicit file is fatal.
    pub credentials_explicit: bool,
    pub token_path: PathBuf,
    pub server: ServerConfig,
    pub assets: AssetsConfig,
}

/// Contents of `config.toml`
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    assets: AssetsConfig,
}

/// Local callback listener settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Base URL the browser uses to reach the listener; the redirect URI
    /// registered with the provider is derived from it.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    #[serde(default = "default_callback_timeout")]
    pub callback_timeout_secs: u64,
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Where pulled files land
#[derive(Debug, Clone, Deserialize)]
pub struct AssetsConfig {
    #[serde(default = "default_assets_dir")]
    pub dir: PathBuf,
}

fn default_endpoint() -> String {
    "http://localhost:8080".into()
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_callback_timeout() -> u64 {
    600
}

fn default_shutdown_grace() -> u64 {
    5
}

fn default_max_connections() -> usize {
    16
}

fn default_assets_dir() -> PathBuf {
    PathBuf::from(DEFAULT_ASSETS_DIR)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            listen_addr: default_listen_addr(),
            callback_timeout_secs: default_callback_timeout(),
            shutdown_grace_secs: default_shutdown_grace(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            dir: default_assets_dir(),
        }
    }
}

impl ServerConfig {
    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Settings {
    /// Load settings from `config_dir`, then overlay environment variables.
    ///
    /// A missing `config.toml` means defaults; an unreadable or invalid one
    /// is an error.
    pub fn load(config_dir: &Path, credentials_override: Option<&Path>) -> common::Result<Self> {
        let config_path = config_dir.join(CONFIG_FILE);
        let mut file_config = match std::fs::read_to_string(&config_path) {
            Ok(contents) => toml::from_str::<FileConfig>(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => FileConfig::default(),
            Err(e) => return Err(e.into()),
        };

        if let Ok(endpoint) = std::env::var(ENV_ENDPOINT) {
            file_config.server.endpoint = endpoint;
        }
        let server = file_config.server;

        if !server.endpoint.starts_with("http://") && !server.endpoint.starts_with("https://") {
            return Err(common::Error::Config(format!(
                "endpoint must start with http:// or https://, got: {}",
                server.endpoint
            )));
        }

        if server.callback_timeout_secs == 0 {
            return Err(common::Error::Config(
                "callback_timeout_secs must be greater than 0".into(),
            ));
        }

        if server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        let (credentials_path, credentials_explicit) = match credentials_override {
            Some(p) => (p.to_path_buf(), true),
            None => (config_dir.join(CREDENTIALS_FILE), false),
        };

        Ok(Self {
            config_dir: config_dir.to_path_buf(),
            credentials_path,
            credentials_explicit,
            token_path: config_dir.join(TOKEN_FILE),
            server,
            assets: file_config.assets,
        })
    }

    /// Resolve the config directory from CLI arg or APPSSYNC_CONFIG_DIR.
    pub fn resolve_dir(cli_dir: Option<&str>) -> PathBuf {
        if let Some(p) = cli_dir {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var(ENV_CONFIG_DIR) {
            return PathBuf::from(p);
        }
        PathBuf::from(DEFAULT_CONFIG_DIR)
    }

    /// Redirect URI of the callback route, as registered with the provider.
    pub fn redirect_uri(&self, callback_path: &str) -> String {
        format!("{}{callback_path}", self.server.endpoint.trim_end_matches('/'))
    }
}
