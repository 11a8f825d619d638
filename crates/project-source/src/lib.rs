//! Project content source abstraction
//!
//! Defines the `ProjectContentSource` capability the pull command depends on:
//! given a project id, return the project's files as (name, kind, source).
//! `AppsScriptSource` implements it against the Apps Script REST API using
//! the caller's bearer access token; tests substitute in-memory sources.

pub mod apps_script;

pub use apps_script::{APPS_SCRIPT_API, AppsScriptSource};

use common::Secret;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

/// Declared kind of a project file, as reported by the remote API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FileKind {
    /// Server-side script (`SERVER_JS`)
    ServerJs,
    /// HTML template (`HTML`)
    Html,
    /// Manifest (`JSON`)
    Json,
    /// Any kind this tool does not know by name
    Other(String),
}

impl From<String> for FileKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "SERVER_JS" => FileKind::ServerJs,
            "HTML" => FileKind::Html,
            "JSON" => FileKind::Json,
            _ => FileKind::Other(value),
        }
    }
}

impl From<FileKind> for String {
    fn from(kind: FileKind) -> Self {
        match kind {
            FileKind::ServerJs => "SERVER_JS".into(),
            FileKind::Html => "HTML".into(),
            FileKind::Json => "JSON".into(),
            FileKind::Other(other) => other,
        }
    }
}

/// One file of a remote project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptFile {
    /// File name without extension; may contain `/` for nested folders
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FileKind,
    #[serde(default)]
    pub source: String,
}

/// Errors from fetching project content.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("access token rejected: {0}")]
    Unauthorized(String),

    #[error("project not found: {0}")]
    NotFound(String),

    #[error("API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid API response: {0}")]
    Decode(String),
}

/// Result alias for source operations.
pub type Result<T> = std::result::Result<T, SourceError>;

/// Capability to list a remote project's files.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`&dyn ProjectContentSource`). Order of the returned files is whatever the
/// remote returns and carries no meaning.
pub trait ProjectContentSource: Send + Sync {
    /// Identifier for logging (e.g. "apps-script")
    fn id(&self) -> &str;

    /// Fetch every file of `project_id`, authenticating with `access_token`.
    fn get<'a>(
        &'a self,
        project_id: &'a str,
        access_token: &'a Secret<String>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ScriptFile>>> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_kind_maps_known_names() {
        assert_eq!(FileKind::from("SERVER_JS".to_string()), FileKind::ServerJs);
        assert_eq!(FileKind::from("HTML".to_string()), FileKind::Html);
        assert_eq!(FileKind::from("JSON".to_string()), FileKind::Json);
        assert_eq!(
            FileKind::from("ENUM_TYPE_UNSPECIFIED".to_string()),
            FileKind::Other("ENUM_TYPE_UNSPECIFIED".into())
        );
    }

    #[test]
    fn script_file_deserializes_api_shape() {
        let json = r#"{"name":"lib/util","type":"SERVER_JS","source":"function f() {}","lastModifyUser":{}}"#;
        let file: ScriptFile = serde_json::from_str(json).unwrap();
        assert_eq!(file.name, "lib/util");
        assert_eq!(file.kind, FileKind::ServerJs);
        assert_eq!(file.source, "function f() {}");
    }

    #[test]
    fn script_file_serializes_kind_as_type() {
        let file = ScriptFile {
            name: "appsscript".into(),
            kind: FileKind::Json,
            source: "{}".into(),
        };
        let json = serde_json::to_value(&file).unwrap();
        assert_eq!(json["type"], "JSON");
    }
}
