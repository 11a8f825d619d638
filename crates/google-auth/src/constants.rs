//! Google OAuth constants
//!
//! Endpoint defaults used when the client credentials descriptor does not
//! carry its own `auth_uri` / `token_uri`, and the fixed scope set this tool
//! requests.

/// Google's OAuth 2.0 authorization endpoint
pub const AUTHORIZE_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/auth";

/// Token endpoint for code exchange and token refresh
pub const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// Full read/write access to Apps Script projects
pub const SCOPE_SCRIPT_PROJECTS: &str = "https://www.googleapis.com/auth/script.projects";

/// Read-only access to Apps Script projects
pub const SCOPE_SCRIPT_PROJECTS_READONLY: &str =
    "https://www.googleapis.com/auth/script.projects.readonly";

/// Scopes requested by every authorization, in this order.
pub const SCOPES: [&str; 2] = [SCOPE_SCRIPT_PROJECTS, SCOPE_SCRIPT_PROJECTS_READONLY];

/// Google expects scopes space-delimited in the `scope` parameter.
pub const SCOPE_DELIMITER: &str = " ";

/// Environment fallback for the OAuth client id
pub const ENV_CLIENT_ID: &str = "GOOGLE_CLIENT_ID";

/// Environment fallback for the OAuth client secret
pub const ENV_CLIENT_SECRET: &str = "GOOGLE_CLIENT_SECRET";

/// Prefix of every generated state token.
pub const STATE_PREFIX: &str = "st";
