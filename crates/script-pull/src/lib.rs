//! Pull remote project files to local disk
//!
//! Given a stored credential, fetches a project's file list through a
//! `ProjectContentSource` and writes each file beneath a destination
//! directory, one file at a time in the order the source returns them.
//!
//! Pull lifecycle:
//! 1. `refresh::ensure_fresh()` renews an expired access token (if a refresh
//!    token exists) and persists the replacement
//! 2. `pull::pull()` refuses to run without an access token
//! 3. The source lists the files; `assets::write_asset()` writes each one as
//!    `<dest>/<name>.<ext>` with the extension chosen from its kind
//! 4. The first write failure aborts the pull; files already written stay

pub mod assets;
pub mod error;
pub mod pull;
pub mod refresh;

pub use assets::{asset_path, extension_for, write_asset};
pub use error::{Error, Result};
pub use pull::pull;
pub use refresh::{REFRESH_SKEW_SECS, ensure_fresh};
