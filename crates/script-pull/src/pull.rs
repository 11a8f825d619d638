//! Pull orchestrator

use std::path::Path;

use google_auth::Credential;
use project_source::ProjectContentSource;
use tracing::{info, warn};

use crate::assets::write_asset;
use crate::error::{Error, Result};

/// Download every file of `project_id` into `dest`.
///
/// Fails with `NotAuthenticated` before any network call when the credential
/// has no access token. Files are written sequentially; the first failure
/// aborts and earlier files are left in place. Returns the number written.
pub async fn pull(
    source: &dyn ProjectContentSource,
    project_id: &str,
    credential: &Credential,
    dest: &Path,
) -> Result<usize> {
    if !credential.is_valid() {
        return Err(Error::NotAuthenticated);
    }

    info!(
        project_id,
        source = source.id(),
        dest = %dest.display(),
        "pulling project"
    );
    let files = source.get(project_id, &credential.access_token).await?;

    let mut written = 0;
    for file in &files {
        match write_asset(dest, file).await {
            Ok(path) => {
                info!(path = %path.display(), "pulled");
                written += 1;
            }
            Err(e) => {
                warn!(
                    name = %file.name,
                    written,
                    remaining = files.len() - written,
                    error = %e,
                    "aborting pull"
                );
                return Err(e);
            }
        }
    }

    Ok(written)
}
