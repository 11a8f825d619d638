//! Asset writer: maps a fetched file to `<dest>/<name>.<ext>` and writes it

use std::path::{Component, Path, PathBuf};

use project_source::{FileKind, ScriptFile};
use tracing::debug;

use crate::error::{Error, Result};

/// File extension for a declared file kind.
///
/// `JSON` -> `json`, `HTML` -> `html`, everything else -> `gs`.
pub fn extension_for(kind: &FileKind) -> &'static str {
    match kind {
        FileKind::Json => "json",
        FileKind::Html => "html",
        FileKind::ServerJs | FileKind::Other(_) => "gs",
    }
}

/// Target path of `file` below `dest`.
///
/// Names may contain `/` to denote folders. Absolute names and `..`
/// components are rejected so a file can never land outside `dest`.
pub fn asset_path(dest: &Path, file: &ScriptFile) -> Result<PathBuf> {
    let name = Path::new(&file.name);
    let escapes = name
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if file.name.is_empty() || escapes {
        return Err(Error::Write(format!(
            "refusing to write asset with unsafe name {:?}",
            file.name
        )));
    }
    Ok(dest.join(format!("{}.{}", file.name, extension_for(&file.kind))))
}

/// Write one file, creating intermediate directories as needed.
pub async fn write_asset(dest: &Path, file: &ScriptFile) -> Result<PathBuf> {
    let path = asset_path(dest, file)?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::Write(format!("creating {}: {e}", parent.display())))?;
    }

    tokio::fs::write(&path, file.source.as_bytes())
        .await
        .map_err(|e| Error::Write(format!("writing {}: {e}", path.display())))?;

    debug!(path = %path.display(), bytes = file.source.len(), "wrote asset");
    Ok(path)
}
