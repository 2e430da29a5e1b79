//! First-start clone of the tracked repository.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, instrument};

use super::{CommandRunner, describe_exit};

/// What [`ensure_cloned`] found or did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneStatus {
    /// The directory was missing or empty and has been cloned into.
    Cloned,
    /// The directory already had content; it is assumed to be a clone.
    AlreadyPresent,
}

#[derive(Debug, Error)]
pub enum CloneError {
    #[error("{0} exists but is not a directory")]
    NotADirectory(PathBuf),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("`git clone {repository}` failed ({status}): {stderr}")]
    CloneFailed {
        repository: String,
        status: String,
        stderr: String,
    },
}

/// Clones `repository` into `clone_dir` unless it already has content.
///
/// A non-empty directory is not inspected further; the tracker validates it
/// lazily.
#[instrument(skip(runner), fields(clone_dir = %clone_dir.display()))]
pub async fn ensure_cloned<R: CommandRunner>(
    runner: &R,
    repository: &str,
    clone_dir: &Path,
) -> Result<CloneStatus, CloneError> {
    let io_err = |source| CloneError::Io {
        path: clone_dir.to_path_buf(),
        source,
    };

    match tokio::fs::metadata(clone_dir).await {
        Ok(meta) if !meta.is_dir() => {
            return Err(CloneError::NotADirectory(clone_dir.to_path_buf()));
        }
        Ok(_) => {
            let mut entries = tokio::fs::read_dir(clone_dir).await.map_err(io_err)?;
            if entries.next_entry().await.map_err(io_err)?.is_some() {
                return Ok(CloneStatus::AlreadyPresent);
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            if let Some(parent) = clone_dir.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
            }
        }
        Err(e) => return Err(io_err(e)),
    }

    info!(repository, "Cloning repository");
    let target = clone_dir.to_string_lossy();
    let output = runner
        .run(&["clone", repository, &target], Path::new("."))
        .await
        .map_err(io_err)?;

    if !output.is_success() {
        return Err(CloneError::CloneFailed {
            repository: repository.to_string(),
            status: describe_exit(output.code),
            stderr: output.stderr.trim().to_string(),
        });
    }

    info!(repository, "Clone complete");
    Ok(CloneStatus::Cloned)
}
