/// Alternate output locations for dumps
///
/// When the requested directory cannot be written, the dump is retried in the
/// system temp directory and then the user's downloads directory. Only
/// permission-style failures move on to the next candidate.

use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::core::error::OperationError;
use crate::core::executor::{is_unwritable, ExecError};

#[derive(Debug, Clone)]
pub struct FallbackPolicy {
    candidates: Vec<PathBuf>,
}

/// Value produced by the attempt plus where it was written
#[derive(Debug)]
pub struct Placed<T> {
    pub value: T,
    pub path: PathBuf,
    pub fell_back: bool,
}

impl FallbackPolicy {
    /// Requested directory, then temp, then downloads (duplicates removed)
    pub fn new(requested: impl Into<PathBuf>) -> Self {
        let mut candidates = vec![requested.into(), std::env::temp_dir()];
        if let Some(downloads) = dirs::download_dir() {
            candidates.push(downloads);
        }
        Self::with_candidates(candidates)
    }

    pub fn with_candidates(candidates: Vec<PathBuf>) -> Self {
        let mut unique: Vec<PathBuf> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if !unique.contains(&candidate) {
                unique.push(candidate);
            }
        }
        Self { candidates: unique }
    }

    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    /// Run `attempt` with `<dir>/<file_name>` for each candidate until one
    /// is writable
    pub async fn place<T, F, Fut>(&self, file_name: &Path, mut attempt: F) -> Result<Placed<T>, OperationError>
    where
        F: FnMut(PathBuf) -> Fut,
        Fut: Future<Output = Result<T, ExecError>>,
    {
        let mut attempts = Vec::new();

        for (index, dir) in self.candidates.iter().enumerate() {
            let path = dir.join(file_name);

            if let Err(e) = tokio::fs::create_dir_all(dir).await {
                if !is_unwritable(&e) && e.kind() != std::io::ErrorKind::NotFound {
                    return Err(OperationError::io(format!("Failed to create {}", dir.display()), e));
                }
                warn!(dir = %dir.display(), error = %e, "Dump directory unavailable");
                attempts.push((path, e.to_string()));
                continue;
            }

            match attempt(path.clone()).await {
                Ok(value) => {
                    if index > 0 {
                        warn!(
                            requested = %self.candidates[0].display(),
                            used = %dir.display(),
                            "Dump written to fallback location"
                        );
                    }
                    return Ok(Placed {
                        value,
                        path,
                        fell_back: index > 0,
                    });
                }
                Err(ExecError::OutputNotWritable { path, reason }) => {
                    warn!(path = %path.display(), reason = %reason, "Output not writable, trying next location");
                    attempts.push((path, reason));
                }
                Err(other) => return Err(other.into()),
            }
        }

        Err(OperationError::NoWritableLocation { attempts })
    }
}
