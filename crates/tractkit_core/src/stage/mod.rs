//! Derivation stages and the lazy column cache policy.
//!
//! # Responsibility
//! - Define the stage error taxonomy.
//! - Implement the one memoization policy shared by every stage: present and
//!   not forced means return unchanged, otherwise compute and store.
//!
//! # Invariants
//! - A cache hit returns the stored value unchanged: no raw input reads, no
//!   dependency resolution, no backend calls, no file writes.
//! - A stage never runs before all of its declared dependencies hold values
//!   for that row.
//! - Presence of the output file on disk is the cache-validity proxy; there
//!   is no content hash or timestamp check. An upstream file changed in
//!   place without deleting downstream artifacts yields stale results; see
//!   DESIGN.md for the recorded decision.
//! - A row's derivation never reads another row's columns.

use crate::backend::BackendError;
use crate::model::artifact::ArtifactKind;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub mod runner;

pub use runner::StageRunner;

pub type StageResult<T> = Result<T, StageError>;

/// Failure of one row's derivation chain.
#[derive(Debug)]
pub enum StageError {
    /// A required upstream file is absent or unreadable. `column` names the
    /// dependency as stored in the collection.
    MissingDependency {
        column: &'static str,
        path: PathBuf,
    },
    /// The numerics collaborator failed while producing `stage`.
    Backend {
        stage: ArtifactKind,
        source: BackendError,
    },
}

impl Display for StageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingDependency { column, path } => write!(
                f,
                "missing dependency {column}: `{}` is absent or unreadable",
                path.display()
            ),
            Self::Backend { stage, source } => {
                write!(f, "stage {stage} failed: {source}")
            }
        }
    }
}

impl Error for StageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::MissingDependency { .. } => None,
            Self::Backend { source, .. } => Some(source),
        }
    }
}

/// Resolves a required upstream file, failing with the dependency's column
/// name when it cannot be read.
pub(crate) fn require_input<'p>(path: &'p Path, column: &'static str) -> StageResult<&'p Path> {
    if path.is_file() {
        Ok(path)
    } else {
        Err(StageError::MissingDependency {
            column,
            path: path.to_path_buf(),
        })
    }
}

/// Cache-hit probe for a file-backed column, checked before any input
/// validation or dependency resolution.
///
/// Returns the stored path when the slot is filled, adopts an output file
/// already on disk into an empty slot, and returns `None` on a miss.
pub(crate) fn cached_file(slot: &mut Option<PathBuf>, out_path: &Path) -> Option<PathBuf> {
    if let Some(existing) = slot {
        return Some(existing.clone());
    }
    if out_path.is_file() {
        *slot = Some(out_path.to_path_buf());
        return Some(out_path.to_path_buf());
    }
    None
}

/// Memoization policy for a file-backed column.
///
/// - Slot already filled and not forced: return it unchanged, no side
///   effects.
/// - Output file already on disk and not forced: adopt it without
///   recomputing (existence is proof of validity).
/// - Otherwise run `compute`, which must write `out_path`, then record it.
///
/// With `force` set, `compute` runs unconditionally and overwrites.
pub(crate) fn ensure_file_column<F>(
    slot: &mut Option<PathBuf>,
    force: bool,
    out_path: PathBuf,
    compute: F,
) -> StageResult<PathBuf>
where
    F: FnOnce(&Path) -> StageResult<()>,
{
    if !force {
        if let Some(existing) = slot {
            return Ok(existing.clone());
        }
        if out_path.is_file() {
            *slot = Some(out_path.clone());
            return Ok(out_path);
        }
    }
    compute(&out_path)?;
    *slot = Some(out_path.clone());
    Ok(out_path)
}

/// Memoization policy for an in-memory column.
///
/// Same shape as [`ensure_file_column`] minus the on-disk probe: in-memory
/// values are reconstructed deterministically, so a filled slot is the only
/// cache.
pub(crate) fn ensure_object_column<T, F>(
    slot: &mut Option<T>,
    force: bool,
    compute: F,
) -> StageResult<T>
where
    T: Clone,
    F: FnOnce() -> StageResult<T>,
{
    if !force {
        if let Some(existing) = slot {
            return Ok(existing.clone());
        }
    }
    let value = compute()?;
    *slot = Some(value.clone());
    Ok(value)
}
