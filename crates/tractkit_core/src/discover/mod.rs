//! Data unit discovery over the preprocessed directory tree.
//!
//! # Responsibility
//! - Define discovery error taxonomy.
//! - Expose the index that enumerates subject/session units.
//!
//! # Invariants
//! - Discovery never writes to the filesystem.
//! - Each required role resolves to exactly one file per unit; anything else
//!   is a fatal error for that unit and propagates.

use crate::model::unit::Role;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

mod index;

pub use index::{DataUnitIndex, RolePatterns};

pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

/// Fatal discovery failure.
#[derive(Debug)]
pub enum DiscoveryError {
    /// The preprocessed root does not exist or is not a directory.
    RootNotFound(PathBuf),
    /// A role glob compiled to an invalid matcher.
    InvalidPattern {
        role: Role,
        pattern: String,
        message: String,
    },
    /// A required role matched no file in its session subdirectory.
    RoleNotFound {
        subject: String,
        session: String,
        role: Role,
        pattern: String,
    },
    /// A required role matched more than one file.
    AmbiguousRole {
        subject: String,
        session: String,
        role: Role,
        pattern: String,
        matches: usize,
    },
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl Display for DiscoveryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RootNotFound(path) => {
                write!(f, "preprocessed root not found: {}", path.display())
            }
            Self::InvalidPattern {
                role,
                pattern,
                message,
            } => write!(f, "invalid pattern `{pattern}` for role {role}: {message}"),
            Self::RoleNotFound {
                subject,
                session,
                role,
                pattern,
            } => write!(
                f,
                "no file matching `{pattern}` for role {role} in {subject}/{session}"
            ),
            Self::AmbiguousRole {
                subject,
                session,
                role,
                pattern,
                matches,
            } => write!(
                f,
                "{matches} files match `{pattern}` for role {role} in {subject}/{session}; expected exactly one"
            ),
            Self::Io { path, source } => {
                write!(f, "discovery i/o error at `{}`: {source}", path.display())
            }
        }
    }
}

impl Error for DiscoveryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}
