//! Subject/session enumeration and role resolution.
//!
//! # Responsibility
//! - Walk `sub-*/sess-*/{dwi,anat}` under the preprocessed root.
//! - Resolve exactly one file per raw input role via glob patterns.
//!
//! # Invariants
//! - Units are produced in directory-listing order; no sorting is applied.
//! - Role patterns match whole filenames, never substrings.

use super::{DiscoveryError, DiscoveryResult};
use crate::model::unit::{DataUnit, Role};
use log::info;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

const SUBJECT_DIR_PREFIX: &str = "sub-";
const SESSION_DIR_PREFIX: &str = "sess-";

/// Shell-style filename pattern per raw input role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePatterns {
    pub dwi: String,
    pub bval: String,
    pub bvec: String,
    pub anat: String,
    pub seg: String,
}

impl RolePatterns {
    pub fn pattern(&self, role: Role) -> &str {
        match role {
            Role::Dwi => &self.dwi,
            Role::Bval => &self.bval,
            Role::Bvec => &self.bvec,
            Role::Anat => &self.anat,
            Role::Seg => &self.seg,
        }
    }
}

impl Default for RolePatterns {
    fn default() -> Self {
        Self {
            dwi: Role::Dwi.default_pattern().to_string(),
            bval: Role::Bval.default_pattern().to_string(),
            bvec: Role::Bvec.default_pattern().to_string(),
            anat: Role::Anat.default_pattern().to_string(),
            seg: Role::Seg.default_pattern().to_string(),
        }
    }
}

/// Discovers data units from a preprocessed directory tree.
pub struct DataUnitIndex {
    root: PathBuf,
    patterns: RolePatterns,
}

impl DataUnitIndex {
    pub fn new(root: impl Into<PathBuf>, patterns: RolePatterns) -> Self {
        Self {
            root: root.into(),
            patterns,
        }
    }

    /// Enumerates all subject/session units under the root.
    ///
    /// # Errors
    /// - `RootNotFound` when the root is missing.
    /// - `RoleNotFound`/`AmbiguousRole` when a role does not resolve to
    ///   exactly one file for a unit; the error aborts discovery.
    pub fn discover(&self) -> DiscoveryResult<Vec<DataUnit>> {
        let started_at = Instant::now();
        if !self.root.is_dir() {
            return Err(DiscoveryError::RootNotFound(self.root.clone()));
        }

        let matchers = self.compile_matchers()?;
        let mut units = Vec::new();

        for subject_dir in list_dirs_with_prefix(&self.root, SUBJECT_DIR_PREFIX)? {
            let subject_id = dir_name(&subject_dir);
            for session_dir in list_dirs_with_prefix(&subject_dir, SESSION_DIR_PREFIX)? {
                let session_id = dir_name(&session_dir);
                units.push(self.resolve_unit(&subject_id, &session_id, &session_dir, &matchers)?);
            }
        }

        info!(
            "event=discovery module=discover status=ok units={} duration_ms={}",
            units.len(),
            started_at.elapsed().as_millis()
        );
        Ok(units)
    }

    fn compile_matchers(&self) -> DiscoveryResult<Vec<(Role, Regex)>> {
        Role::ALL
            .into_iter()
            .map(|role| {
                let pattern = self.patterns.pattern(role);
                let regex = Regex::new(&glob_to_regex(pattern)).map_err(|err| {
                    DiscoveryError::InvalidPattern {
                        role,
                        pattern: pattern.to_string(),
                        message: err.to_string(),
                    }
                })?;
                Ok((role, regex))
            })
            .collect()
    }

    fn resolve_unit(
        &self,
        subject_id: &str,
        session_id: &str,
        session_dir: &Path,
        matchers: &[(Role, Regex)],
    ) -> DiscoveryResult<DataUnit> {
        let mut resolved: Vec<PathBuf> = Vec::with_capacity(Role::ALL.len());
        for (role, regex) in matchers {
            resolved.push(self.resolve_role(subject_id, session_id, session_dir, *role, regex)?);
        }
        let mut paths = resolved.into_iter();
        Ok(DataUnit {
            subject_id: subject_id.to_string(),
            session_id: session_id.to_string(),
            // Order matches Role::ALL.
            dwi_file: paths.next().unwrap_or_default(),
            bval_file: paths.next().unwrap_or_default(),
            bvec_file: paths.next().unwrap_or_default(),
            anat_file: paths.next().unwrap_or_default(),
            seg_file: paths.next().unwrap_or_default(),
        })
    }

    fn resolve_role(
        &self,
        subject_id: &str,
        session_id: &str,
        session_dir: &Path,
        role: Role,
        regex: &Regex,
    ) -> DiscoveryResult<PathBuf> {
        let role_dir = session_dir.join(role.subdir());
        let mut matches = Vec::new();

        if role_dir.is_dir() {
            for entry in read_dir_entries(&role_dir)? {
                if !entry.is_file() {
                    continue;
                }
                let matched = entry
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| regex.is_match(name));
                if matched {
                    matches.push(entry);
                }
            }
        }

        match matches.len() {
            0 => Err(DiscoveryError::RoleNotFound {
                subject: subject_id.to_string(),
                session: session_id.to_string(),
                role,
                pattern: self.patterns.pattern(role).to_string(),
            }),
            1 => Ok(matches.remove(0)),
            count => Err(DiscoveryError::AmbiguousRole {
                subject: subject_id.to_string(),
                session: session_id.to_string(),
                role,
                pattern: self.patterns.pattern(role).to_string(),
                matches: count,
            }),
        }
    }
}

/// Compiles a shell-style glob into an anchored regex source.
///
/// Supports `*` (any run of characters) and `?` (one character); everything
/// else is matched literally.
pub(crate) fn glob_to_regex(pattern: &str) -> String {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            other => source.push_str(&regex::escape(&other.to_string())),
        }
    }
    source.push('$');
    source
}

fn list_dirs_with_prefix(dir: &Path, prefix: &str) -> DiscoveryResult<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in read_dir_entries(dir)? {
        let keep = entry.is_dir()
            && entry
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(prefix));
        if keep {
            dirs.push(entry);
        }
    }
    Ok(dirs)
}

fn read_dir_entries(dir: &Path) -> DiscoveryResult<Vec<PathBuf>> {
    let reader = fs::read_dir(dir).map_err(|source| DiscoveryError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut entries = Vec::new();
    for entry in reader {
        let entry = entry.map_err(|source| DiscoveryError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        entries.push(entry.path());
    }
    Ok(entries)
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::glob_to_regex;
    use regex::Regex;

    #[test]
    fn glob_matches_whole_name_only() {
        let regex = Regex::new(&glob_to_regex("*_dwi.nii.gz")).unwrap();
        assert!(regex.is_match("sub-01_dwi.nii.gz"));
        assert!(!regex.is_match("sub-01_dwi.nii.gz.bak"));
        assert!(!regex.is_match("sub-01_dwi.bval"));
    }

    #[test]
    fn glob_escapes_regex_metacharacters() {
        let regex = Regex::new(&glob_to_regex("*_aparc+aseg.nii.gz")).unwrap();
        assert!(regex.is_match("sub-01_aparc+aseg.nii.gz"));
        assert!(!regex.is_match("sub-01_aparcXaseg.nii.gz"));
    }

    #[test]
    fn question_mark_matches_one_character() {
        let regex = Regex::new(&glob_to_regex("sess-??")).unwrap();
        assert!(regex.is_match("sess-01"));
        assert!(!regex.is_match("sess-001"));
    }
}
