//! Per-subject data unit and raw input roles.
//!
//! # Responsibility
//! - Represent one subject/session row with its resolved raw input paths.
//! - Derive deterministic output paths for stage artifacts.
//!
//! # Invariants
//! - A `DataUnit` never changes after discovery.
//! - Derived paths are a pure function of the dwi filename, so re-discovery
//!   of the same unit resolves to the same artifact files.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Raw input role resolved per data unit during discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Diffusion-weighted volume series.
    Dwi,
    /// Gradient b-values file.
    Bval,
    /// Gradient b-vectors file.
    Bvec,
    /// T1-weighted anatomical volume.
    Anat,
    /// Anatomical segmentation labels volume.
    Seg,
}

impl Role {
    pub const ALL: [Role; 5] = [Role::Dwi, Role::Bval, Role::Bvec, Role::Anat, Role::Seg];

    /// Stable short id used in logs and error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dwi => "dwi",
            Self::Bval => "bval",
            Self::Bvec => "bvec",
            Self::Anat => "anat",
            Self::Seg => "seg",
        }
    }

    /// Column name the resolved path is stored under.
    pub fn column_name(self) -> &'static str {
        match self {
            Self::Dwi => "dwi_file",
            Self::Bval => "bval_file",
            Self::Bvec => "bvec_file",
            Self::Anat => "anat_file",
            Self::Seg => "seg_file",
        }
    }

    /// Session subdirectory the role's file lives in.
    pub fn subdir(self) -> &'static str {
        match self {
            Self::Dwi | Self::Bval | Self::Bvec => "dwi",
            Self::Anat | Self::Seg => "anat",
        }
    }

    /// Default shell-style filename pattern for this role.
    pub fn default_pattern(self) -> &'static str {
        match self {
            Self::Dwi => "*_dwi.nii.gz",
            Self::Bval => "*_dwi.bval",
            Self::Bvec => "*_dwi.bvec",
            Self::Anat => "*_T1w.nii.gz",
            Self::Seg => "*_aparc+aseg.nii.gz",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One subject/session row with its resolved raw input files.
///
/// Built by discovery and treated as read-only afterwards; derived columns
/// live in [`crate::model::artifact::ArtifactSet`], never here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataUnit {
    pub subject_id: String,
    pub session_id: String,
    pub dwi_file: PathBuf,
    pub bval_file: PathBuf,
    pub bvec_file: PathBuf,
    pub anat_file: PathBuf,
    pub seg_file: PathBuf,
}

impl DataUnit {
    /// Returns the resolved path for one raw input role.
    pub fn role_path(&self, role: Role) -> &Path {
        match role {
            Role::Dwi => &self.dwi_file,
            Role::Bval => &self.bval_file,
            Role::Bvec => &self.bvec_file,
            Role::Anat => &self.anat_file,
            Role::Seg => &self.seg_file,
        }
    }

    /// Derives a sibling artifact path from the dwi filename.
    ///
    /// The dwi extension is stripped (both parts of `.nii.gz`) and `suffix`
    /// is appended, e.g. `sub-01_dwi.nii.gz` + `_brain_mask.nii.gz` ->
    /// `sub-01_dwi_brain_mask.nii.gz` next to the dwi file.
    pub fn derived_path(&self, suffix: &str) -> PathBuf {
        let file_name = self
            .dwi_file
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        let base = strip_volume_extension(file_name);
        let parent = self.dwi_file.parent().unwrap_or_else(|| Path::new(""));
        parent.join(format!("{base}{suffix}"))
    }
}

fn strip_volume_extension(file_name: &str) -> &str {
    if let Some(base) = file_name.strip_suffix(".nii.gz") {
        return base;
    }
    if let Some(base) = file_name.strip_suffix(".nii") {
        return base;
    }
    match file_name.rsplit_once('.') {
        Some((base, _)) => base,
        None => file_name,
    }
}
