//! Numerics collaborator seam.
//!
//! # Responsibility
//! - Define the contract every external neuroimaging backend must satisfy.
//! - Keep the orchestrator free of numerical algorithm details.
//!
//! # Invariants
//! - Backend routines are pure given their inputs plus configuration: the
//!   same inputs always produce the same derived content.
//! - File-producing routines must be safe to overwrite an existing output,
//!   so force-recompute passes can re-derive in place.

use crate::model::artifact::{Affine, GradientTable, SpatialMapping};
use crate::model::config::PipelineConfig;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub type BackendResult<T> = Result<T, BackendError>;

/// Failure reported by a numerics collaborator routine.
#[derive(Debug)]
pub enum BackendError {
    /// Input file exists but the backend could not interpret it.
    UnreadableInput { path: PathBuf, message: String },
    /// The numerical routine itself failed.
    Computation(String),
    Io { path: PathBuf, source: std::io::Error },
}

impl Display for BackendError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnreadableInput { path, message } => {
                write!(f, "unreadable input `{}`: {message}", path.display())
            }
            Self::Computation(message) => write!(f, "backend computation failed: {message}"),
            Self::Io { path, source } => {
                write!(f, "backend i/o error at `{}`: {source}", path.display())
            }
        }
    }
}

impl Error for BackendError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// External neuroimaging numerics contract.
///
/// One method per derivation routine of the workflow. Implementations wrap a
/// real numerics library; tests substitute a recording fake. Methods taking
/// an output path must write the artifact there before returning `Ok`.
pub trait NeuroBackend: Sync {
    /// Converts a raw acquisition tree into the preprocessed layout and
    /// returns the preprocessed root.
    fn preprocess_raw(&self, raw_root: &Path) -> BackendResult<PathBuf>;

    /// Builds a gradient table from bval/bvec files and the b0 threshold.
    fn gradient_table(
        &self,
        bval_file: &Path,
        bvec_file: &Path,
        b0_threshold: f64,
    ) -> BackendResult<GradientTable>;

    /// Extracts the voxel-to-world affine of a volume file.
    fn volume_affine(&self, volume_file: &Path) -> BackendResult<Affine>;

    /// Computes a brain mask volume from the dwi series.
    fn brain_mask(&self, dwi_file: &Path, out_file: &Path) -> BackendResult<()>;

    /// Fits the diffusion tensor model inside the brain mask.
    fn fit_tensor(
        &self,
        dwi_file: &Path,
        gradient_table: &GradientTable,
        brain_mask_file: &Path,
        out_file: &Path,
    ) -> BackendResult<()>;

    /// Derives the fractional anisotropy map from tensor parameters.
    fn fa_from_params(&self, params_file: &Path, out_file: &Path) -> BackendResult<()>;

    /// Derives the mean diffusivity map from tensor parameters.
    fn md_from_params(&self, params_file: &Path, out_file: &Path) -> BackendResult<()>;

    /// Registers the subject anatomy to the atlas space.
    fn build_mapping(
        &self,
        anat_file: &Path,
        dwi_affine: &Affine,
        seg_file: &Path,
    ) -> BackendResult<SpatialMapping>;

    /// Tracks whole-brain streamlines seeded in white matter.
    fn track_streamlines(
        &self,
        params_file: &Path,
        seg_file: &Path,
        config: &PipelineConfig,
        out_file: &Path,
    ) -> BackendResult<()>;

    /// Segments whole-brain streamlines into named bundles.
    fn segment_bundles(
        &self,
        streamlines_file: &Path,
        mapping: &SpatialMapping,
        bundle_names: &[String],
        out_file: &Path,
    ) -> BackendResult<()>;

    /// Samples FA/MD along each bundle into a profiles table.
    fn tract_profiles(
        &self,
        bundles_file: &Path,
        fa_file: &Path,
        md_file: &Path,
        out_file: &Path,
    ) -> BackendResult<()>;
}
