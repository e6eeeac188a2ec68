//! Per-row stage execution in dependency order.
//!
//! # Responsibility
//! - Provide one explicit `ensure_*` entry point per derived column.
//! - Resolve declared dependencies recursively before invoking the backend.
//!
//! # Invariants
//! - Computation never hides behind a plain read; callers always go through
//!   an `ensure_*` method and get a `Result`.
//! - The cache is consulted before raw inputs are validated or dependencies
//!   resolved; a hit returns the stored value even when raw inputs have
//!   since disappeared.
//! - Configuration is passed explicitly into every backend invocation.
//! - Each method touches only the row it was given.

use super::{
    cached_file, ensure_file_column, ensure_object_column, require_input, StageError, StageResult,
};
use crate::backend::{BackendError, NeuroBackend};
use crate::model::artifact::{
    output_path, Affine, ArtifactKind, ArtifactValue, GradientTable, SpatialMapping,
};
use crate::model::config::PipelineConfig;
use crate::model::unit::DataUnit;
use crate::table::PipelineRow;
use log::info;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Runs derivation stages for individual rows against one backend and one
/// configuration.
pub struct StageRunner<'a, B: NeuroBackend> {
    backend: &'a B,
    config: &'a PipelineConfig,
}

impl<'a, B: NeuroBackend> StageRunner<'a, B> {
    pub fn new(backend: &'a B, config: &'a PipelineConfig) -> Self {
        Self { backend, config }
    }

    /// Ensures one column by kind, resolving its dependency chain.
    pub fn ensure(&self, kind: ArtifactKind, row: &mut PipelineRow) -> StageResult<ArtifactValue> {
        match kind {
            ArtifactKind::GradientTable => self
                .ensure_gradient_table(row)
                .map(ArtifactValue::GradientTable),
            ArtifactKind::DwiAffine => self.ensure_dwi_affine(row).map(ArtifactValue::Affine),
            ArtifactKind::BrainMask => self.ensure_brain_mask(row).map(ArtifactValue::File),
            ArtifactKind::TensorFit => self.ensure_tensor_fit(row).map(ArtifactValue::File),
            ArtifactKind::FaMap => self.ensure_fa_map(row).map(ArtifactValue::File),
            ArtifactKind::MdMap => self.ensure_md_map(row).map(ArtifactValue::File),
            ArtifactKind::Mapping => self.ensure_mapping(row).map(ArtifactValue::Mapping),
            ArtifactKind::Streamlines => self.ensure_streamlines(row).map(ArtifactValue::File),
            ArtifactKind::Bundles => self.ensure_bundles(row).map(ArtifactValue::File),
            ArtifactKind::TractProfiles => {
                self.ensure_tract_profiles(row).map(ArtifactValue::File)
            }
        }
    }

    /// Gradient table from bval/bvec files and the b0 threshold.
    pub fn ensure_gradient_table(&self, row: &mut PipelineRow) -> StageResult<GradientTable> {
        let PipelineRow { unit, artifacts } = row;
        if !self.config.force_recompute {
            if let Some(table) = &artifacts.gradient_table {
                return Ok(table.clone());
            }
        }
        let bval = require_input(&unit.bval_file, "bval_file")?;
        let bvec = require_input(&unit.bvec_file, "bvec_file")?;
        let backend = self.backend;
        let threshold = self.config.b0_threshold;
        let unit_ref: &DataUnit = unit;
        ensure_object_column(
            &mut artifacts.gradient_table,
            self.config.force_recompute,
            || {
                let started_at = Instant::now();
                let table = backend.gradient_table(bval, bvec, threshold).map_err(
                    |source| backend_failure(
                        ArtifactKind::GradientTable,
                        &[("bval_file", bval), ("bvec_file", bvec)],
                        source,
                    ),
                )?;
                log_stage_ok(ArtifactKind::GradientTable, unit_ref, started_at);
                Ok(table)
            },
        )
    }

    /// Voxel-to-world affine of the dwi volume.
    pub fn ensure_dwi_affine(&self, row: &mut PipelineRow) -> StageResult<Affine> {
        let PipelineRow { unit, artifacts } = row;
        if !self.config.force_recompute {
            if let Some(affine) = artifacts.dwi_affine {
                return Ok(affine);
            }
        }
        let dwi = require_input(&unit.dwi_file, "dwi_file")?;
        let backend = self.backend;
        let unit_ref: &DataUnit = unit;
        ensure_object_column(
            &mut artifacts.dwi_affine,
            self.config.force_recompute,
            || {
                let started_at = Instant::now();
                let affine = backend.volume_affine(dwi).map_err(|source| {
                    backend_failure(ArtifactKind::DwiAffine, &[("dwi_file", dwi)], source)
                })?;
                log_stage_ok(ArtifactKind::DwiAffine, unit_ref, started_at);
                Ok(affine)
            },
        )
    }

    /// Brain mask volume next to the dwi file.
    pub fn ensure_brain_mask(&self, row: &mut PipelineRow) -> StageResult<PathBuf> {
        let out = stage_out_path(&row.unit, ArtifactKind::BrainMask);
        let PipelineRow { unit, artifacts } = row;
        if !self.config.force_recompute {
            if let Some(path) = cached_file(&mut artifacts.brain_mask_file, &out) {
                return Ok(path);
            }
        }
        let dwi = require_input(&unit.dwi_file, "dwi_file")?;
        let backend = self.backend;
        let unit_ref: &DataUnit = unit;
        ensure_file_column(
            &mut artifacts.brain_mask_file,
            self.config.force_recompute,
            out,
            |out_file| {
                let started_at = Instant::now();
                backend.brain_mask(dwi, out_file).map_err(|source| {
                    backend_failure(ArtifactKind::BrainMask, &[("dwi_file", dwi)], source)
                })?;
                log_stage_ok(ArtifactKind::BrainMask, unit_ref, started_at);
                Ok(())
            },
        )
    }

    /// Diffusion tensor fit; resolves gradient table and brain mask first.
    pub fn ensure_tensor_fit(&self, row: &mut PipelineRow) -> StageResult<PathBuf> {
        let out = stage_out_path(&row.unit, ArtifactKind::TensorFit);
        if !self.config.force_recompute {
            if let Some(path) = cached_file(&mut row.artifacts.dti_params_file, &out) {
                return Ok(path);
            }
        }
        let gradient_table = self.ensure_gradient_table(row)?;
        let mask = self.ensure_brain_mask(row)?;
        let PipelineRow { unit, artifacts } = row;
        let dwi = require_input(&unit.dwi_file, "dwi_file")?;
        let mask = require_input(&mask, "brain_mask_file")?;
        let backend = self.backend;
        let unit_ref: &DataUnit = unit;
        ensure_file_column(
            &mut artifacts.dti_params_file,
            self.config.force_recompute,
            out,
            |out_file| {
                let started_at = Instant::now();
                backend
                    .fit_tensor(dwi, &gradient_table, mask, out_file)
                    .map_err(|source| {
                        backend_failure(
                            ArtifactKind::TensorFit,
                            &[("dwi_file", dwi), ("brain_mask_file", mask)],
                            source,
                        )
                    })?;
                log_stage_ok(ArtifactKind::TensorFit, unit_ref, started_at);
                Ok(())
            },
        )
    }

    /// Fractional anisotropy map from the tensor fit.
    pub fn ensure_fa_map(&self, row: &mut PipelineRow) -> StageResult<PathBuf> {
        let out = stage_out_path(&row.unit, ArtifactKind::FaMap);
        if !self.config.force_recompute {
            if let Some(path) = cached_file(&mut row.artifacts.dti_fa_file, &out) {
                return Ok(path);
            }
        }
        let params = self.ensure_tensor_fit(row)?;
        let PipelineRow { unit, artifacts } = row;
        let params = require_input(&params, "dti_params_file")?;
        let backend = self.backend;
        let unit_ref: &DataUnit = unit;
        ensure_file_column(
            &mut artifacts.dti_fa_file,
            self.config.force_recompute,
            out,
            |out_file| {
                let started_at = Instant::now();
                backend.fa_from_params(params, out_file).map_err(|source| {
                    backend_failure(
                        ArtifactKind::FaMap,
                        &[("dti_params_file", params)],
                        source,
                    )
                })?;
                log_stage_ok(ArtifactKind::FaMap, unit_ref, started_at);
                Ok(())
            },
        )
    }

    /// Mean diffusivity map from the tensor fit.
    pub fn ensure_md_map(&self, row: &mut PipelineRow) -> StageResult<PathBuf> {
        let out = stage_out_path(&row.unit, ArtifactKind::MdMap);
        if !self.config.force_recompute {
            if let Some(path) = cached_file(&mut row.artifacts.dti_md_file, &out) {
                return Ok(path);
            }
        }
        let params = self.ensure_tensor_fit(row)?;
        let PipelineRow { unit, artifacts } = row;
        let params = require_input(&params, "dti_params_file")?;
        let backend = self.backend;
        let unit_ref: &DataUnit = unit;
        ensure_file_column(
            &mut artifacts.dti_md_file,
            self.config.force_recompute,
            out,
            |out_file| {
                let started_at = Instant::now();
                backend.md_from_params(params, out_file).map_err(|source| {
                    backend_failure(
                        ArtifactKind::MdMap,
                        &[("dti_params_file", params)],
                        source,
                    )
                })?;
                log_stage_ok(ArtifactKind::MdMap, unit_ref, started_at);
                Ok(())
            },
        )
    }

    /// Subject-to-atlas mapping; resolves the dwi affine first.
    pub fn ensure_mapping(&self, row: &mut PipelineRow) -> StageResult<SpatialMapping> {
        if !self.config.force_recompute {
            if let Some(mapping) = &row.artifacts.mapping {
                return Ok(mapping.clone());
            }
        }
        let affine = self.ensure_dwi_affine(row)?;
        let PipelineRow { unit, artifacts } = row;
        let anat = require_input(&unit.anat_file, "anat_file")?;
        let seg = require_input(&unit.seg_file, "seg_file")?;
        let backend = self.backend;
        let unit_ref: &DataUnit = unit;
        ensure_object_column(
            &mut artifacts.mapping,
            self.config.force_recompute,
            || {
                let started_at = Instant::now();
                let mapping = backend.build_mapping(anat, &affine, seg).map_err(|source| {
                    backend_failure(
                        ArtifactKind::Mapping,
                        &[("anat_file", anat), ("seg_file", seg)],
                        source,
                    )
                })?;
                log_stage_ok(ArtifactKind::Mapping, unit_ref, started_at);
                Ok(mapping)
            },
        )
    }

    /// Whole-brain streamlines seeded in white matter.
    pub fn ensure_streamlines(&self, row: &mut PipelineRow) -> StageResult<PathBuf> {
        let out = stage_out_path(&row.unit, ArtifactKind::Streamlines);
        if !self.config.force_recompute {
            if let Some(path) = cached_file(&mut row.artifacts.streamlines_file, &out) {
                return Ok(path);
            }
        }
        let params = self.ensure_tensor_fit(row)?;
        let PipelineRow { unit, artifacts } = row;
        let params = require_input(&params, "dti_params_file")?;
        let seg = require_input(&unit.seg_file, "seg_file")?;
        let backend = self.backend;
        let config = self.config;
        let unit_ref: &DataUnit = unit;
        ensure_file_column(
            &mut artifacts.streamlines_file,
            self.config.force_recompute,
            out,
            |out_file| {
                let started_at = Instant::now();
                backend
                    .track_streamlines(params, seg, config, out_file)
                    .map_err(|source| {
                        backend_failure(
                            ArtifactKind::Streamlines,
                            &[("dti_params_file", params), ("seg_file", seg)],
                            source,
                        )
                    })?;
                log_stage_ok(ArtifactKind::Streamlines, unit_ref, started_at);
                Ok(())
            },
        )
    }

    /// Anatomically segmented bundles from whole-brain streamlines.
    pub fn ensure_bundles(&self, row: &mut PipelineRow) -> StageResult<PathBuf> {
        let out = stage_out_path(&row.unit, ArtifactKind::Bundles);
        if !self.config.force_recompute {
            if let Some(path) = cached_file(&mut row.artifacts.bundles_file, &out) {
                return Ok(path);
            }
        }
        let streamlines = self.ensure_streamlines(row)?;
        let mapping = self.ensure_mapping(row)?;
        let PipelineRow { unit, artifacts } = row;
        let streamlines = require_input(&streamlines, "streamlines_file")?;
        let backend = self.backend;
        let bundle_names = self.config.bundle_names.as_slice();
        let unit_ref: &DataUnit = unit;
        ensure_file_column(
            &mut artifacts.bundles_file,
            self.config.force_recompute,
            out,
            |out_file| {
                let started_at = Instant::now();
                backend
                    .segment_bundles(streamlines, &mapping, bundle_names, out_file)
                    .map_err(|source| {
                        backend_failure(
                            ArtifactKind::Bundles,
                            &[("streamlines_file", streamlines)],
                            source,
                        )
                    })?;
                log_stage_ok(ArtifactKind::Bundles, unit_ref, started_at);
                Ok(())
            },
        )
    }

    /// Along-tract FA/MD profiles per bundle.
    pub fn ensure_tract_profiles(&self, row: &mut PipelineRow) -> StageResult<PathBuf> {
        let out = stage_out_path(&row.unit, ArtifactKind::TractProfiles);
        if !self.config.force_recompute {
            if let Some(path) = cached_file(&mut row.artifacts.tract_profiles_file, &out) {
                return Ok(path);
            }
        }
        let bundles = self.ensure_bundles(row)?;
        let fa = self.ensure_fa_map(row)?;
        let md = self.ensure_md_map(row)?;
        let PipelineRow { unit, artifacts } = row;
        let bundles = require_input(&bundles, "bundles_file")?;
        let fa = require_input(&fa, "dti_fa_file")?;
        let md = require_input(&md, "dti_md_file")?;
        let backend = self.backend;
        let unit_ref: &DataUnit = unit;
        ensure_file_column(
            &mut artifacts.tract_profiles_file,
            self.config.force_recompute,
            out,
            |out_file| {
                let started_at = Instant::now();
                backend
                    .tract_profiles(bundles, fa, md, out_file)
                    .map_err(|source| {
                        backend_failure(
                            ArtifactKind::TractProfiles,
                            &[
                                ("bundles_file", bundles),
                                ("dti_fa_file", fa),
                                ("dti_md_file", md),
                            ],
                            source,
                        )
                    })?;
                log_stage_ok(ArtifactKind::TractProfiles, unit_ref, started_at);
                Ok(())
            },
        )
    }
}

/// Deterministic output path for a file-backed stage.
fn stage_out_path(unit: &DataUnit, kind: ArtifactKind) -> PathBuf {
    match output_path(unit, kind) {
        Some(path) => path,
        // In-memory kinds never reach the file policy; keep a deterministic
        // fallback rather than panicking.
        None => unit.derived_path(kind.column_name()),
    }
}

/// Maps a backend failure onto the stage error taxonomy.
///
/// An unreadable input reported by the backend for one of the stage's known
/// input files becomes a `MissingDependency` naming that column.
fn backend_failure(
    stage: ArtifactKind,
    inputs: &[(&'static str, &Path)],
    source: BackendError,
) -> StageError {
    if let BackendError::UnreadableInput { path, .. } = &source {
        if let Some((column, _)) = inputs
            .iter()
            .copied()
            .find(|(_, input)| *input == path.as_path())
        {
            return StageError::MissingDependency {
                column,
                path: path.clone(),
            };
        }
    }
    StageError::Backend { stage, source }
}

fn log_stage_ok(stage: ArtifactKind, unit: &DataUnit, started_at: Instant) {
    info!(
        "event=stage_run module=stage stage={} subject={} session={} status=ok duration_ms={}",
        stage,
        unit.subject_id,
        unit.session_id,
        started_at.elapsed().as_millis()
    );
}
