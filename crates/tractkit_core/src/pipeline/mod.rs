//! Pipeline assembly and collection-wide ensure entry points.
//!
//! # Responsibility
//! - Construct the pipeline from study roots, patterns and configuration.
//! - Expose per-column ensure methods that fan out over rows.
//!
//! # Invariants
//! - Construction fails fast when neither a raw nor a preprocessed root is
//!   supplied.
//! - Collection-wide ensures return one result per row; a failing row never
//!   aborts the others.

use crate::backend::{BackendError, NeuroBackend};
use crate::discover::{DataUnitIndex, DiscoveryError, RolePatterns};
use crate::model::artifact::{
    Affine, ArtifactKind, ArtifactValue, GradientTable, SpatialMapping,
};
use crate::model::config::PipelineConfig;
use crate::stage::{StageError, StageRunner};
use crate::table::TabularCollection;
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

/// Combined per-subject profiles file written at the study root.
pub const COMBINED_PROFILES_FILE: &str = "tract_profiles.csv";

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Pipeline-level failure.
#[derive(Debug)]
pub enum PipelineError {
    /// Neither a raw nor a preprocessed study root was supplied.
    MissingConfig,
    Discovery(DiscoveryError),
    /// Preprocessing collaborator failed on the raw root.
    Backend(BackendError),
    /// A row's derivation failed while a whole-collection result was
    /// required.
    Stage(StageError),
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl Display for PipelineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingConfig => {
                write!(f, "neither raw nor preprocessed study root was supplied")
            }
            Self::Discovery(err) => write!(f, "{err}"),
            Self::Backend(err) => write!(f, "{err}"),
            Self::Stage(err) => write!(f, "{err}"),
            Self::Io { path, source } => {
                write!(f, "pipeline i/o error at `{}`: {source}", path.display())
            }
        }
    }
}

impl Error for PipelineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::MissingConfig => None,
            Self::Discovery(err) => Some(err),
            Self::Backend(err) => Some(err),
            Self::Stage(err) => Some(err),
            Self::Io { source, .. } => Some(source),
        }
    }
}

impl From<DiscoveryError> for PipelineError {
    fn from(value: DiscoveryError) -> Self {
        Self::Discovery(value)
    }
}

impl From<StageError> for PipelineError {
    fn from(value: StageError) -> Self {
        Self::Stage(value)
    }
}

/// Construction parameters for [`TractometryPipeline`].
#[derive(Debug, Clone, Default)]
pub struct PipelineSpec {
    /// Raw acquisition root; preprocessed by the backend when no
    /// preprocessed root is given.
    pub raw_root: Option<PathBuf>,
    /// Preprocessed study root, used directly when present.
    pub preproc_root: Option<PathBuf>,
    pub patterns: RolePatterns,
    pub config: PipelineConfig,
}

impl PipelineSpec {
    pub fn preprocessed(root: impl Into<PathBuf>) -> Self {
        Self {
            preproc_root: Some(root.into()),
            ..Self::default()
        }
    }

    pub fn raw(root: impl Into<PathBuf>) -> Self {
        Self {
            raw_root: Some(root.into()),
            ..Self::default()
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_patterns(mut self, patterns: RolePatterns) -> Self {
        self.patterns = patterns;
        self
    }
}

/// The tractometry workflow over one study: discovery plus lazily derived
/// columns per subject/session row.
#[derive(Debug)]
pub struct TractometryPipeline<B: NeuroBackend> {
    backend: B,
    config: PipelineConfig,
    preproc_root: PathBuf,
    collection: TabularCollection,
}

impl<B: NeuroBackend> TractometryPipeline<B> {
    /// Builds the pipeline: preprocesses the raw root if needed, then
    /// discovers all data units.
    ///
    /// # Errors
    /// - `MissingConfig` when the spec carries neither root.
    /// - `Backend` when preprocessing the raw root fails.
    /// - `Discovery` when a unit's roles do not resolve.
    pub fn new(spec: PipelineSpec, backend: B) -> PipelineResult<Self> {
        let preproc_root = match (spec.preproc_root, spec.raw_root) {
            (Some(preproc), _) => preproc,
            (None, Some(raw)) => backend.preprocess_raw(&raw).map_err(PipelineError::Backend)?,
            (None, None) => return Err(PipelineError::MissingConfig),
        };

        let units = DataUnitIndex::new(preproc_root.clone(), spec.patterns).discover()?;
        info!(
            "event=pipeline_init module=pipeline status=ok root={} units={}",
            preproc_root.display(),
            units.len()
        );
        Ok(Self {
            backend,
            config: spec.config,
            preproc_root,
            collection: TabularCollection::from_units(units),
        })
    }

    pub fn preproc_root(&self) -> &Path {
        &self.preproc_root
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Toggles the only configuration bit that may change after
    /// construction.
    pub fn set_force_recompute(&mut self, force: bool) {
        self.config.force_recompute = force;
    }

    pub fn collection(&self) -> &TabularCollection {
        &self.collection
    }

    /// Ensures one column for every row, one partition per row.
    pub fn ensure(&mut self, kind: ArtifactKind) -> Vec<Result<ArtifactValue, StageError>> {
        let partitions = self.collection.len();
        self.ensure_partitioned(kind, partitions)
    }

    /// Ensures one column for every row across an explicit number of
    /// partitions.
    pub fn ensure_partitioned(
        &mut self,
        kind: ArtifactKind,
        partitions: usize,
    ) -> Vec<Result<ArtifactValue, StageError>> {
        let Self {
            backend,
            config,
            collection,
            ..
        } = self;
        let runner = StageRunner::new(&*backend, config);
        collection.apply(partitions, |row| runner.ensure(kind, row))
    }

    pub fn ensure_gradient_tables(&mut self) -> Vec<Result<GradientTable, StageError>> {
        let Self {
            backend,
            config,
            collection,
            ..
        } = self;
        let partitions = collection.len();
        let runner = StageRunner::new(&*backend, &*config);
        collection.apply(partitions, |row| runner.ensure_gradient_table(row))
    }

    pub fn ensure_dwi_affines(&mut self) -> Vec<Result<Affine, StageError>> {
        let Self {
            backend,
            config,
            collection,
            ..
        } = self;
        let partitions = collection.len();
        let runner = StageRunner::new(&*backend, &*config);
        collection.apply(partitions, |row| runner.ensure_dwi_affine(row))
    }

    pub fn ensure_brain_masks(&mut self) -> Vec<Result<PathBuf, StageError>> {
        let Self {
            backend,
            config,
            collection,
            ..
        } = self;
        let partitions = collection.len();
        let runner = StageRunner::new(&*backend, &*config);
        collection.apply(partitions, |row| runner.ensure_brain_mask(row))
    }

    pub fn ensure_tensor_fits(&mut self) -> Vec<Result<PathBuf, StageError>> {
        let Self {
            backend,
            config,
            collection,
            ..
        } = self;
        let partitions = collection.len();
        let runner = StageRunner::new(&*backend, &*config);
        collection.apply(partitions, |row| runner.ensure_tensor_fit(row))
    }

    pub fn ensure_fa_maps(&mut self) -> Vec<Result<PathBuf, StageError>> {
        let Self {
            backend,
            config,
            collection,
            ..
        } = self;
        let partitions = collection.len();
        let runner = StageRunner::new(&*backend, &*config);
        collection.apply(partitions, |row| runner.ensure_fa_map(row))
    }

    pub fn ensure_md_maps(&mut self) -> Vec<Result<PathBuf, StageError>> {
        let Self {
            backend,
            config,
            collection,
            ..
        } = self;
        let partitions = collection.len();
        let runner = StageRunner::new(&*backend, &*config);
        collection.apply(partitions, |row| runner.ensure_md_map(row))
    }

    pub fn ensure_mappings(&mut self) -> Vec<Result<SpatialMapping, StageError>> {
        let Self {
            backend,
            config,
            collection,
            ..
        } = self;
        let partitions = collection.len();
        let runner = StageRunner::new(&*backend, &*config);
        collection.apply(partitions, |row| runner.ensure_mapping(row))
    }

    pub fn ensure_streamlines(&mut self) -> Vec<Result<PathBuf, StageError>> {
        let Self {
            backend,
            config,
            collection,
            ..
        } = self;
        let partitions = collection.len();
        let runner = StageRunner::new(&*backend, &*config);
        collection.apply(partitions, |row| runner.ensure_streamlines(row))
    }

    pub fn ensure_bundles(&mut self) -> Vec<Result<PathBuf, StageError>> {
        let Self {
            backend,
            config,
            collection,
            ..
        } = self;
        let partitions = collection.len();
        let runner = StageRunner::new(&*backend, &*config);
        collection.apply(partitions, |row| runner.ensure_bundles(row))
    }

    pub fn ensure_tract_profiles(&mut self) -> Vec<Result<PathBuf, StageError>> {
        let Self {
            backend,
            config,
            collection,
            ..
        } = self;
        let partitions = collection.len();
        let runner = StageRunner::new(&*backend, &*config);
        collection.apply(partitions, |row| runner.ensure_tract_profiles(row))
    }

    /// Derives profiles for every row and concatenates them into one CSV at
    /// the study root.
    ///
    /// The first row's header line is kept; subsequent headers are dropped.
    /// Any row failure aborts the export with that row's error.
    pub fn export_profiles(&mut self) -> PipelineResult<PathBuf> {
        let results = self.ensure_tract_profiles();
        let mut profile_files = Vec::with_capacity(results.len());
        for result in results {
            profile_files.push(result?);
        }

        let out_path = self.preproc_root.join(COMBINED_PROFILES_FILE);
        let mut combined = String::new();
        for (index, file) in profile_files.iter().enumerate() {
            let text = fs::read_to_string(file).map_err(|source| PipelineError::Io {
                path: file.clone(),
                source,
            })?;
            let mut lines = text.lines();
            if index > 0 {
                lines.next();
            }
            for line in lines {
                combined.push_str(line);
                combined.push('\n');
            }
        }
        fs::write(&out_path, combined).map_err(|source| PipelineError::Io {
            path: out_path.clone(),
            source,
        })?;
        info!(
            "event=profiles_export module=pipeline status=ok rows={} out={}",
            profile_files.len(),
            out_path.display()
        );
        Ok(out_path)
    }
}
