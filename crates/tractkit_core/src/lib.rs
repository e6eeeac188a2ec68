//! Core orchestration for the tractkit tractometry workflow.
//!
//! Discovers per-subject diffusion MRI inputs, then lazily derives and
//! caches the chain of tractometry artifacts per row: brain mask, tensor
//! fit, FA/MD maps, atlas mapping, streamlines, bundles, tract profiles.
//! Numerical routines live behind the [`backend::NeuroBackend`] seam.

pub mod backend;
pub mod discover;
pub mod fetch;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod stage;
pub mod table;

pub use backend::{BackendError, BackendResult, NeuroBackend};
pub use discover::{DataUnitIndex, DiscoveryError, DiscoveryResult, RolePatterns};
pub use fetch::{
    fetch_study, read_dataset_description, write_dataset_description, DatasetDescription,
    FetchError, FetchResult, RemoteFetcher, DATASET_DESCRIPTION_FILE,
};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::artifact::{
    output_path, Affine, ArtifactKind, ArtifactSet, ArtifactValue, GradientTable, SpatialMapping,
};
pub use model::config::{
    OdfModel, PipelineConfig, TrackingDirections, DEFAULT_BUNDLE_NAMES,
    DEFAULT_WHITE_MATTER_LABELS,
};
pub use model::unit::{DataUnit, Role};
pub use pipeline::{
    PipelineError, PipelineResult, PipelineSpec, TractometryPipeline, COMBINED_PROFILES_FILE,
};
pub use stage::{StageError, StageResult, StageRunner};
pub use table::{PipelineRow, TabularCollection};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
