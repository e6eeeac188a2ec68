//! Process-wide pipeline configuration.
//!
//! # Responsibility
//! - Carry the knobs every derivation stage reads.
//! - Provide defaults matching the standard tractometry workflow.
//!
//! # Invariants
//! - Constructed once before the pipeline runs and passed explicitly to
//!   every stage invocation.
//! - Only `force_recompute` may be toggled after construction.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Orientation distribution function model used for the diffusion fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OdfModel {
    /// Diffusion tensor imaging.
    Dti,
    /// Diffusion kurtosis imaging.
    Dki,
    /// Constrained spherical deconvolution.
    Csd,
}

/// Direction-getting strategy for fiber tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingDirections {
    Deterministic,
    Probabilistic,
}

/// Configuration read by every derivation stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub odf_model: OdfModel,
    pub tracking_directions: TrackingDirections,
    /// Gradient values at or below this threshold count as b0 volumes.
    pub b0_threshold: f64,
    /// Segmentation label codes treated as white matter seed region.
    pub white_matter_labels: BTreeSet<u32>,
    /// Bundles to segment, in reporting order.
    pub bundle_names: Vec<String>,
    /// When true, every stage recomputes and overwrites its output even if a
    /// prior file exists on disk.
    pub force_recompute: bool,
}

/// Canonical bundle names segmented by the default workflow.
pub const DEFAULT_BUNDLE_NAMES: [&str; 9] = [
    "ATR", "CGC", "CST", "HCC", "IFO", "ILF", "SLF", "ARC", "UNC",
];

/// Default white-matter segmentation labels: corpus callosum subdivisions
/// plus left/right cerebral white matter.
pub const DEFAULT_WHITE_MATTER_LABELS: [u32; 7] = [251, 252, 253, 254, 255, 41, 2];

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            odf_model: OdfModel::Dti,
            tracking_directions: TrackingDirections::Deterministic,
            b0_threshold: 0.0,
            white_matter_labels: DEFAULT_WHITE_MATTER_LABELS.into_iter().collect(),
            bundle_names: DEFAULT_BUNDLE_NAMES
                .into_iter()
                .map(str::to_string)
                .collect(),
            force_recompute: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{OdfModel, PipelineConfig, TrackingDirections};

    #[test]
    fn defaults_match_standard_workflow() {
        let config = PipelineConfig::default();
        assert_eq!(config.odf_model, OdfModel::Dti);
        assert_eq!(
            config.tracking_directions,
            TrackingDirections::Deterministic
        );
        assert_eq!(config.b0_threshold, 0.0);
        assert_eq!(config.white_matter_labels.len(), 7);
        for label in [251, 252, 253, 254, 255, 41, 2] {
            assert!(config.white_matter_labels.contains(&label));
        }
        assert_eq!(
            config.bundle_names,
            ["ATR", "CGC", "CST", "HCC", "IFO", "ILF", "SLF", "ARC", "UNC"]
        );
        assert!(!config.force_recompute);
    }

    #[test]
    fn config_serializes_with_stable_variant_names() {
        let config = PipelineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"dti\""));
        assert!(json.contains("\"deterministic\""));
    }
}
