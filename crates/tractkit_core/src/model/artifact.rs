//! Derived-artifact columns and their dependency graph.
//!
//! # Responsibility
//! - Name every derived column a stage can produce for a row.
//! - Declare the fixed dependency DAG between columns.
//! - Hold per-row derived values as a struct of optionals.
//!
//! # Invariants
//! - Each column has exactly one producing stage.
//! - `dependencies()` is acyclic and never changes at runtime.
//! - A column holds either a fully valid value or `None`, never a partial
//!   result.

use crate::model::unit::DataUnit;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One derived column of the tabular collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    GradientTable,
    DwiAffine,
    BrainMask,
    TensorFit,
    FaMap,
    MdMap,
    Mapping,
    Streamlines,
    Bundles,
    TractProfiles,
}

impl ArtifactKind {
    /// All columns in a valid topological order of the dependency DAG.
    pub const ALL: [ArtifactKind; 10] = [
        ArtifactKind::GradientTable,
        ArtifactKind::DwiAffine,
        ArtifactKind::BrainMask,
        ArtifactKind::TensorFit,
        ArtifactKind::FaMap,
        ArtifactKind::MdMap,
        ArtifactKind::Mapping,
        ArtifactKind::Streamlines,
        ArtifactKind::Bundles,
        ArtifactKind::TractProfiles,
    ];

    /// Column name the value is stored under.
    pub fn column_name(self) -> &'static str {
        match self {
            Self::GradientTable => "gradient_table",
            Self::DwiAffine => "dwi_affine",
            Self::BrainMask => "brain_mask_file",
            Self::TensorFit => "dti_params_file",
            Self::FaMap => "dti_fa_file",
            Self::MdMap => "dti_md_file",
            Self::Mapping => "mapping",
            Self::Streamlines => "streamlines_file",
            Self::Bundles => "bundles_file",
            Self::TractProfiles => "tract_profiles_file",
        }
    }

    /// Output filename suffix for file-backed columns, `None` for columns
    /// held in memory.
    pub fn file_suffix(self) -> Option<&'static str> {
        match self {
            Self::GradientTable | Self::DwiAffine | Self::Mapping => None,
            Self::BrainMask => Some("_brain_mask.nii.gz"),
            Self::TensorFit => Some("_dti_params.nii.gz"),
            Self::FaMap => Some("_dti_fa.nii.gz"),
            Self::MdMap => Some("_dti_md.nii.gz"),
            Self::Streamlines => Some("_streamlines.trk"),
            Self::Bundles => Some("_bundles.trk"),
            Self::TractProfiles => Some("_tract_profiles.csv"),
        }
    }

    /// Direct upstream columns this column's stage resolves first.
    ///
    /// Raw input roles and configuration are not listed here; only derived
    /// columns participate in the recursive ensure chain.
    pub fn dependencies(self) -> &'static [ArtifactKind] {
        match self {
            Self::GradientTable | Self::DwiAffine | Self::BrainMask => &[],
            Self::TensorFit => &[Self::GradientTable, Self::BrainMask],
            Self::FaMap | Self::MdMap => &[Self::TensorFit],
            Self::Mapping => &[Self::DwiAffine],
            Self::Streamlines => &[Self::TensorFit],
            Self::Bundles => &[Self::Streamlines, Self::Mapping],
            Self::TractProfiles => &[Self::Bundles, Self::FaMap, Self::MdMap],
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column_name())
    }
}

/// Diffusion gradient table reconstructed from bval/bvec files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientTable {
    pub bvals: Vec<f64>,
    pub bvecs: Vec<[f64; 3]>,
    /// Threshold the table was built with; values at or below it are b0.
    pub b0_threshold: f64,
}

impl GradientTable {
    /// Number of b0 volumes under the construction threshold.
    pub fn b0_count(&self) -> usize {
        self.bvals
            .iter()
            .filter(|bval| **bval <= self.b0_threshold)
            .count()
    }
}

/// 4x4 voxel-to-world affine of a volume.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Affine {
    pub matrix: [[f64; 4]; 4],
}

impl Affine {
    pub fn identity() -> Self {
        let mut matrix = [[0.0; 4]; 4];
        for (index, row) in matrix.iter_mut().enumerate() {
            row[index] = 1.0;
        }
        Self { matrix }
    }
}

impl Default for Affine {
    fn default() -> Self {
        Self::identity()
    }
}

/// Subject-to-atlas spatial mapping.
///
/// Deterministically reconstructable from its recorded inputs, so it is kept
/// in memory rather than serialized to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialMapping {
    pub anat_file: PathBuf,
    pub seg_file: PathBuf,
    pub dwi_affine: Affine,
}

/// Value of a resolved derived column.
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactValue {
    File(PathBuf),
    GradientTable(GradientTable),
    Affine(Affine),
    Mapping(SpatialMapping),
}

impl ArtifactValue {
    /// Returns the backing file path for file-backed values.
    pub fn as_path(&self) -> Option<&std::path::Path> {
        match self {
            Self::File(path) => Some(path),
            _ => None,
        }
    }
}

/// Per-row derived columns; one optional slot per [`ArtifactKind`].
///
/// File-backed slots hold the materialized artifact path. `None` means "not
/// yet computed"; the ensure chain fills slots in dependency order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArtifactSet {
    pub gradient_table: Option<GradientTable>,
    pub dwi_affine: Option<Affine>,
    pub brain_mask_file: Option<PathBuf>,
    pub dti_params_file: Option<PathBuf>,
    pub dti_fa_file: Option<PathBuf>,
    pub dti_md_file: Option<PathBuf>,
    pub mapping: Option<SpatialMapping>,
    pub streamlines_file: Option<PathBuf>,
    pub bundles_file: Option<PathBuf>,
    pub tract_profiles_file: Option<PathBuf>,
}

impl ArtifactSet {
    /// Returns the current value of one column without computing anything.
    pub fn value(&self, kind: ArtifactKind) -> Option<ArtifactValue> {
        match kind {
            ArtifactKind::GradientTable => self
                .gradient_table
                .clone()
                .map(ArtifactValue::GradientTable),
            ArtifactKind::DwiAffine => self.dwi_affine.map(ArtifactValue::Affine),
            ArtifactKind::BrainMask => self.brain_mask_file.clone().map(ArtifactValue::File),
            ArtifactKind::TensorFit => self.dti_params_file.clone().map(ArtifactValue::File),
            ArtifactKind::FaMap => self.dti_fa_file.clone().map(ArtifactValue::File),
            ArtifactKind::MdMap => self.dti_md_file.clone().map(ArtifactValue::File),
            ArtifactKind::Mapping => self.mapping.clone().map(ArtifactValue::Mapping),
            ArtifactKind::Streamlines => self.streamlines_file.clone().map(ArtifactValue::File),
            ArtifactKind::Bundles => self.bundles_file.clone().map(ArtifactValue::File),
            ArtifactKind::TractProfiles => {
                self.tract_profiles_file.clone().map(ArtifactValue::File)
            }
        }
    }
}

/// Deterministic output path for a file-backed column of one unit.
pub fn output_path(unit: &DataUnit, kind: ArtifactKind) -> Option<PathBuf> {
    kind.file_suffix().map(|suffix| unit.derived_path(suffix))
}

#[cfg(test)]
mod tests {
    use super::{ArtifactKind, ArtifactSet, GradientTable};

    #[test]
    fn all_is_topologically_ordered() {
        for (index, kind) in ArtifactKind::ALL.into_iter().enumerate() {
            for dep in kind.dependencies() {
                let dep_index = ArtifactKind::ALL
                    .into_iter()
                    .position(|candidate| candidate == *dep)
                    .unwrap();
                assert!(
                    dep_index < index,
                    "{dep} must precede {kind} in ArtifactKind::ALL"
                );
            }
        }
    }

    #[test]
    fn in_memory_columns_have_no_file_suffix() {
        for kind in [
            ArtifactKind::GradientTable,
            ArtifactKind::DwiAffine,
            ArtifactKind::Mapping,
        ] {
            assert!(kind.file_suffix().is_none());
        }
        assert_eq!(
            ArtifactKind::BrainMask.file_suffix(),
            Some("_brain_mask.nii.gz")
        );
    }

    #[test]
    fn empty_set_has_no_values() {
        let set = ArtifactSet::default();
        for kind in ArtifactKind::ALL {
            assert!(set.value(kind).is_none());
        }
    }

    #[test]
    fn b0_count_respects_threshold() {
        let table = GradientTable {
            bvals: vec![0.0, 10.0, 1000.0, 2000.0],
            bvecs: vec![[0.0; 3]; 4],
            b0_threshold: 50.0,
        };
        assert_eq!(table.b0_count(), 2);
    }
}
