//! Row-oriented collection of data units and derived columns.
//!
//! # Responsibility
//! - Hold one row per discovered data unit, in discovery order.
//! - Map a row-wise function over the collection with a per-row isolated
//!   error boundary, optionally across parallel partitions.
//!
//! # Invariants
//! - Row order never changes after construction.
//! - `apply` returns one result per row in row order; one row's failure
//!   never aborts another row.
//! - Partitioning does not change observable per-row results: rows are
//!   mutated only by the function applied to them.

use crate::model::artifact::ArtifactSet;
use crate::model::unit::DataUnit;
use crate::stage::StageError;
use std::thread;

/// One data unit plus its derived columns.
#[derive(Debug, Clone)]
pub struct PipelineRow {
    pub unit: DataUnit,
    pub artifacts: ArtifactSet,
}

impl PipelineRow {
    pub fn new(unit: DataUnit) -> Self {
        Self {
            unit,
            artifacts: ArtifactSet::default(),
        }
    }
}

/// Ordered set of pipeline rows.
#[derive(Debug, Default)]
pub struct TabularCollection {
    rows: Vec<PipelineRow>,
}

impl TabularCollection {
    /// Builds the collection from discovered units, preserving their order.
    pub fn from_units(units: Vec<DataUnit>) -> Self {
        Self {
            rows: units.into_iter().map(PipelineRow::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[PipelineRow] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [PipelineRow] {
        &mut self.rows
    }

    pub fn row(&self, index: usize) -> Option<&PipelineRow> {
        self.rows.get(index)
    }

    /// Applies `f` once per row, collecting one result per row in row order.
    ///
    /// `partitions` is the number of row groups executed on separate worker
    /// threads; `1` runs sequentially and values above the row count are
    /// clamped. Rows are per-row independent, so partitioning never changes
    /// results.
    pub fn apply<T, F>(&mut self, partitions: usize, f: F) -> Vec<Result<T, StageError>>
    where
        T: Send,
        F: Fn(&mut PipelineRow) -> Result<T, StageError> + Sync,
    {
        let row_count = self.rows.len();
        if row_count == 0 {
            return Vec::new();
        }

        let partitions = partitions.clamp(1, row_count);
        if partitions == 1 {
            return self.rows.iter_mut().map(&f).collect();
        }

        let chunk_size = row_count.div_ceil(partitions);
        let mut results = Vec::with_capacity(row_count);
        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(partitions);
            for chunk in self.rows.chunks_mut(chunk_size) {
                let f = &f;
                handles.push(scope.spawn(move || {
                    chunk.iter_mut().map(f).collect::<Vec<_>>()
                }));
            }
            for handle in handles {
                match handle.join() {
                    Ok(chunk_results) => results.extend(chunk_results),
                    // A panicking worker would leave rows unaccounted for;
                    // surface it instead of returning a short result vector.
                    Err(payload) => std::panic::resume_unwind(payload),
                }
            }
        });
        results
    }
}

#[cfg(test)]
mod tests {
    use super::{PipelineRow, TabularCollection};
    use crate::model::unit::DataUnit;
    use crate::stage::StageError;
    use std::path::PathBuf;

    fn unit(subject: &str) -> DataUnit {
        DataUnit {
            subject_id: subject.to_string(),
            session_id: "sess-01".to_string(),
            dwi_file: PathBuf::from(format!("/data/{subject}/sess-01/dwi/{subject}_dwi.nii.gz")),
            bval_file: PathBuf::from(format!("/data/{subject}/sess-01/dwi/{subject}_dwi.bval")),
            bvec_file: PathBuf::from(format!("/data/{subject}/sess-01/dwi/{subject}_dwi.bvec")),
            anat_file: PathBuf::from(format!("/data/{subject}/sess-01/anat/{subject}_T1w.nii.gz")),
            seg_file: PathBuf::from(format!(
                "/data/{subject}/sess-01/anat/{subject}_aparc+aseg.nii.gz"
            )),
        }
    }

    fn collection(count: usize) -> TabularCollection {
        TabularCollection::from_units(
            (0..count).map(|index| unit(&format!("sub-{index:02}"))).collect(),
        )
    }

    #[test]
    fn apply_preserves_row_order() {
        let mut collection = collection(5);
        for partitions in [1, 2, 5, 99] {
            let results = collection.apply(partitions, |row| Ok(row.unit.subject_id.clone()));
            let subjects: Vec<String> = results.into_iter().map(Result::unwrap).collect();
            assert_eq!(
                subjects,
                vec!["sub-00", "sub-01", "sub-02", "sub-03", "sub-04"]
            );
        }
    }

    #[test]
    fn one_row_failure_does_not_abort_the_rest() {
        let mut collection = collection(3);
        let results = collection.apply(3, |row| {
            if row.unit.subject_id == "sub-01" {
                Err(StageError::MissingDependency {
                    column: "bval_file",
                    path: row.unit.bval_file.clone(),
                })
            } else {
                Ok(())
            }
        });
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
    }

    #[test]
    fn apply_on_empty_collection_returns_nothing() {
        let mut collection = TabularCollection::default();
        let results = collection.apply(4, |_row: &mut PipelineRow| Ok(()));
        assert!(results.is_empty());
    }

    #[test]
    fn rows_keep_discovery_order() {
        let collection = collection(3);
        let subjects: Vec<&str> = collection
            .rows()
            .iter()
            .map(|row| row.unit.subject_id.as_str())
            .collect();
        assert_eq!(subjects, vec!["sub-00", "sub-01", "sub-02"]);
    }
}
