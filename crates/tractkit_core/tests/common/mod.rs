//! Shared test fixtures: a recording fake backend and study-tree builders.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tractkit_core::{
    Affine, BackendError, BackendResult, GradientTable, NeuroBackend, PipelineConfig,
    SpatialMapping,
};

/// Records every numerics invocation and writes marker files as outputs.
///
/// Marker content is a pure function of stage name and input paths, so
/// re-deriving with force recompute reproduces identical bytes.
#[derive(Debug)]
pub struct FakeBackend {
    calls: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, stage: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.as_str() == stage)
            .count()
    }

    fn record(&self, stage: &str) {
        self.calls.lock().unwrap().push(stage.to_string());
    }

    fn write_marker(inputs: &[&Path], stage: &str, out_file: &Path) -> BackendResult<()> {
        let mut content = format!("{stage}\n");
        for input in inputs {
            content.push_str(&format!("{}\n", input.display()));
        }
        fs::write(out_file, content).map_err(|source| BackendError::Io {
            path: out_file.to_path_buf(),
            source,
        })
    }
}

impl NeuroBackend for FakeBackend {
    fn preprocess_raw(&self, raw_root: &Path) -> BackendResult<PathBuf> {
        self.record("preprocess_raw");
        let preproc = raw_root.join("derivatives");
        fs::create_dir_all(&preproc).map_err(|source| BackendError::Io {
            path: preproc.clone(),
            source,
        })?;
        Ok(preproc)
    }

    fn gradient_table(
        &self,
        bval_file: &Path,
        bvec_file: &Path,
        b0_threshold: f64,
    ) -> BackendResult<GradientTable> {
        self.record("gradient_table");
        for input in [bval_file, bvec_file] {
            if !input.is_file() {
                return Err(BackendError::UnreadableInput {
                    path: input.to_path_buf(),
                    message: "file vanished before read".to_string(),
                });
            }
        }
        Ok(GradientTable {
            bvals: vec![0.0, 1000.0, 2000.0],
            bvecs: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            b0_threshold,
        })
    }

    fn volume_affine(&self, _volume_file: &Path) -> BackendResult<Affine> {
        self.record("dwi_affine");
        Ok(Affine::identity())
    }

    fn brain_mask(&self, dwi_file: &Path, out_file: &Path) -> BackendResult<()> {
        self.record("brain_mask");
        Self::write_marker(&[dwi_file], "brain_mask", out_file)
    }

    fn fit_tensor(
        &self,
        dwi_file: &Path,
        _gradient_table: &GradientTable,
        brain_mask_file: &Path,
        out_file: &Path,
    ) -> BackendResult<()> {
        self.record("tensor_fit");
        Self::write_marker(&[dwi_file, brain_mask_file], "tensor_fit", out_file)
    }

    fn fa_from_params(&self, params_file: &Path, out_file: &Path) -> BackendResult<()> {
        self.record("fa_map");
        Self::write_marker(&[params_file], "fa_map", out_file)
    }

    fn md_from_params(&self, params_file: &Path, out_file: &Path) -> BackendResult<()> {
        self.record("md_map");
        Self::write_marker(&[params_file], "md_map", out_file)
    }

    fn build_mapping(
        &self,
        anat_file: &Path,
        dwi_affine: &Affine,
        seg_file: &Path,
    ) -> BackendResult<SpatialMapping> {
        self.record("mapping");
        Ok(SpatialMapping {
            anat_file: anat_file.to_path_buf(),
            seg_file: seg_file.to_path_buf(),
            dwi_affine: *dwi_affine,
        })
    }

    fn track_streamlines(
        &self,
        params_file: &Path,
        seg_file: &Path,
        _config: &PipelineConfig,
        out_file: &Path,
    ) -> BackendResult<()> {
        self.record("streamlines");
        Self::write_marker(&[params_file, seg_file], "streamlines", out_file)
    }

    fn segment_bundles(
        &self,
        streamlines_file: &Path,
        _mapping: &SpatialMapping,
        _bundle_names: &[String],
        out_file: &Path,
    ) -> BackendResult<()> {
        self.record("bundles");
        Self::write_marker(&[streamlines_file], "bundles", out_file)
    }

    fn tract_profiles(
        &self,
        bundles_file: &Path,
        fa_file: &Path,
        md_file: &Path,
        out_file: &Path,
    ) -> BackendResult<()> {
        self.record("tract_profiles");
        let content = format!(
            "subject,bundle,node,fa,md\n{},CST,0,0.5,0.0007\n",
            bundles_file.display()
        );
        let _ = (fa_file, md_file);
        fs::write(out_file, content).map_err(|source| BackendError::Io {
            path: out_file.to_path_buf(),
            source,
        })
    }
}

/// Writes a preprocessed study tree with one session per subject.
pub fn write_study(root: &Path, subjects: &[&str]) {
    for subject in subjects {
        let dwi_dir = root.join(subject).join("sess-01").join("dwi");
        let anat_dir = root.join(subject).join("sess-01").join("anat");
        fs::create_dir_all(&dwi_dir).unwrap();
        fs::create_dir_all(&anat_dir).unwrap();
        fs::write(dwi_dir.join(format!("{subject}_dwi.nii.gz")), b"dwi").unwrap();
        fs::write(dwi_dir.join(format!("{subject}_dwi.bval")), b"0 1000 2000").unwrap();
        fs::write(dwi_dir.join(format!("{subject}_dwi.bvec")), b"0 1 0").unwrap();
        fs::write(anat_dir.join(format!("{subject}_T1w.nii.gz")), b"t1").unwrap();
        fs::write(
            anat_dir.join(format!("{subject}_aparc+aseg.nii.gz")),
            b"seg",
        )
        .unwrap();
    }
}

/// Index of the row holding `subject`, panicking when absent.
pub fn row_index(
    collection: &tractkit_core::TabularCollection,
    subject: &str,
) -> usize {
    collection
        .rows()
        .iter()
        .position(|row| row.unit.subject_id == subject)
        .unwrap_or_else(|| panic!("no row for {subject}"))
}
