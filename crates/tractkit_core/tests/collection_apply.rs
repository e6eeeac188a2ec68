mod common;

use common::{write_study, FakeBackend};
use std::fs;
use tractkit_core::{ArtifactKind, PipelineSpec, TractometryPipeline, COMBINED_PROFILES_FILE};

fn pipeline(
    root: &std::path::Path,
    subjects: &[&str],
) -> TractometryPipeline<FakeBackend> {
    write_study(root, subjects);
    TractometryPipeline::new(PipelineSpec::preprocessed(root), FakeBackend::new()).unwrap()
}

#[test]
fn partition_count_does_not_change_results() {
    let subjects = ["sub-01", "sub-02", "sub-03", "sub-04"];
    let mut baseline = None;

    for partitions in [1, 2, 4, 16] {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline(dir.path(), &subjects);
        let results = pipeline.ensure_partitioned(ArtifactKind::BrainMask, partitions);

        assert_eq!(results.len(), subjects.len());
        assert!(results.iter().all(Result::is_ok));
        assert_eq!(pipeline.backend().call_count("brain_mask"), subjects.len());

        // Compare the relative paths, which are independent of the temp dir.
        let mut relative: Vec<String> = results
            .iter()
            .map(|result| {
                let value = result.as_ref().unwrap();
                let path = value.as_path().unwrap();
                path.strip_prefix(dir.path())
                    .unwrap()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        relative.sort();
        match &baseline {
            None => baseline = Some(relative),
            Some(expected) => assert_eq!(&relative, expected),
        }
    }
}

#[test]
fn parallel_full_chain_derives_every_row() {
    let dir = tempfile::tempdir().unwrap();
    let subjects = ["sub-01", "sub-02", "sub-03"];
    let mut pipeline = pipeline(dir.path(), &subjects);

    let results = pipeline.ensure_partitioned(ArtifactKind::TractProfiles, subjects.len());
    assert!(results.iter().all(Result::is_ok));
    assert_eq!(
        pipeline.backend().call_count("tract_profiles"),
        subjects.len()
    );
    for row in pipeline.collection().rows() {
        assert!(row.artifacts.tract_profiles_file.as_deref().unwrap().is_file());
    }
}

#[test]
fn export_combines_profiles_under_one_header() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = pipeline(dir.path(), &["sub-01", "sub-02"]);

    let out = pipeline.export_profiles().unwrap();
    assert_eq!(out, dir.path().join(COMBINED_PROFILES_FILE));

    let text = fs::read_to_string(&out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "subject,bundle,node,fa,md");
    assert_eq!(lines.len(), 3);
    let headers = lines
        .iter()
        .filter(|line| line.starts_with("subject,"))
        .count();
    assert_eq!(headers, 1);
}

#[test]
fn export_fails_when_a_row_cannot_derive() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = pipeline(dir.path(), &["sub-01", "sub-02"]);
    fs::remove_file(dir.path().join("sub-02/sess-01/dwi/sub-02_dwi.bval")).unwrap();

    let err = pipeline.export_profiles().unwrap_err();
    assert!(matches!(
        err,
        tractkit_core::PipelineError::Stage(tractkit_core::StageError::MissingDependency {
            column: "bval_file",
            ..
        })
    ));
    assert!(!dir.path().join(COMBINED_PROFILES_FILE).exists());
}
