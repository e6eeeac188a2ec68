//! Remote study fetch contract and dataset manifest.
//!
//! # Responsibility
//! - Define the downloader seam for pulling raw study data from a remote
//!   object store.
//! - Read and write the `dataset_description.json` manifest.
//!
//! # Invariants
//! - Fetching is idempotent: files already present locally are skipped by
//!   conforming implementations.
//! - Credential failures are fatal; no partial-download cleanup is implied.

use log::info;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Manifest filename written at the study root after a fetch.
pub const DATASET_DESCRIPTION_FILE: &str = "dataset_description.json";

pub type FetchResult<T> = Result<T, FetchError>;

/// Remote fetch failure.
#[derive(Debug)]
pub enum FetchError {
    /// Stored credentials are missing or rejected by the remote store.
    RemoteAuth(String),
    /// The remote store reported a non-auth failure for one object.
    Transfer { object: String, message: String },
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Manifest(serde_json::Error),
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RemoteAuth(message) => write!(f, "remote authentication failed: {message}"),
            Self::Transfer { object, message } => {
                write!(f, "transfer failed for `{object}`: {message}")
            }
            Self::Io { path, source } => {
                write!(f, "fetch i/o error at `{}`: {source}", path.display())
            }
            Self::Manifest(err) => write!(f, "invalid dataset manifest: {err}"),
        }
    }
}

impl Error for FetchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Manifest(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(value: serde_json::Error) -> Self {
        Self::Manifest(value)
    }
}

/// BIDS-style study manifest written to the root after a fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetDescription {
    #[serde(rename = "BIDSVersion")]
    pub bids_version: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Acknowledgements")]
    pub acknowledgements: String,
    #[serde(rename = "Subjects")]
    pub subjects: Vec<String>,
}

/// Remote downloader contract.
///
/// Implementations hold stored credentials, download the raw study layout
/// for the requested subjects into `dest_root`, skip files already present,
/// and return the manifest describing what the study now contains.
pub trait RemoteFetcher {
    fn fetch(&self, subjects: &[String], dest_root: &Path) -> FetchResult<DatasetDescription>;
}

/// Runs a fetch and persists the resulting manifest at the study root.
pub fn fetch_study<F: RemoteFetcher>(
    fetcher: &F,
    subjects: &[String],
    dest_root: &Path,
) -> FetchResult<DatasetDescription> {
    let started_at = Instant::now();
    fs::create_dir_all(dest_root).map_err(|source| FetchError::Io {
        path: dest_root.to_path_buf(),
        source,
    })?;

    let description = fetcher.fetch(subjects, dest_root)?;
    write_dataset_description(dest_root, &description)?;
    info!(
        "event=fetch module=fetch status=ok subjects={} root={} duration_ms={}",
        subjects.len(),
        dest_root.display(),
        started_at.elapsed().as_millis()
    );
    Ok(description)
}

/// Writes the manifest as pretty JSON and returns its path.
pub fn write_dataset_description(
    root: &Path,
    description: &DatasetDescription,
) -> FetchResult<PathBuf> {
    let path = root.join(DATASET_DESCRIPTION_FILE);
    let json = serde_json::to_string_pretty(description)?;
    fs::write(&path, json).map_err(|source| FetchError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Reads the manifest back from the study root.
pub fn read_dataset_description(root: &Path) -> FetchResult<DatasetDescription> {
    let path = root.join(DATASET_DESCRIPTION_FILE);
    let json = fs::read_to_string(&path).map_err(|source| FetchError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(serde_json::from_str(&json)?)
}

#[cfg(test)]
mod tests {
    use super::{read_dataset_description, write_dataset_description, DatasetDescription};

    fn description() -> DatasetDescription {
        DatasetDescription {
            bids_version: "1.0.0".to_string(),
            name: "demo-study".to_string(),
            acknowledgements: "demo acquisition team".to_string(),
            subjects: vec!["sub-01".to_string(), "sub-02".to_string()],
        }
    }

    #[test]
    fn manifest_uses_external_key_names() {
        let json = serde_json::to_string(&description()).unwrap();
        for key in ["BIDSVersion", "Name", "Acknowledgements", "Subjects"] {
            assert!(json.contains(key), "missing key {key}");
        }
    }

    #[test]
    fn manifest_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let written = description();
        write_dataset_description(dir.path(), &written).unwrap();
        let read = read_dataset_description(dir.path()).unwrap();
        assert_eq!(read, written);
    }
}
