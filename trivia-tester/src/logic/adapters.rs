//! File-backed snapshot source and episode store.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use trivia_engine::{
    Episode, EpisodeKey, EpisodeStore, SnapshotSource, SubjectKind, SubjectSnapshot,
};

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("no snapshot file registered for {0}")]
    UnknownSubject(String),
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, AdapterError> {
    let text = fs::read_to_string(path).map_err(|source| AdapterError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| AdapterError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Serves snapshots from JSON files, one file per subject.
///
/// Snapshot files carry no date, so the same file answers every date asked
/// for its subject.
#[derive(Debug, Clone, Default)]
pub struct FileSnapshotSource {
    files: BTreeMap<(SubjectKind, String), PathBuf>,
}

impl FileSnapshotSource {
    /// Parse each file once to learn which subject it describes.
    pub fn from_paths<P: AsRef<Path>>(paths: &[P]) -> Result<(Self, Vec<SubjectSnapshot>), AdapterError> {
        let mut source = Self::default();
        let mut snapshots = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            let snapshot: SubjectSnapshot = read_json(path)?;
            source.files.insert(
                (snapshot.topic.kind, snapshot.topic.slug.clone()),
                path.to_path_buf(),
            );
            snapshots.push(snapshot);
        }
        Ok((source, snapshots))
    }
}

impl SnapshotSource for FileSnapshotSource {
    type Error = AdapterError;

    fn load_snapshot(&self, key: &EpisodeKey) -> Result<SubjectSnapshot, Self::Error> {
        let path = self
            .files
            .get(&(key.subject_kind, key.slug.clone()))
            .ok_or_else(|| AdapterError::UnknownSubject(key.to_string()))?;
        read_json(path)
    }
}

/// Stores each episode as pretty JSON named after its key.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, AdapterError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| AdapterError::Io {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    #[must_use]
    pub fn path_for(&self, key: &EpisodeKey) -> PathBuf {
        self.root.join(format!("{}.json", key.storage_name()))
    }
}

impl EpisodeStore for DirectoryStore {
    type Error = AdapterError;

    fn save_episode(&self, key: &EpisodeKey, episode: &Episode) -> Result<(), Self::Error> {
        let path = self.path_for(key);
        let payload = serde_json::to_vec_pretty(episode).map_err(|source| AdapterError::Json {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, payload).map_err(|source| AdapterError::Io { path, source })
    }

    fn load_episode(&self, key: &EpisodeKey) -> Result<Option<Episode>, Self::Error> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    fn delete_episode(&self, key: &EpisodeKey) -> Result<(), Self::Error> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Err(source) if source.kind() != std::io::ErrorKind::NotFound => {
                Err(AdapterError::Io { path, source })
            }
            _ => Ok(()),
        }
    }
}
