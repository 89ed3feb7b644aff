//! File-backed persistence of checkpoints for resuming an interrupted run.
//!
//! One JSON document per item at `<dir>/<id>.json`. Identifiers are validated on both
//! save and load, so nothing outside `dir` is ever touched.
use std::{
    fs, io,
    path::{Path, PathBuf},
};

use fanout_model::{Checkpoint, IdError, ItemId, validate_id};
use thiserror::Error;
use tracing::{debug, warn};

const EXT: &str = "json";

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("checkpoint io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed checkpoint {path}: {source}")]
    Serde {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid checkpoint id {id:?}: {source}")]
    InvalidId {
        id: String,
        #[source]
        source: IdError,
    },
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write every checkpoint, creating the directory if needed.
    pub fn save_all(&self, checkpoints: &[Checkpoint]) -> Result<(), CheckpointError> {
        if checkpoints.is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.dir).map_err(|source| CheckpointError::Io {
            path: self.dir.clone(),
            source,
        })?;
        for cp in checkpoints {
            self.save(cp)?;
        }
        debug!(dir = %self.dir.display(), count = checkpoints.len(), "checkpoints saved");
        Ok(())
    }

    pub fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let path = self.path_for(checkpoint.id.as_str())?;
        let body = serde_json::to_vec_pretty(checkpoint).map_err(|source| CheckpointError::Serde {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, body).map_err(|source| CheckpointError::Io { path, source })
    }

    /// Every checkpoint in the directory, sorted by id. A missing directory is empty.
    pub fn load_all(&self) -> Result<Vec<Checkpoint>, CheckpointError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(CheckpointError::Io {
                    path: self.dir.clone(),
                    source,
                });
            }
        };

        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| CheckpointError::Io {
                path: self.dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXT) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                warn!(path = %path.display(), "skipping checkpoint with non-utf8 name");
                continue;
            };
            if validate_id(stem).is_err() {
                warn!(path = %path.display(), "skipping checkpoint with unsafe name");
                continue;
            }

            let body = fs::read(&path).map_err(|source| CheckpointError::Io {
                path: path.clone(),
                source,
            })?;
            let cp: Checkpoint =
                serde_json::from_slice(&body).map_err(|source| CheckpointError::Serde {
                    path: path.clone(),
                    source,
                })?;
            out.push(cp);
        }
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    /// Ids to feed into the next run.
    pub fn pending_ids(&self) -> Result<Vec<ItemId>, CheckpointError> {
        Ok(self.load_all()?.into_iter().map(|cp| cp.id).collect())
    }

    /// Forget one item's checkpoint. Missing files are not an error.
    pub fn remove(&self, id: &str) -> Result<(), CheckpointError> {
        let path = self.path_for(id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CheckpointError::Io { path, source }),
        }
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, CheckpointError> {
        validate_id(id).map_err(|source| CheckpointError::InvalidId {
            id: id.to_string(),
            source,
        })?;
        Ok(self.dir.join(format!("{id}.{EXT}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fanout_model::CheckpointState;

    fn cp(id: &str, state: CheckpointState) -> Checkpoint {
        Checkpoint::new(ItemId::new(id).unwrap(), state)
    }

    #[test]
    fn save_then_load_sorted() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(tmp.path().join("cps"));

        store
            .save_all(&[
                cp("item-b", CheckpointState::Pending),
                cp("item-a", CheckpointState::AwaitingCredential),
            ])
            .unwrap();

        let loaded = store.load_all().unwrap();
        assert_eq!(
            loaded,
            vec![
                cp("item-a", CheckpointState::AwaitingCredential),
                cp("item-b", CheckpointState::Pending),
            ]
        );
        let ids: Vec<String> = store
            .pending_ids()
            .unwrap()
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(ids, vec!["item-a", "item-b"]);
    }

    #[test]
    fn missing_directory_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(tmp.path().join("nope"));
        assert!(store.load_all().unwrap().is_empty());
        store.save_all(&[]).unwrap();
        assert!(!store.dir().exists());
    }

    #[test]
    fn remove_clears_one_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(tmp.path());
        store
            .save_all(&[cp("a", CheckpointState::Pending), cp("b", CheckpointState::Pending)])
            .unwrap();

        store.remove("a").unwrap();
        store.remove("a").unwrap();
        let left = store.load_all().unwrap();
        assert_eq!(left, vec![cp("b", CheckpointState::Pending)]);
    }

    #[test]
    fn refuses_unsafe_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(tmp.path());
        assert!(matches!(
            store.remove("../escape"),
            Err(CheckpointError::InvalidId { .. })
        ));
    }

    #[test]
    fn ignores_foreign_files_and_reports_garbage() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(tmp.path());
        fs::write(tmp.path().join("notes.txt"), "hello").unwrap();
        fs::write(tmp.path().join("bad.name.json"), "{}").unwrap();
        assert!(store.load_all().unwrap().is_empty());

        fs::write(tmp.path().join("broken.json"), "not json").unwrap();
        assert!(matches!(
            store.load_all(),
            Err(CheckpointError::Serde { .. })
        ));
    }
}
