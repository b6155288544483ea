use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// `[machine id, human label]`, e.g. `["n02123045", "tabby"]`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClassLabel(pub String, pub String);

impl ClassLabel {
    pub fn wnid(&self) -> &str {
        &self.0
    }

    pub fn name(&self) -> &str {
        &self.1
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClassIndexError {
    #[error("Failed to read class index {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse class index {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Class id {0} not found in class index")]
    NotFound(i64),
}

#[derive(Debug, Clone, Default)]
pub struct ClassIndex {
    classes: HashMap<i64, ClassLabel>,
}

impl ClassIndex {
    pub fn from_path(path: &Path) -> Result<Self, ClassIndexError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ClassIndexError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw).map_err(|source| ClassIndexError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        Ok(Self {
            classes: serde_json::from_str(raw)?,
        })
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn get(&self, id: i64) -> Result<&ClassLabel, ClassIndexError> {
        self.classes.get(&id).ok_or(ClassIndexError::NotFound(id))
    }

    /// Resolves a model prediction to its human label.
    ///
    /// The model's class ids are one ahead of the index keys, so the lookup
    /// uses `predicted - 1`; a prediction of 0 never resolves.
    // TODO: confirm the shift against the served model's label file before
    // touching it; `prediction_is_shifted_down_by_one` pins current behavior.
    pub fn label_for_prediction(&self, predicted: i64) -> Result<&ClassLabel, ClassIndexError> {
        let id = predicted
            .checked_sub(1)
            .ok_or(ClassIndexError::NotFound(predicted))?;
        self.get(id)
    }
}

/// Holds the class table loaded at startup and swaps it on reload.
#[derive(Clone)]
pub struct ClassIndexStore {
    path: PathBuf,
    reload_per_request: bool,
    current: Arc<RwLock<Arc<ClassIndex>>>,
}

impl ClassIndexStore {
    pub fn load(
        path: impl Into<PathBuf>,
        reload_per_request: bool,
    ) -> Result<Self, ClassIndexError> {
        let path = path.into();
        let index = ClassIndex::from_path(&path)?;
        if index.is_empty() {
            log::warn!("Class index {} has no entries", path.display());
        }
        log::info!("Loaded {} classes from {}", index.len(), path.display());
        Ok(Self {
            path,
            reload_per_request,
            current: Arc::new(RwLock::new(Arc::new(index))),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-reads the file. On failure the previous table stays in place.
    pub fn reload(&self) -> Result<usize, ClassIndexError> {
        let index = ClassIndex::from_path(&self.path)?;
        let len = index.len();
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(index);
        Ok(len)
    }

    pub fn snapshot(&self) -> Arc<ClassIndex> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Table to use for one request; re-read from disk in per-request mode.
    pub fn for_request(&self) -> Result<Arc<ClassIndex>, ClassIndexError> {
        if self.reload_per_request {
            return Ok(Arc::new(ClassIndex::from_path(&self.path)?));
        }
        Ok(self.snapshot())
    }
}
