use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::NamedTempFile;

use crate::error::Result;

/// On-disk shape of the learned parameters.
///
/// Biases are stored as single-column nested arrays (`[H][1]` and `[10][1]`)
/// so every field has the same nested-array layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedModel {
    pub theta1: Vec<Vec<f64>>,
    pub theta2: Vec<Vec<f64>>,
    pub b1: Vec<Vec<f64>>,
    pub b2: Vec<Vec<f64>>,
}

/// Where the engine reads and writes its `PersistedModel`.
///
/// `load` returns `Ok(None)` when nothing has been stored yet, which is the
/// normal first-run situation rather than an error.
pub trait ModelStore: Send + Sync {
    fn load(&self) -> Result<Option<PersistedModel>>;

    fn save(&self, model: &PersistedModel) -> Result<()>;

    /// Human-readable location, used in log lines.
    fn describe(&self) -> String;
}

impl<S: ModelStore + ?Sized> ModelStore for Arc<S> {
    fn load(&self) -> Result<Option<PersistedModel>> {
        (**self).load()
    }

    fn save(&self, model: &PersistedModel) -> Result<()> {
        (**self).save(model)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// JSON file store. Saves go through a temp file in the same directory that
/// is renamed over the target, so a crash mid-write leaves the old file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> JsonFileStore {
        JsonFileStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn directory(&self) -> &Path {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }
}

impl ModelStore for JsonFileStore {
    fn load(&self) -> Result<Option<PersistedModel>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let reader = BufReader::new(file);
        Ok(Some(serde_json::from_reader(reader)?))
    }

    fn save(&self, model: &PersistedModel) -> Result<()> {
        let mut tmp = NamedTempFile::new_in(self.directory())?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer(&mut writer, model)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        copy_target_permissions(tmp.as_file(), &self.path)?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Temp files are created owner-only. Give the replacement the permissions
/// of the file it replaces, or `rw-r--r--` for a first save.
#[cfg(unix)]
fn copy_target_permissions(tmp: &File, target: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = match std::fs::metadata(target) {
        Ok(meta) => meta.permissions().mode() & 0o7777,
        Err(err) if err.kind() == ErrorKind::NotFound => 0o644,
        Err(err) => return Err(err.into()),
    };
    tmp.set_permissions(std::fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn copy_target_permissions(_tmp: &File, _target: &Path) -> Result<()> {
    Ok(())
}

/// Keeps the model in memory. Lets the load/fallback policy be exercised
/// without filesystem side effects.
#[derive(Debug, Default)]
pub struct MemoryStore {
    model: Mutex<Option<PersistedModel>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    pub fn with_model(model: PersistedModel) -> MemoryStore {
        MemoryStore {
            model: Mutex::new(Some(model)),
        }
    }

    /// Snapshot of whatever was saved last.
    pub fn snapshot(&self) -> Option<PersistedModel> {
        self.model
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl ModelStore for MemoryStore {
    fn load(&self) -> Result<Option<PersistedModel>> {
        Ok(self.snapshot())
    }

    fn save(&self, model: &PersistedModel) -> Result<()> {
        *self
            .model
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(model.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_owned()
    }
}
