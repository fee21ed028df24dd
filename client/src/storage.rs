//! File-backed session storage.

use mbaas_engine::{Error, SessionStorage};
use serde_json::{Map, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Stores session entries as one JSON object in a file.
///
/// Writes go to a sibling temporary file that is renamed over the original.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Map<String, Value>, Error> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(storage_error(&self.path, e)),
        };
        if text.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str(&text) {
            Ok(Value::Object(entries)) => Ok(entries),
            Ok(_) => Err(Error::Storage(format!(
                "{} does not hold a JSON object",
                self.path.display()
            ))),
            Err(e) => Err(storage_error(&self.path, e)),
        }
    }

    fn store(&self, entries: Map<String, Value>) -> Result<(), Error> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| storage_error(parent, e))?;
        }
        let text = serde_json::to_string_pretty(&Value::Object(entries))
            .map_err(|e| storage_error(&self.path, e))?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, text).map_err(|e| storage_error(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| storage_error(&self.path, e))?;
        debug!(path = %self.path.display(), "session file written");
        Ok(())
    }
}

impl SessionStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<Value>, Error> {
        Ok(self.load()?.remove(key))
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), Error> {
        let mut entries = self.load()?;
        entries.insert(key.to_string(), value);
        self.store(entries)
    }

    fn remove(&mut self, key: &str) -> Result<(), Error> {
        let mut entries = self.load()?;
        if entries.remove(key).is_some() {
            self.store(entries)?;
        }
        Ok(())
    }
}

fn storage_error(path: &Path, error: impl std::fmt::Display) -> Error {
    Error::Storage(format!("{}: {}", path.display(), error))
}
