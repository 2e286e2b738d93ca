use crate::error::{Result, TempiError};
use crate::types::Entry;
use chrono::{DateTime, Local};
use log::debug;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// The list of tracked folders, persisted as a pretty-printed JSON array.
///
/// Every mutation rewrites the whole file. If that write fails the in-memory
/// list keeps the change, so callers should stop using the instance after an
/// error. Nothing guards against two processes touching the file at once.
#[derive(Debug)]
pub struct Registry {
    path: PathBuf,
    entries: Vec<Entry>,
}

impl Registry {
    pub fn new(path: &Path) -> Self {
        Registry {
            path: path.to_path_buf(),
            entries: Vec::new(),
        }
    }

    /// Shorthand for `new` followed by `load`.
    pub fn open(path: &Path) -> Result<Self> {
        let mut registry = Registry::new(path);
        registry.load()?;
        Ok(registry)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&mut self) -> Result<()> {
        ensure_parent_dir(&self.path)?;

        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("registry {} not found, starting empty", self.path.display());
                self.entries = Vec::new();
                return Ok(());
            }
            Err(e) => return Err(TempiError::io("failed to read registry file", &self.path, e)),
        };

        if data.iter().all(u8::is_ascii_whitespace) {
            self.entries = Vec::new();
            return Ok(());
        }

        self.entries = serde_json::from_slice(&data).map_err(|source| TempiError::CorruptRegistry {
            path: self.path.clone(),
            source,
        })?;
        debug!(
            "loaded {} entries from {}",
            self.entries.len(),
            self.path.display()
        );
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        let data = serde_json::to_string_pretty(&self.entries)?;
        ensure_parent_dir(&self.path)?;
        fs::write(&self.path, data)
            .map_err(|e| TempiError::io("failed to write registry file", &self.path, e))
    }

    /// Appends `entry`. A path that is already tracked is rejected and nothing is written.
    pub fn add(&mut self, entry: Entry) -> Result<()> {
        if self.contains(&entry.path) {
            return Err(TempiError::DuplicatePath { path: entry.path });
        }
        self.entries.push(entry);
        self.save()
    }

    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.entries.iter().any(|e| e.path == path)
    }

    /// Drops the entry tracking `path`. Unknown paths are not an error.
    pub fn remove(&mut self, path: &Path) -> Result<()> {
        let Some(idx) = self.entries.iter().position(|e| e.path == path) else {
            return Ok(());
        };
        self.entries.remove(idx);
        self.save()
    }

    #[must_use]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    #[must_use]
    pub fn expired(&self, now: DateTime<Local>) -> Vec<Entry> {
        self.entries
            .iter()
            .filter(|e| e.is_expired(now))
            .cloned()
            .collect()
    }

    pub fn clear(&mut self) -> Result<()> {
        self.entries.clear();
        self.save()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub(crate) fn ensure_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => fs::create_dir_all(dir)
            .map_err(|e| TempiError::io("failed to create registry directory", dir, e)),
        _ => Ok(()),
    }
}
