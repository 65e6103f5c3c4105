//! Uniform storage interface over notes roots.
//!
//! Each configured root (USB directory, local directory, Drive folder) is one
//! backend instance; priority is the configuration order. Cross-root
//! deduplication is the reconciliation engine's job, never the backend's.

use anyhow::Result;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::TriageError;
use crate::triage::naming::Granularity;

/// Namespace within one root: raw notes and sidecars live at the top level
/// (`Inbox`), analysis outputs under one subdirectory per granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Area {
    Inbox,
    Rollup(Granularity),
}

impl Area {
    pub fn subdir(self) -> Option<&'static str> {
        match self {
            Self::Inbox => None,
            Self::Rollup(granularity) => Some(granularity.subdir()),
        }
    }
}

/// Listing entry: filename plus modification time when the root can supply
/// one. Mtimes are the staleness oracle; a backend that cannot provide them
/// simply disables re-analysis detection for its files.
#[derive(Debug, Clone)]
pub struct FileStamp {
    pub name: String,
    pub mtime: Option<SystemTime>,
}

pub trait NotesBackend: Sync {
    fn id(&self) -> &str;

    /// Cheap reachability probe used for status reporting and primary-root
    /// selection; listing failures are still handled per call.
    fn is_available(&self) -> bool;

    fn list(&self, area: Area) -> Result<Vec<FileStamp>>;
    fn exists(&self, area: Area, name: &str) -> Result<bool>;
    fn read_text(&self, area: Area, name: &str) -> Result<String>;
    fn read_bytes(&self, area: Area, name: &str) -> Result<Vec<u8>>;
    fn write_text(&self, area: Area, name: &str, content: &str) -> Result<()>;
    fn write_bytes(&self, area: Area, name: &str, bytes: &[u8]) -> Result<()>;
    fn mtime(&self, area: Area, name: &str) -> Result<Option<SystemTime>>;
}

/// Filesystem root. Multiple mounted roots are modeled as multiple instances
/// of this type in priority order.
pub struct LocalDirBackend {
    id: String,
    root: PathBuf,
}

impl LocalDirBackend {
    pub fn new(id: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn area_dir(&self, area: Area) -> PathBuf {
        match area.subdir() {
            Some(subdir) => self.root.join(subdir),
            None => self.root.clone(),
        }
    }

    fn unavailable(&self, reason: impl Into<String>) -> TriageError {
        TriageError::BackendUnavailable {
            root: self.id.clone(),
            reason: reason.into(),
        }
    }

    fn ensure_root(&self) -> Result<()> {
        if !self.root.is_dir() {
            return Err(self
                .unavailable(format!("directory not found: {}", self.root.display()))
                .into());
        }
        Ok(())
    }
}

impl NotesBackend for LocalDirBackend {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_available(&self) -> bool {
        self.root.is_dir()
    }

    fn list(&self, area: Area) -> Result<Vec<FileStamp>> {
        self.ensure_root()?;
        let dir = self.area_dir(area);
        // A missing sub-namespace just means nothing was written there yet.
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(self.unavailable(err.to_string()).into()),
        };

        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| self.unavailable(err.to_string()))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let mtime = entry.metadata().ok().and_then(|m| m.modified().ok());
            out.push(FileStamp {
                name: name.to_string(),
                mtime,
            });
        }
        Ok(out)
    }

    fn exists(&self, area: Area, name: &str) -> Result<bool> {
        Ok(self.area_dir(area).join(name).is_file())
    }

    fn read_text(&self, area: Area, name: &str) -> Result<String> {
        let path = self.area_dir(area).join(name);
        fs::read_to_string(&path)
            .map_err(|err| self.unavailable(format!("read {}: {err}", path.display())).into())
    }

    fn read_bytes(&self, area: Area, name: &str) -> Result<Vec<u8>> {
        let path = self.area_dir(area).join(name);
        fs::read(&path)
            .map_err(|err| self.unavailable(format!("read {}: {err}", path.display())).into())
    }

    fn write_text(&self, area: Area, name: &str, content: &str) -> Result<()> {
        self.write_bytes(area, name, content.as_bytes())
    }

    fn write_bytes(&self, area: Area, name: &str, bytes: &[u8]) -> Result<()> {
        self.ensure_root()?;
        let dir = self.area_dir(area);
        fs::create_dir_all(&dir)
            .map_err(|err| self.unavailable(format!("create {}: {err}", dir.display())))?;
        let path = dir.join(name);
        fs::write(&path, bytes)
            .map_err(|err| self.unavailable(format!("write {}: {err}", path.display())).into())
    }

    fn mtime(&self, area: Area, name: &str) -> Result<Option<SystemTime>> {
        let path = self.area_dir(area).join(name);
        match fs::metadata(&path) {
            Ok(meta) => Ok(meta.modified().ok()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(self
                .unavailable(format!("stat {}: {err}", path.display()))
                .into()),
        }
    }
}

/// First backend that is currently reachable, in priority order. This is the
/// effective output root for rollups and reports.
pub fn primary_backend<'a>(
    backends: &'a [Box<dyn NotesBackend>],
) -> Result<&'a dyn NotesBackend> {
    backends
        .iter()
        .map(|b| b.as_ref())
        .find(|b| b.is_available())
        .ok_or_else(|| TriageError::NoSourceAvailable.into())
}

/// Backend with the given root id. Daily analyses are persisted next to the
/// root their source note came from.
pub fn backend_by_id<'a>(
    backends: &'a [Box<dyn NotesBackend>],
    id: &str,
) -> Option<&'a dyn NotesBackend> {
    backends.iter().map(|b| b.as_ref()).find(|b| b.id() == id)
}
