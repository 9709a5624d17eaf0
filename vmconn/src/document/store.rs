//! Loading and persisting the document file.

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::{DocumentLayout, ManagedDocument};
use crate::error::{Result, SyncError};

/// Document file on disk.
pub struct DocumentStore {
    path: PathBuf,
    layout: DocumentLayout,
    required_folders: Vec<String>,
}

impl DocumentStore {
    pub fn new(path: impl Into<PathBuf>, layout: DocumentLayout) -> Self {
        Self {
            path: path.into(),
            layout,
            required_folders: Vec::new(),
        }
    }

    /// Fail `load` unless the document defines a folder with this name.
    pub fn require_folder(mut self, name: impl Into<String>) -> Self {
        self.required_folders.push(name.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<ManagedDocument> {
        let file = File::open(&self.path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SyncError::DocumentNotFound(self.path.clone()),
            _ => SyncError::DocumentUnreadable {
                path: self.path.clone(),
                source: e,
            },
        })?;

        let document = ManagedDocument::parse(BufReader::new(file), self.layout.clone())?;

        for name in &self.required_folders {
            document.find_folder(name)?;
        }

        debug!(path = %self.path.display(), "Loaded document");
        Ok(document)
    }

    /// Write the document back over the file it was loaded from.
    ///
    /// The tree is serialized completely before anything touches the disk,
    /// then written to a sibling temp file and renamed into place. Symlinks
    /// are followed, so the rename lands on the real file, and the file
    /// keeps its permissions.
    pub fn persist(&self, document: &ManagedDocument) -> Result<()> {
        let bytes = document.to_bytes().map_err(|e| self.persist_error(e))?;

        let target = std::fs::canonicalize(&self.path).unwrap_or_else(|_| self.path.clone());
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| self.persist_error(e))?;
        tmp.write_all(&bytes).map_err(|e| self.persist_error(e))?;
        if let Ok(metadata) = std::fs::metadata(&target) {
            tmp.as_file()
                .set_permissions(metadata.permissions())
                .map_err(|e| self.persist_error(e))?;
        }
        tmp.as_file().sync_all().map_err(|e| self.persist_error(e))?;
        tmp.persist(&target).map_err(|e| self.persist_error(e.error))?;

        info!(path = %target.display(), bytes = bytes.len(), "Persisted document");
        Ok(())
    }

    fn persist_error(&self, reason: impl std::fmt::Display) -> SyncError {
        SyncError::Persistence {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }
}
