//! Durable store backed by JSON files
//!
//! Each logical document has a primary file and a transient backup. A save
//! copies the primary to the backup, overwrites the primary and then deletes
//! the backup. A crash in between leaves the backup behind, and `load`
//! prefers it, so a torn primary is never read.
//!
//! Loading never fails: a missing document is empty state and a malformed one
//! is logged and treated as empty.

use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{error, info, warn};

use crate::broker::message::Message;
use crate::broker::sequencer::CursorEntry;
use crate::utils::error::PersistenceError;

pub const MESSAGES_FILE: &str = "messages.json";
pub const MESSAGES_BACKUP_FILE: &str = "messages_backup.json";
pub const SEQUENCE_FILE: &str = "sequence_tracker.json";
pub const SEQUENCE_BACKUP_FILE: &str = "sequence_tracker_backup.json";

#[derive(Debug)]
pub struct JsonDocument<T> {
    primary: PathBuf,
    backup: PathBuf,
    _doc: PhantomData<fn() -> T>,
}

impl<T> Clone for JsonDocument<T> {
    fn clone(&self) -> Self {
        Self {
            primary: self.primary.clone(),
            backup: self.backup.clone(),
            _doc: PhantomData,
        }
    }
}

impl<T> JsonDocument<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(primary: impl Into<PathBuf>, backup: impl Into<PathBuf>) -> Self {
        Self {
            primary: primary.into(),
            backup: backup.into(),
            _doc: PhantomData,
        }
    }

    /// Document next to `primary`, with the backup named `<stem>_backup.<ext>`.
    pub fn beside(primary: impl Into<PathBuf>) -> Self {
        let primary = primary.into();
        let stem = primary
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let backup_name = match primary.extension() {
            Some(ext) => format!("{stem}_backup.{}", ext.to_string_lossy()),
            None => format!("{stem}_backup"),
        };
        let backup = primary.with_file_name(backup_name);
        Self::new(primary, backup)
    }

    pub fn primary_path(&self) -> &Path {
        &self.primary
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup
    }

    pub fn load(&self) -> T {
        let from_backup = self.primary.exists() && self.backup.exists();
        let source = if from_backup { &self.backup } else { &self.primary };

        if !source.exists() {
            return T::default();
        }

        let doc = match Self::read(source) {
            Ok(doc) => doc,
            Err(e) => {
                error!("Failed to load {}: {e}. Starting empty.", source.display());
                return T::default();
            }
        };

        if from_backup {
            warn!(
                "Recovered {} from backup after an interrupted write",
                self.primary.display()
            );
            if let Err(e) = self.restore_primary() {
                error!("Failed to restore {}: {e}", self.primary.display());
            }
        }

        doc
    }

    pub fn save(&self, doc: &T) -> Result<(), PersistenceError> {
        let data = serde_json::to_vec(doc)?;

        if self.primary.exists() {
            fs::copy(&self.primary, &self.backup)?;
        }
        fs::write(&self.primary, data)?;
        if self.backup.exists() {
            fs::remove_file(&self.backup)?;
        }
        Ok(())
    }

    fn read(path: &Path) -> Result<T, PersistenceError> {
        let text = fs::read_to_string(path)?;
        if text.trim().is_empty() {
            return Ok(T::default());
        }
        Ok(serde_json::from_str(&text)?)
    }

    // Put the good copy back in place so the next save's backup step cannot
    // copy a torn primary over it.
    fn restore_primary(&self) -> Result<(), PersistenceError> {
        fs::copy(&self.backup, &self.primary)?;
        fs::remove_file(&self.backup)?;
        Ok(())
    }
}

/// The broker's two documents: pending messages and sequence cursors.
#[derive(Debug, Clone)]
pub struct DurableStore {
    pub messages: JsonDocument<Vec<Message>>,
    pub cursors: JsonDocument<Vec<CursorEntry>>,
}

impl DurableStore {
    /// Open (and create if needed) a store rooted at `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        info!("Durable store at {}", dir.display());
        Ok(Self {
            messages: JsonDocument::new(dir.join(MESSAGES_FILE), dir.join(MESSAGES_BACKUP_FILE)),
            cursors: JsonDocument::new(dir.join(SEQUENCE_FILE), dir.join(SEQUENCE_BACKUP_FILE)),
        })
    }
}
