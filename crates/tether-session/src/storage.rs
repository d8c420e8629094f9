//! Where the session survives between runs.
//!
//! The store only needs three things from a backend: read returns the last
//! written value (or nothing), write is best-effort, delete is best-effort.
//! Errors are still returned here so the store can log them.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// The two values a session persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKey {
    Token,
    Username,
}

impl SessionKey {
    /// The logical name of this value, also its file name on disk.
    pub fn name(self) -> &'static str {
        match self {
            Self::Token => "token",
            Self::Username => "username",
        }
    }
}

/// A durable key/value backend for [`SessionKey`]s.
pub trait Storage: Send + Sync + 'static {
    /// Reads a value. `Ok(None)` means it was never written or was deleted.
    fn read(&self, key: SessionKey) -> io::Result<Option<String>>;

    /// Overwrites a value.
    fn write(&self, key: SessionKey, value: &str) -> io::Result<()>;

    /// Deletes a value. Deleting something absent is not an error.
    fn remove(&self, key: SessionKey) -> io::Result<()>;
}

// ---------------------------------------------------------------------------
// FileStorage
// ---------------------------------------------------------------------------

/// One file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Stores files directly under `dir`. The directory is created on the
    /// first write.
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Stores files under `<config dir>/<app>/session`, falling back to
    /// `./<app>/session` when the OS has no config directory.
    pub fn platform(app: &str) -> Self {
        let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::at(base.join(app).join("session"))
    }

    /// The directory holding the session files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: SessionKey) -> PathBuf {
        self.dir.join(key.name())
    }
}

impl Storage for FileStorage {
    fn read(&self, key: SessionKey) -> io::Result<Option<String>> {
        match fs::read_to_string(self.path(key)) {
            Ok(text) => Ok(Some(strip_line_ending(&text).to_owned())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write(&self, key: SessionKey, value: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.path(key), value)
    }

    fn remove(&self, key: SessionKey) -> io::Result<()> {
        match fs::remove_file(self.path(key)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryStorage
// ---------------------------------------------------------------------------

/// Process-local storage. Nothing survives a restart; handy in tests and
/// for guest sessions.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<SessionKey, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn read(&self, key: SessionKey) -> io::Result<Option<String>> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(&key).cloned())
    }

    fn write(&self, key: SessionKey, value: &str) -> io::Result<()> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key, value.to_owned());
        Ok(())
    }

    fn remove(&self, key: SessionKey) -> io::Result<()> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.remove(&key);
        Ok(())
    }
}

/// Drops one trailing line ending, which hand-edited files tend to gain.
/// Everything else, including other whitespace, is part of the value.
fn strip_line_ending(text: &str) -> &str {
    text.strip_suffix("\r\n")
        .or_else(|| text.strip_suffix('\n'))
        .unwrap_or(text)
}
