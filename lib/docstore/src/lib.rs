use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;


/// Backups kept per logical filename; older ones are deleted as new ones
/// rotate in.
pub const BACKUP_RETENTION: usize = 10;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed document: {0}")]
    Json(#[from] serde_json::Error),
}

/// Whole-document JSON store. Every overwrite or delete copies the prior
/// file into `<root>/backups/<timestamp>_<filename>` first. Writes are a
/// plain file replace, not an atomic rename.
pub struct DocStore {
    root: PathBuf,
    backup_dir: PathBuf,
}

impl DocStore {
    pub fn open<P: Into<PathBuf>>(root: P) -> Result<Self, StoreError> {
        let root = root.into();
        let backup_dir = root.join("backups");
        fs::create_dir_all(&backup_dir)?;
        Ok(Self { root, backup_dir })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reads a document by store-relative name. A missing file is `None`,
    /// not an error.
    pub fn read<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, StoreError> {
        let path = self.root.join(name);
        let contents = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&contents)?))
    }

    pub fn write<T: Serialize>(&self, name: &str, doc: &T) -> Result<(), StoreError> {
        let path = self.root.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.backup(&path)?;
        fs::write(&path, serde_json::to_string_pretty(doc)?)?;
        Ok(())
    }

    /// Backs the document up, then deletes it. Returns whether the file
    /// existed.
    pub fn remove(&self, name: &str) -> Result<bool, StoreError> {
        let path = self.root.join(name);
        if !path.exists() {
            return Ok(false);
        }
        self.backup(&path)?;
        fs::remove_file(&path)?;
        Ok(true)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.root.join(name).exists()
    }

    /// Backup files for a logical filename, newest first.
    pub fn backups(&self, file_name: &str) -> Result<Vec<PathBuf>, StoreError> {
        let suffix = format!("_{}", file_name);
        let mut names: Vec<String> = fs::read_dir(&self.backup_dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.ends_with(&suffix))
            .collect();
        names.sort();
        names.reverse();
        Ok(names
            .into_iter()
            .map(|name| self.backup_dir.join(name))
            .collect())
    }

    fn backup(&self, path: &Path) -> Result<(), StoreError> {
        if !path.exists() {
            return Ok(());
        }
        let file_name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_string(),
            None => return Ok(()),
        };
        // Same shape as an ISO timestamp with ':' and '.' made filename-safe.
        let stamp = Utc::now().format("%Y-%m-%dT%H-%M-%S-%3fZ");
        let backup_path = self.backup_dir.join(format!("{}_{}", stamp, file_name));
        fs::copy(path, &backup_path)?;
        self.prune(&file_name)
    }

    fn prune(&self, file_name: &str) -> Result<(), StoreError> {
        for stale in self.backups(file_name)?.iter().skip(BACKUP_RETENTION) {
            fs::remove_file(stale)?;
        }
        Ok(())
    }
}
