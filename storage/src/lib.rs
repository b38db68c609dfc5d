//! Referral Platform Storage - File-Based Snapshots
//!
//! The whole platform state is written as one snapshot:
//! - `<name>.json` for humans and as a fallback
//! - `<name>.bin` (bincode) for fast loading
//!
//! Both files are written to a temporary path first and renamed into place,
//! so a crash mid-write leaves the previous snapshot intact.

use referral_core::PlatformSnapshot;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_SNAPSHOT: &str = "platform";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(String),
}

pub struct SnapshotStore {
    data_dir: PathBuf,
    name: String,
}

impl SnapshotStore {
    /// Open (and create if needed) a snapshot directory
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        Self::open_named(path, DEFAULT_SNAPSHOT)
    }

    pub fn open_named<P: AsRef<Path>>(path: P, name: &str) -> Result<Self, StorageError> {
        let data_dir = path.as_ref().to_path_buf();
        if !data_dir.exists() {
            fs::create_dir_all(&data_dir)?;
        }
        Ok(Self {
            data_dir,
            name: name.to_string(),
        })
    }

    fn json_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.json", self.name))
    }

    fn bin_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.bin", self.name))
    }

    pub fn save(&self, snapshot: &PlatformSnapshot) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        write_atomic(&self.json_path(), &json)?;

        let bin = encode(snapshot)?;
        write_atomic(&self.bin_path(), &bin)?;

        log::debug!(
            "saved snapshot {} ({} accounts, {} entries)",
            self.name,
            snapshot.accounts.len(),
            snapshot.entries.len()
        );
        Ok(())
    }

    /// Load the snapshot, bincode first, JSON if the binary copy is missing
    /// or unreadable
    pub fn load(&self) -> Result<PlatformSnapshot, StorageError> {
        let bin_path = self.bin_path();
        if bin_path.exists() {
            match decode(&fs::read(&bin_path)?) {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) => log::warn!("binary snapshot {} unreadable, trying JSON: {}", self.name, e),
            }
        }

        let json_path = self.json_path();
        if json_path.exists() {
            let data = fs::read(&json_path)?;
            return serde_json::from_slice(&data)
                .map_err(|e| StorageError::SerializationError(e.to_string()));
        }

        Err(StorageError::SnapshotNotFound(self.name.clone()))
    }

    /// Like [`load`](Self::load), but `None` when nothing has been saved yet
    pub fn load_if_present(&self) -> Result<Option<PlatformSnapshot>, StorageError> {
        match self.load() {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(StorageError::SnapshotNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn exists(&self) -> bool {
        self.bin_path().exists() || self.json_path().exists()
    }

    pub fn delete(&self) -> Result<(), StorageError> {
        for path in [self.bin_path(), self.json_path()] {
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    bincode::serialize(value).map_err(|e| StorageError::SerializationError(e.to_string()))
}

fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, StorageError> {
    bincode::deserialize(data).map_err(|e| StorageError::SerializationError(e.to_string()))
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StorageError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
