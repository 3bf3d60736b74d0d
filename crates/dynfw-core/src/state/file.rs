// # File State Store
//
// File-based implementation of StateStore with crash recovery.
//
// ## Purpose
//
// Persists the IP history across daemon restarts and crashes so that a
// restart with an unchanged address does not touch the firewall.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Automatic backup: Keeps .backup of the last known good state
// - Recovery: Falls back to backup if the main file does not parse
//
// ## File Format
//
// ```json
// {
//     "previous_ip": "1.1.1.1",
//     "current_ip": "2.2.2.2"
// }
// ```
//
// The file is read on every `load()`; nothing is cached in memory.

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::Error;
use crate::traits::state_store::{IpHistoryRecord, StateStore};

/// Why a state file could not be read
enum ReadFailure {
    /// The file exists but could not be read
    Io(Error),
    /// The file was read but is not a valid record
    Corrupt(Error),
}

impl From<ReadFailure> for Error {
    fn from(failure: ReadFailure) -> Self {
        match failure {
            ReadFailure::Io(e) | ReadFailure::Corrupt(e) => e,
        }
    }
}

/// File-based state store with crash recovery
///
/// # Example
///
/// ```rust,no_run
/// use dynfw_core::state::FileStateStore;
/// use dynfw_core::traits::state_store::StateStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileStateStore::new("./ip_addresses.json").await?;
///
///     let changed = store.check_and_update("1.2.3.4".parse()?).await?;
///     assert!(changed);
///
///     let record = store.load().await?;
///     assert_eq!(record.current_ip.as_deref(), Some("1.2.3.4"));
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    /// Create a file state store
    ///
    /// Creates the parent directory if it does not exist. The state file
    /// itself is only created on the first change.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to create state directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        Ok(Self { path })
    }

    /// Path of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a record from `path`, `None` if the file does not exist
    async fn read_record(path: &Path) -> Result<Option<IpHistoryRecord>, ReadFailure> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("State file does not exist: {}", path.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(ReadFailure::Io(Error::state_store(format!(
                    "Failed to read state file {}: {}",
                    path.display(),
                    e
                ))));
            }
        };

        serde_json::from_str(&content).map(Some).map_err(|e| {
            ReadFailure::Corrupt(Error::state_store(format!(
                "Failed to parse state file {}: {}",
                path.display(),
                e
            )))
        })
    }

    /// Load the record, recovering from the backup if the main file is corrupt
    ///
    /// Recovery strategy:
    /// 1. Load the main file (missing file → empty record)
    /// 2. If it does not parse, load the backup and restore it over the main file
    /// 3. If there is no usable backup, report the original parse error
    async fn load_with_recovery(&self) -> Result<IpHistoryRecord, Error> {
        let parse_error = match Self::read_record(&self.path).await {
            Ok(record) => return Ok(record.unwrap_or_default()),
            Err(ReadFailure::Io(e)) => return Err(e),
            Err(ReadFailure::Corrupt(e)) => e,
        };

        tracing::warn!(
            "State file appears corrupted: {}. Attempting recovery from backup.",
            parse_error
        );

        let backup_path = Self::backup_path(&self.path);
        match Self::read_record(&backup_path).await {
            Ok(Some(record)) => {
                tracing::info!(
                    previous_ip = ?record.previous_ip,
                    current_ip = ?record.current_ip,
                    "Recovered state from backup"
                );

                if let Err(restore_err) = Self::restore_from_backup(&self.path, &backup_path).await
                {
                    tracing::error!("Failed to restore state file from backup: {}", restore_err);
                }

                Ok(record)
            }
            Ok(None) => {
                tracing::error!("No backup file found");
                Err(parse_error)
            }
            Err(backup_err) => {
                tracing::error!("Backup also unusable: {}", Error::from(backup_err));
                Err(parse_error)
            }
        }
    }

    /// Write the record to the state file atomically
    async fn write_record(&self, record: &IpHistoryRecord) -> Result<(), Error> {
        let json = Self::to_pretty_json(record)?;

        // Write to temporary file first
        let temp_path = self.temp_path();
        if let Err(e) = Self::write_temp(&temp_path, &json).await {
            Self::discard_temp(&temp_path).await;
            return Err(e);
        }

        // Keep the current file as backup
        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        if let Err(e) = fs::rename(&temp_path, &self.path).await {
            Self::discard_temp(&temp_path).await;
            return Err(Error::state_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            )));
        }

        tracing::trace!("State written to file: {}", self.path.display());
        Ok(())
    }

    /// Write and sync `json` to the temporary file
    async fn write_temp(temp_path: &Path, json: &[u8]) -> Result<(), Error> {
        let mut file = fs::File::create(temp_path).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to create temp file {}: {}",
                temp_path.display(),
                e
            ))
        })?;

        file.write_all(json).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to write to temp file {}: {}",
                temp_path.display(),
                e
            ))
        })?;

        file.sync_all().await.map_err(|e| {
            Error::state_store(format!(
                "Failed to sync temp file {}: {}",
                temp_path.display(),
                e
            ))
        })
    }

    /// Best-effort removal of a temporary file left by a failed write
    async fn discard_temp(temp_path: &Path) {
        if let Err(e) = fs::remove_file(temp_path).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!("Failed to remove temp file {}: {}", temp_path.display(), e);
        }
    }

    /// Four-space indented JSON, the layout earlier deployments wrote
    fn to_pretty_json(record: &IpHistoryRecord) -> Result<Vec<u8>, Error> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        record
            .serialize(&mut serializer)
            .map_err(|e| Error::state_store(format!("Failed to serialize state: {}", e)))?;
        Ok(buf)
    }

    /// Restore state file from backup
    async fn restore_from_backup(path: &Path, backup_path: &Path) -> Result<(), Error> {
        fs::copy(backup_path, path).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to restore from backup {} to {}: {}",
                backup_path.display(),
                path.display(),
                e
            ))
        })?;

        tracing::info!("Restored state file from backup");
        Ok(())
    }

    /// Get path to temporary file for atomic writes
    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    /// Get path to backup file
    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self) -> Result<IpHistoryRecord, Error> {
        self.load_with_recovery().await
    }

    async fn save(&self, record: &IpHistoryRecord) -> Result<(), Error> {
        self.write_record(record).await
    }

    fn store_name(&self) -> &'static str {
        "file"
    }
}
