use crate::util::StorageError;
use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Append-only JSON-lines file. Each record is serialised on one line and the
/// file is fsynced after every append.
#[derive(Debug, Clone)]
pub struct JsonLinesFile {
    path: PathBuf,
}

impl JsonLinesFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads every complete record. A final line without its terminating
    /// newline is a torn append: it is dropped and the file truncated back to
    /// the last complete record.
    pub fn load_all<T: DeserializeOwned>(&self) -> Result<Vec<T>, StorageError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StorageError::Io(err)),
        };
        let complete_len = match bytes.iter().rposition(|b| *b == b'\n') {
            Some(pos) => pos + 1,
            None => 0,
        };
        if complete_len < bytes.len() {
            warn!(
                "event=json_lines_torn_tail path={} dropped_bytes={}",
                self.path.display(),
                bytes.len() - complete_len
            );
            let file = OpenOptions::new().write(true).open(&self.path)?;
            file.set_len(complete_len as u64)?;
            file.sync_all()?;
        }
        let mut records = Vec::new();
        for (idx, line) in bytes[..complete_len].split(|b| *b == b'\n').enumerate() {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            let record =
                serde_json::from_slice(line).map_err(|err| StorageError::CorruptRecord {
                    file: self.path.display().to_string(),
                    line: idx + 1,
                    details: err.to_string(),
                })?;
            records.push(record);
        }
        Ok(records)
    }

    pub fn append<T: Serialize>(&self, record: &T) -> Result<(), StorageError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file: File = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&line)?;
        file.sync_all()?;
        Ok(())
    }
}
