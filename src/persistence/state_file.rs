use crate::util::StorageError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// Small JSON document replaced atomically (tmp file, fsync, rename).
#[derive(Debug, Clone)]
pub struct JsonStateFile<T> {
    path: PathBuf,
    _record: PhantomData<fn() -> T>,
}

impl<T> JsonStateFile<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _record: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_or_default(&self) -> Result<T, StorageError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(T::default()),
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    pub fn persist(&self, record: &T) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        let mut file = File::create(&tmp)?;
        let payload = serde_json::to_vec_pretty(record)?;
        file.write_all(&payload)?;
        file.sync_all()?;
        fs::rename(tmp, &self.path)?;
        Ok(())
    }
}
