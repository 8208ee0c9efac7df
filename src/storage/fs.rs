use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use zeroize::Zeroizing;

use super::{KeyBlobStore, StorageError};

/// Key blobs as `<name>.bin` files inside one directory. Files are created
/// with mode 0600 on unix and never rewritten.
pub struct FsKeyStore {
    dir: PathBuf,
}

impl FsKeyStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StorageError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, StorageError> {
        let valid = !name.is_empty()
            && name
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_');
        if !valid {
            return Err(StorageError::InvalidName(name.to_string()));
        }
        Ok(self.dir.join(format!("{name}.bin")))
    }
}

impl KeyBlobStore for FsKeyStore {
    fn load(&self, name: &str) -> Result<Option<Zeroizing<Vec<u8>>>, StorageError> {
        let path = self.path_for(name)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(Zeroizing::new(bytes))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }

    fn store(&self, name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.path_for(name)?;
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = match options.open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                return Err(StorageError::AlreadyExists(name.to_string()))
            }
            Err(source) => return Err(StorageError::Io { path, source }),
        };
        file.write_all(bytes)
            .and_then(|()| file.sync_all())
            .map_err(|source| StorageError::Io { path, source })
    }
}
