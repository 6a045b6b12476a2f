//! Filesystem side of the service: per-user upload directories and the
//! shared storage directory registered files are moved into.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::StartupError;

const PATH_COMPONENT_MAX_LEN: usize = 255;
const UPLOAD_DIR_MODE: u32 = 0o700;

/// A file waiting in a user's upload directory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadedFile {
    #[serde(skip_serializing)]
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct Storage {
    upload_dir: PathBuf,
    storage_dir: PathBuf,
}

/// Whether `value` can be used as a single entry name inside a directory.
pub fn is_path_component(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= PATH_COMPONENT_MAX_LEN
        && value != "."
        && value != ".."
        && !value.contains(|c: char| c == '/' || c == '\\' || c == '\0')
}

impl Storage {
    pub fn new(upload_dir: impl Into<PathBuf>, storage_dir: impl Into<PathBuf>) -> Self {
        Storage {
            upload_dir: upload_dir.into(),
            storage_dir: storage_dir.into(),
        }
    }

    /// Checks that both directories exist and are readable and writable.
    /// Meant to run once before the server accepts requests.
    pub fn check_permissions(&self) -> Result<(), StartupError> {
        for dir in &[&self.upload_dir, &self.storage_dir] {
            check_directory(dir)?;
        }
        Ok(())
    }

    pub fn user_upload_dir(&self, login: &str) -> PathBuf {
        self.upload_dir.join(login)
    }

    pub fn storage_path(&self, storage_id: &str) -> PathBuf {
        self.storage_dir.join(storage_id)
    }

    pub fn create_user_upload_dir(&self, login: &str) -> io::Result<()> {
        let user_dir = self.user_upload_dir(login);
        if user_dir.is_dir() {
            return Ok(());
        }

        let mut builder = fs::DirBuilder::new();
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(UPLOAD_DIR_MODE);
        }

        match builder.create(&user_dir) {
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && user_dir.is_dir() => Ok(()),
            result => result,
        }
    }

    /// Lists the regular files directly inside the user's upload directory.
    /// The iterator reads the directory lazily; call again for a fresh view.
    pub fn unregistered_files(
        &self,
        login: &str,
    ) -> io::Result<impl Iterator<Item = UploadedFile>> {
        let entries = fs::read_dir(self.user_upload_dir(login))?;

        Ok(entries.filter_map(|entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Skipping unreadable upload dir entry: {}", e);
                    return None;
                }
            };

            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(e) => {
                    log::warn!("Could not stat {:?}: {}", entry.path(), e);
                    return None;
                }
            };

            if !metadata.file_type().is_file() {
                return None;
            }

            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    log::warn!("Skipping upload with non UTF-8 name {:?}", raw);
                    return None;
                }
            };

            Some(UploadedFile {
                path: entry.path(),
                name,
                size: metadata.len(),
            })
        }))
    }

    pub fn file_size_bytes(&self, login: &str, name: &str) -> io::Result<u64> {
        let metadata = fs::symlink_metadata(self.user_upload_dir(login).join(name))?;
        if !metadata.file_type().is_file() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not a regular file", name),
            ));
        }
        Ok(metadata.len())
    }

    pub fn move_to_storage(&self, login: &str, name: &str, storage_id: &str) -> io::Result<()> {
        fs::rename(
            self.user_upload_dir(login).join(name),
            self.storage_path(storage_id),
        )
    }

    /// Undoes `move_to_storage`. Fails with `AlreadyExists` instead of
    /// replacing a file uploaded under the same name in the meantime; the
    /// stored copy is then left where it is.
    pub fn restore_to_upload_dir(
        &self,
        login: &str,
        name: &str,
        storage_id: &str,
    ) -> io::Result<()> {
        let stored = self.storage_path(storage_id);
        fs::hard_link(&stored, self.user_upload_dir(login).join(name))?;
        fs::remove_file(stored)
    }

    pub fn storage_file_exists(&self, storage_id: &str) -> bool {
        self.storage_path(storage_id).is_file()
    }

    pub fn open_stored(&self, storage_id: &str) -> io::Result<fs::File> {
        fs::File::open(self.storage_path(storage_id))
    }
}

fn check_directory(dir: &Path) -> Result<(), StartupError> {
    let metadata = match fs::metadata(dir) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(StartupError::MissingDirectory(dir.to_path_buf()))
        }
        Err(source) => {
            return Err(StartupError::InaccessibleDirectory {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    if !metadata.is_dir() {
        return Err(StartupError::NotADirectory(dir.to_path_buf()));
    }

    let inaccessible = |source: io::Error| StartupError::InaccessibleDirectory {
        path: dir.to_path_buf(),
        source,
    };

    fs::read_dir(dir).map_err(inaccessible)?;

    let marker = dir.join(format!(".write-check-{}", uuid::Uuid::new_v4()));
    fs::File::create(&marker).map_err(inaccessible)?;
    fs::remove_file(&marker).map_err(inaccessible)?;

    Ok(())
}
