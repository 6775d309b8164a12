//! A single file store for the [`dsio`](https://docs.rs/dsio/latest/dsio/index.html) crate.
//!
//! A [`FilesystemStore`] maps the flat byte address space of a dataset file onto one file of the local filesystem.
//! Reads past the end of the file are zero filled, so unwritten regions behave like holes in a sparse file.
//!
//! ## Licence
//! `dsio_filesystem` is licensed under either of
//! - the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> or
//! - the MIT license <http://opensource.org/licenses/MIT>, at your option.

use dsio_storage::{
    byte_range::ByteOffset, OffsetBytesIterator, ReadableStorageTraits, StorageError,
    WritableStorageTraits,
};

use parking_lot::Mutex;
use thiserror::Error;

use std::{
    fs::{File, OpenOptions},
    io::{ErrorKind, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

/// Options for use with [`FilesystemStore`]
#[non_exhaustive]
#[derive(Debug, Clone, Default)]
pub struct FilesystemStoreOptions {
    truncate: bool,
    read_only: bool,
}

impl FilesystemStoreOptions {
    /// Set whether an existing file is truncated when the store is opened.
    pub fn truncate(&mut self, truncate: bool) -> &mut Self {
        self.truncate = truncate;
        self
    }

    /// Set whether the store is opened read only.
    ///
    /// A read only store requires the file to exist.
    pub fn read_only(&mut self, read_only: bool) -> &mut Self {
        self.read_only = read_only;
        self
    }
}

/// A synchronous single file store.
#[derive(Debug)]
pub struct FilesystemStore {
    path: PathBuf,
    read_only: bool,
    file: Mutex<File>,
}

impl FilesystemStore {
    /// Open (or create) a file system store at `path`.
    ///
    /// # Errors
    /// Returns a [`FilesystemStoreCreateError`] if `path` is not valid or cannot be opened.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, FilesystemStoreCreateError> {
        Self::new_with_options(path, FilesystemStoreOptions::default())
    }

    /// Open a file system store at `path` with `options`.
    ///
    /// # Errors
    /// Returns a [`FilesystemStoreCreateError`] if `path` is not valid or cannot be opened.
    pub fn new_with_options<P: AsRef<Path>>(
        path: P,
        options: FilesystemStoreOptions,
    ) -> Result<Self, FilesystemStoreCreateError> {
        let path = path.as_ref().to_path_buf();
        if path.to_str().is_none() || path.is_dir() {
            return Err(FilesystemStoreCreateError::InvalidPath(path));
        }

        let mut flags = OpenOptions::new();
        flags.read(true);
        if !options.read_only {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            flags
                .write(true)
                .create(true)
                .truncate(options.truncate);
        }
        let file = flags.open(&path)?;
        log::debug!("opened file store {}", path.display());

        Ok(Self {
            path,
            read_only: options.read_only,
            file: Mutex::new(file),
        })
    }

    /// Return the path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if the store is read only.
    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        self.read_only
    }
}

impl ReadableStorageTraits for FilesystemStore {
    fn read_into(&self, offset: ByteOffset, buf: &mut [u8]) -> Result<(), StorageError> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        let mut filled = 0;
        while filled < buf.len() {
            match file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        }
        buf[filled..].fill(0);
        Ok(())
    }

    fn size(&self) -> Result<u64, StorageError> {
        Ok(self.file.lock().metadata()?.len())
    }
}

impl WritableStorageTraits for FilesystemStore {
    fn set_partial_many(&self, offset_values: OffsetBytesIterator) -> Result<(), StorageError> {
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        let mut file = self.file.lock();
        for (offset, value) in offset_values {
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(value)?;
        }
        Ok(())
    }

    fn truncate(&self, size: u64) -> Result<(), StorageError> {
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        self.file.lock().set_len(size)?;
        Ok(())
    }

    fn flush(&self) -> Result<(), StorageError> {
        if self.read_only {
            return Ok(());
        }
        let mut file = self.file.lock();
        file.flush()?;
        file.sync_data()?;
        Ok(())
    }
}

/// A filesystem store creation error.
#[derive(Debug, Error)]
pub enum FilesystemStoreCreateError {
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// The path is not valid on this system.
    #[error("path {0} is not valid")]
    InvalidPath(PathBuf),
}
