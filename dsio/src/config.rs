//! `dsio` global runtime configuration.
//!
//! The configuration holds the process-wide defaults that are copied into each [`TransferProperties`](crate::properties::TransferProperties) and each newly opened dataset.
//! Changing the configuration does not affect properties or datasets that already exist.
//!
//! ## Type Conversion Buffer Size
//! > default: 1 MiB (`1048576` bytes)
//!
//! The maximum size of the scratch buffer used by the strip-mined type-converting transfer.
//! A transfer moves at most `buffer_size / max(source element size, destination element size)` elements per iteration, and always at least one.
//!
//! ## Maximum Sequence List Length
//! > default: `1024`
//!
//! The maximum number of byte sequences produced by a single selection iterator step.
//!
//! ## Sieve Buffer Size
//! > default: 64 KiB (`65536` bytes)
//!
//! The size of the read-through/write-back window cached for contiguous datasets.
//! Accesses at least this large bypass the window.
//!
//! ## Chunk Cache Size
//! > default: 1 MiB (`1048576` bytes) and `521` slots
//!
//! The byte budget and slot count of the per-dataset least recently used chunk cache.
//! Chunks larger than the byte budget are never cached.
//!
//! ## Collective Transfer
//! > default: [`false`]
//!
//! If true, new transfer properties request collective transfer.
//! Collective transfer only takes effect when the file was opened with a communicator of more than one process.

use std::sync::{OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Global configuration options for the `dsio` crate.
///
/// Retrieve the global [`Config`] with [`global_config`] and modify it with [`global_config_mut`].
#[derive(Debug, Clone)]
pub struct Config {
    tconv_buffer_size: usize,
    max_sequences: usize,
    sieve_buffer_size: usize,
    chunk_cache_size: usize,
    chunk_cache_slots: usize,
    collective_transfer: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tconv_buffer_size: 1024 * 1024,
            max_sequences: 1024,
            sieve_buffer_size: 64 * 1024,
            chunk_cache_size: 1024 * 1024,
            chunk_cache_slots: 521,
            collective_transfer: false,
        }
    }
}

impl Config {
    /// Get the [type conversion buffer size](#type-conversion-buffer-size) configuration.
    #[must_use]
    pub fn tconv_buffer_size(&self) -> usize {
        self.tconv_buffer_size
    }

    /// Set the [type conversion buffer size](#type-conversion-buffer-size) configuration.
    pub fn set_tconv_buffer_size(&mut self, tconv_buffer_size: usize) -> &mut Self {
        self.tconv_buffer_size = tconv_buffer_size;
        self
    }

    /// Get the [maximum sequence list length](#maximum-sequence-list-length) configuration.
    #[must_use]
    pub fn max_sequences(&self) -> usize {
        self.max_sequences
    }

    /// Set the [maximum sequence list length](#maximum-sequence-list-length) configuration.
    ///
    /// A value of zero is treated as one.
    pub fn set_max_sequences(&mut self, max_sequences: usize) -> &mut Self {
        self.max_sequences = max_sequences.max(1);
        self
    }

    /// Get the [sieve buffer size](#sieve-buffer-size) configuration.
    #[must_use]
    pub fn sieve_buffer_size(&self) -> usize {
        self.sieve_buffer_size
    }

    /// Set the [sieve buffer size](#sieve-buffer-size) configuration.
    pub fn set_sieve_buffer_size(&mut self, sieve_buffer_size: usize) -> &mut Self {
        self.sieve_buffer_size = sieve_buffer_size;
        self
    }

    /// Get the [chunk cache size](#chunk-cache-size) configuration in bytes.
    #[must_use]
    pub fn chunk_cache_size(&self) -> usize {
        self.chunk_cache_size
    }

    /// Set the [chunk cache size](#chunk-cache-size) configuration in bytes.
    pub fn set_chunk_cache_size(&mut self, chunk_cache_size: usize) -> &mut Self {
        self.chunk_cache_size = chunk_cache_size;
        self
    }

    /// Get the [chunk cache size](#chunk-cache-size) slot count.
    #[must_use]
    pub fn chunk_cache_slots(&self) -> usize {
        self.chunk_cache_slots
    }

    /// Set the [chunk cache size](#chunk-cache-size) slot count.
    ///
    /// A value of zero is treated as one.
    pub fn set_chunk_cache_slots(&mut self, chunk_cache_slots: usize) -> &mut Self {
        self.chunk_cache_slots = chunk_cache_slots.max(1);
        self
    }

    /// Get the [collective transfer](#collective-transfer) configuration.
    #[must_use]
    pub fn collective_transfer(&self) -> bool {
        self.collective_transfer
    }

    /// Set the [collective transfer](#collective-transfer) configuration.
    pub fn set_collective_transfer(&mut self, collective_transfer: bool) -> &mut Self {
        self.collective_transfer = collective_transfer;
        self
    }
}

static CONFIG: OnceLock<RwLock<Config>> = OnceLock::new();

/// Returns a reference to the global `dsio` configuration.
///
/// # Panics
/// This function panics if the underlying lock has been poisoned and might panic if the global config is already held by the current thread.
pub fn global_config() -> RwLockReadGuard<'static, Config> {
    CONFIG
        .get_or_init(|| RwLock::new(Config::default()))
        .read()
        .unwrap()
}

/// Returns a mutable reference to the global `dsio` configuration.
///
/// # Panics
/// This function panics if the underlying lock has been poisoned and might panic if the global config is already held by the current thread.
pub fn global_config_mut() -> RwLockWriteGuard<'static, Config> {
    CONFIG
        .get_or_init(|| RwLock::new(Config::default()))
        .write()
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = Config::default();
        assert_eq!(config.tconv_buffer_size(), 1024 * 1024);
        assert_eq!(config.max_sequences(), 1024);
        assert_eq!(config.sieve_buffer_size(), 64 * 1024);
        assert_eq!(config.chunk_cache_size(), 1024 * 1024);
        assert_eq!(config.chunk_cache_slots(), 521);
        assert!(!config.collective_transfer());
    }

    #[test]
    fn config_setters_clamp() {
        let mut config = Config::default();
        config.set_max_sequences(0).set_chunk_cache_slots(0);
        assert_eq!(config.max_sequences(), 1);
        assert_eq!(config.chunk_cache_slots(), 1);
    }
}
