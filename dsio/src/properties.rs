//! Transfer properties.

use crate::{config::global_config, parallel::TransferMode};

/// The resolved properties of a read or write call.
///
/// New properties copy their defaults from the [global configuration](crate::config::global_config).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferProperties {
    buffer_size: usize,
    max_sequences: usize,
    transfer_mode: TransferMode,
}

impl Default for TransferProperties {
    fn default() -> Self {
        let config = global_config();
        Self {
            buffer_size: config.tconv_buffer_size(),
            max_sequences: config.max_sequences(),
            transfer_mode: if config.collective_transfer() {
                TransferMode::Collective
            } else {
                TransferMode::Independent
            },
        }
    }
}

impl TransferProperties {
    /// Create transfer properties from the global configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the type conversion buffer size in bytes.
    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Set the type conversion buffer size in bytes.
    pub fn set_buffer_size(&mut self, buffer_size: usize) -> &mut Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Return the properties with the type conversion buffer size set to `buffer_size`.
    #[must_use]
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Return the maximum number of sequences per selection iterator step.
    #[must_use]
    pub fn max_sequences(&self) -> usize {
        self.max_sequences
    }

    /// Set the maximum number of sequences per selection iterator step.
    ///
    /// A value of zero is treated as one.
    pub fn set_max_sequences(&mut self, max_sequences: usize) -> &mut Self {
        self.max_sequences = max_sequences.max(1);
        self
    }

    /// Return the properties with the maximum number of sequences per selection iterator step set to `max_sequences`.
    #[must_use]
    pub fn with_max_sequences(mut self, max_sequences: usize) -> Self {
        self.set_max_sequences(max_sequences);
        self
    }

    /// Return the requested transfer mode.
    #[must_use]
    pub fn transfer_mode(&self) -> TransferMode {
        self.transfer_mode
    }

    /// Set the requested transfer mode.
    pub fn set_transfer_mode(&mut self, transfer_mode: TransferMode) -> &mut Self {
        self.transfer_mode = transfer_mode;
        self
    }

    /// Return the properties with the requested transfer mode set to `transfer_mode`.
    #[must_use]
    pub fn with_transfer_mode(mut self, transfer_mode: TransferMode) -> Self {
        self.transfer_mode = transfer_mode;
        self
    }
}

/// Caller-supplied scratch buffers for the type-converting transfer.
///
/// Buffers that are already large enough are reused across calls; smaller buffers are replaced.
#[derive(Debug, Default)]
pub struct TransferScratch {
    pub(crate) tconv: Vec<u8>,
    pub(crate) bkg: Vec<u8>,
}

impl TransferScratch {
    /// Create scratch buffers with `tconv_size` and `bkg_size` bytes.
    #[must_use]
    pub fn new(tconv_size: usize, bkg_size: usize) -> Self {
        Self {
            tconv: vec![0; tconv_size],
            bkg: vec![0; bkg_size],
        }
    }

    /// Return the size in bytes of the conversion buffer.
    #[must_use]
    pub fn tconv_size(&self) -> usize {
        self.tconv.len()
    }

    /// Return the size in bytes of the background buffer.
    #[must_use]
    pub fn bkg_size(&self) -> usize {
        self.bkg.len()
    }
}
