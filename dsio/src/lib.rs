//! `dsio` is the dataset I/O core of a hierarchical binary storage engine.
//!
//! A dataset is an N-dimensional array of typed elements stored in the flat byte address space of a [`File`].
//! `dsio`:
//! - stores raw data in one of four [layouts](layout): a contiguous extent, indexed chunks, a compact buffer held with the dataset metadata, or external raw files,
//! - translates point and hyperslab [selections](dataspace::Selection) into ordered byte sequences against a layout,
//! - moves data between a layout and an application buffer selected independently, strip-mining through a bounded conversion buffer when the [data types](datatype) differ, and
//! - arbitrates between collective and independent [multi-process transfer](parallel).
//!
//! ## Getting Started
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # use std::sync::Arc;
//! use dsio::{
//!     dataspace::Dataspace,
//!     datatype::DataType,
//!     properties::TransferProperties,
//!     DatasetBuilder, File, SpaceArg,
//! };
//!
//! let file = File::new(Arc::new(dsio::storage::store::MemoryStore::new()));
//! let dataset = DatasetBuilder::new(vec![100, 100], DataType::int32())
//!     .chunk_shape(vec![10, 10])
//!     .build(&file, "grid")?;
//!
//! // Write a 5x5 block at (10, 20) from a contiguous buffer
//! let mut file_space = dataset.space();
//! file_space.select_hyperslab(&[10, 20], &[1, 1], &[5, 5], &[1, 1])?;
//! let values: Vec<i32> = (0..25).collect();
//! dataset.write_elements(&DataType::int32(), SpaceArg::Space(&file_space), &values)?;
//!
//! // Read it back as 64-bit floats
//! let mem_space = Dataspace::new_simple(vec![25]);
//! let mut bytes = vec![0u8; 25 * 8];
//! dataset.read(
//!     &DataType::float64(),
//!     SpaceArg::Space(&mem_space),
//!     SpaceArg::Space(&file_space),
//!     &TransferProperties::default(),
//!     &mut bytes,
//! )?;
//! let floats: &[f64] = bytemuck::cast_slice(&bytes);
//! assert_eq!(floats[24], 24.0);
//! # Ok(())
//! # }
//! ```
//!
//! ## Crate Features
//! #### Default
//!  - `filesystem`: Re-export `dsio_filesystem` as `dsio::filesystem` and enable [`FilesystemExternalFiles`](layout::FilesystemExternalFiles).
//!
//! ## Logging
//! `dsio` logs allocation, chunk write-back and dataset lifecycle events with the [`log`] crate at the debug level, and failures that cannot be returned (such as a flush on drop) at the warn level.
//!
//! ## Configuration
//! Default buffer sizes and cache budgets are taken from the [global configuration](config::global_config).

#![cfg_attr(docsrs, feature(doc_cfg))]

mod chunk_cache;
pub mod chunk_index;
pub mod chunk_map;
pub mod config;
pub mod dataset;
pub mod datatype;
mod error;
pub mod file;
pub mod fill_value;
pub mod layout;
pub mod parallel;
pub mod properties;
pub mod transfer;

pub use dataset::{Dataset, DatasetBuilder, SpaceArg};
pub use error::{DatasetCreateError, DatasetError};
pub use file::{File, FileBuilder};

pub use dsio_dataspace as dataspace;
#[cfg(feature = "filesystem")]
pub use dsio_filesystem as filesystem;
pub use dsio_storage as storage;
