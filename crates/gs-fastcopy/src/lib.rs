//! # gs-fastcopy
//!
//! Optimized file transfer to and from Google Cloud Storage.
//!
//! Objects are read and written through ordinary `std::io` streams backed by
//! a local scratch file. Writes are uploaded with a chunked, parallel
//! multipart upload; reads are fetched with `gcloud storage cp`. Names ending
//! in `.gz` are compressed or decompressed on the way, using `pigz`/`unpigz`
//! when available and `gzip`/`gunzip` otherwise. Local paths work through the
//! same interface without copying.
//!
//! ```no_run
//! use std::io::{Read, Write};
//!
//! # fn main() -> gs_fastcopy::Result<()> {
//! let mut out = gs_fastcopy::write("gs://my-bucket/my-file.json.gz", Default::default())?;
//! out.write_all(br#"{"A": 3}"#)?;
//! out.finish()?;
//!
//! let mut input = gs_fastcopy::read("gs://my-bucket/my-file.json.gz", None)?;
//! let mut contents = String::new();
//! input.read_to_string(&mut contents)?;
//! input.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! Both operations need scratch space for the whole object; a `.gz` object
//! briefly needs room for the compressed and uncompressed copies together.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod compression;
pub mod config;
mod error;
pub mod gcs;
pub mod locator;
pub mod process;
mod runtime;
pub mod scratch;
mod stream;
pub mod transfer;

pub use config::Config;
pub use error::{Error, Result};
pub use gcs::GcsTransfer;
pub use locator::{Locator, RemoteLocator};
pub use stream::{Fastcopy, ReadStream, WriteOptions, WriteStream};
pub use transfer::{available_cpus, RemoteTransfer, TransferParams};

/// Open `locator` for reading with the user's configuration.
///
/// See [`Fastcopy::read`].
pub fn read(locator: &str, billing_project: Option<&str>) -> Result<ReadStream> {
    Fastcopy::new(Config::load_or_default()).read(locator, billing_project)
}

/// Open `locator` for writing with the user's configuration.
///
/// See [`Fastcopy::write`].
pub fn write(locator: &str, options: WriteOptions) -> Result<WriteStream> {
    Fastcopy::new(Config::load_or_default()).write(locator, options)
}
