//! Scoped read and write streams
//!
//! Each `read` or `write` stages the object's bytes in a fresh scratch
//! session:
//!
//! - `read`: stage (download or symlink) → gunzip if `.gz` → hand out a
//!   [`ReadStream`] over the plain file.
//! - `write`: hand out a [`WriteStream`] over an empty file → on
//!   [`WriteStream::finish`] close it → gzip if `.gz` → upload or move.
//!
//! The scratch directory goes away when the stream is closed, finished or
//! dropped, including when any step fails.

use crate::compression::{Compressor, Direction};
use crate::config::Config;
use crate::gcs::GcsTransfer;
use crate::locator::Locator;
use crate::scratch::{ScratchSession, StagedFile};
use crate::transfer::{available_cpus, Backend, RemoteTransfer, TransferParams};
use crate::{Error, Result};
use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

const DOWNLOAD_NAME: &str = "download";
const UPLOAD_NAME: &str = "file_to_upload";

/// Options for [`Fastcopy::write`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Upload workers; defaults to the configured value, then available CPUs
    pub max_workers: Option<usize>,
    /// Upload chunk size in bytes; defaults to the configured value, then
    /// the backend's own default
    pub chunk_size: Option<usize>,
    /// Project billed for the upload
    pub billing_project: Option<String>,
}

impl WriteOptions {
    /// Set the number of upload workers
    pub fn max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = Some(max_workers);
        self
    }

    /// Set the upload chunk size in bytes
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    /// Bill the upload to `project`
    pub fn billing_project(mut self, project: impl Into<String>) -> Self {
        self.billing_project = Some(project.into());
        self
    }
}

/// Entry point for streaming reads and writes
#[derive(Debug, Clone)]
pub struct Fastcopy {
    config: Config,
    compressor: Compressor,
    remote: Arc<dyn RemoteTransfer>,
}

impl Fastcopy {
    /// Create a client from configuration, using Google Cloud Storage for
    /// remote locators
    pub fn new(config: Config) -> Self {
        let remote = Arc::new(GcsTransfer::from_config(&config.transfer));
        Self {
            compressor: Compressor::new(config.tools.clone()),
            config,
            remote,
        }
    }

    /// Replace the remote transfer backend
    pub fn with_remote(mut self, remote: Arc<dyn RemoteTransfer>) -> Self {
        self.remote = remote;
        self
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Open `locator` for reading.
    ///
    /// The returned stream yields the fully downloaded and, for `.gz` names,
    /// decompressed content. Nothing is handed out if any step fails.
    pub fn read(&self, locator: &str, billing_project: Option<&str>) -> Result<ReadStream> {
        let locator = Locator::parse(locator)?.with_billing_project(billing_project);

        let session = ScratchSession::create(self.config.scratch.root.as_deref())
            .map_err(stage_error(&locator))?;
        let mut staged = session.stage(DOWNLOAD_NAME, locator.is_compressed());

        let backend = Backend::select(&locator, self.remote.as_ref());
        let origin = backend.stage_in(staged.path())?;

        if staged.is_compressed() {
            staged = self
                .compressor
                .apply(Direction::Decompress, staged, origin.keep_original())
                .map_err(|source| Error::Compression {
                    locator: locator.to_string(),
                    direction: Direction::Decompress,
                    source,
                })?;
        }

        let file = File::open(staged.path()).map_err(stage_error(&locator))?;
        debug!("Reading {} from {}", locator, staged.path().display());

        Ok(ReadStream {
            file,
            staged,
            session,
        })
    }

    /// Open `locator` for writing.
    ///
    /// Content reaches the destination only when [`WriteStream::finish`]
    /// succeeds; a stream dropped before that is discarded.
    pub fn write(&self, locator: &str, options: WriteOptions) -> Result<WriteStream> {
        let destination =
            Locator::parse(locator)?.with_billing_project(options.billing_project.as_deref());

        let params = self.transfer_params(&options)?;

        let session = ScratchSession::create(self.config.scratch.root.as_deref())
            .map_err(stage_error(&destination))?;
        let staged = session.stage(UPLOAD_NAME, false);
        let file = File::create(staged.path()).map_err(stage_error(&destination))?;
        debug!("Writing {} via {}", destination, staged.path().display());

        Ok(WriteStream {
            writer: BufWriter::new(file),
            staged,
            destination,
            params,
            compressor: self.compressor.clone(),
            remote: self.remote.clone(),
            session,
        })
    }

    /// Run `body` against a read stream, then close it.
    ///
    /// If `body` fails its error is returned and the stream is still cleaned
    /// up; a cleanup failure is only reported when nothing else went wrong.
    pub fn read_with<T, E, F>(
        &self,
        locator: &str,
        billing_project: Option<&str>,
        body: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut ReadStream) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        let mut stream = self.read(locator, billing_project)?;
        let value = body(&mut stream)?;
        stream.close()?;
        Ok(value)
    }

    /// Run `body` against a write stream, then finish it.
    ///
    /// If `body` fails the content is discarded and nothing is delivered.
    pub fn write_with<T, E, F>(
        &self,
        locator: &str,
        options: WriteOptions,
        body: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut WriteStream) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        let mut stream = self.write(locator, options)?;
        match body(&mut stream) {
            Ok(value) => {
                stream.finish()?;
                Ok(value)
            }
            Err(e) => {
                warn!("Discarding write to {}", stream.destination);
                Err(e)
            }
        }
    }

    /// Upload tuning for one write: caller options, then configuration, then
    /// defaults
    fn transfer_params(&self, options: &WriteOptions) -> Result<TransferParams> {
        let chunk_size = match options.chunk_size {
            Some(size) => Some(size),
            None => self
                .config
                .transfer
                .chunk_size
                .map(|size| {
                    usize::try_from(size).map_err(|_| {
                        Error::Config(format!("chunk_size {} does not fit in memory", size))
                    })
                })
                .transpose()?,
        };

        Ok(TransferParams {
            max_workers: options
                .max_workers
                .or(self.config.transfer.max_workers)
                .unwrap_or_else(available_cpus),
            chunk_size,
        })
    }
}

fn stage_error(locator: &Locator) -> impl Fn(io::Error) -> Error + '_ {
    move |source| Error::Stage {
        locator: locator.to_string(),
        source,
    }
}

impl Default for Fastcopy {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

/// Readable handle on a staged, decompressed object
#[derive(Debug)]
pub struct ReadStream {
    // Declared before `session` so the handle closes before the directory goes
    file: File,
    staged: StagedFile,
    session: ScratchSession,
}

impl ReadStream {
    /// Path of the materialized file, valid until the stream is closed
    pub fn path(&self) -> &Path {
        self.staged.path()
    }

    /// Close the handle and remove the scratch session
    pub fn close(self) -> Result<()> {
        let ReadStream { file, session, .. } = self;
        drop(file);
        session.close()
    }
}

impl Read for ReadStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Seek for ReadStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

/// Writable handle on the staged file for an upload
#[derive(Debug)]
pub struct WriteStream {
    writer: BufWriter<File>,
    staged: StagedFile,
    destination: Locator,
    params: TransferParams,
    compressor: Compressor,
    remote: Arc<dyn RemoteTransfer>,
    session: ScratchSession,
}

impl WriteStream {
    /// Where the content will be delivered
    pub fn destination(&self) -> &Locator {
        &self.destination
    }

    /// Upload parameters this stream will use
    pub fn params(&self) -> &TransferParams {
        &self.params
    }

    /// Close the handle, compress if the destination ends in `.gz`, deliver,
    /// and remove the scratch session.
    pub fn finish(self) -> Result<()> {
        let WriteStream {
            writer,
            staged,
            destination,
            params,
            compressor,
            remote,
            session,
        } = self;

        let file = writer
            .into_inner()
            .map_err(|e| e.into_error())
            .map_err(stage_error(&destination))?;
        file.sync_all().map_err(stage_error(&destination))?;
        drop(file);

        let staged = if destination.is_compressed() {
            compressor
                .apply(Direction::Compress, staged, false)
                .map_err(|source| Error::Compression {
                    locator: destination.to_string(),
                    direction: Direction::Compress,
                    source,
                })?
        } else {
            staged
        };

        Backend::select(&destination, remote.as_ref()).deliver(staged.path(), &params)?;
        session.close()
    }
}

impl Write for WriteStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
