//! Scratch sessions and the staged file they hold
//!
//! One [`ScratchSession`] backs exactly one `read` or `write`. Its directory
//! is removed when the session is closed or dropped, whichever comes first,
//! so every exit path (including errors and panics in caller code) cleans up.

use crate::locator::GZIP_SUFFIX;
use crate::{Error, Result};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

const SCRATCH_PREFIX: &str = "gs-fastcopy-";

/// An exclusive temporary directory for a single operation
#[derive(Debug)]
pub struct ScratchSession {
    dir: TempDir,
}

impl ScratchSession {
    /// Create a new session under `root`, or the system temp directory
    pub fn create(root: Option<&Path>) -> std::io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(SCRATCH_PREFIX);

        let dir = match root {
            Some(root) => {
                fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };

        debug!("Created scratch directory {}", dir.path().display());
        Ok(Self { dir })
    }

    /// Path of the scratch directory
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Name a staged file inside this session.
    ///
    /// The file itself is not created; `compressed` appends the gzip suffix.
    pub fn stage(&self, name: &str, compressed: bool) -> StagedFile {
        let staged = StagedFile {
            path: self.dir.path().join(name),
            compressed: false,
        };
        if compressed {
            staged.compressed()
        } else {
            staged
        }
    }

    /// Remove the scratch directory, reporting failure.
    ///
    /// Dropping the session also removes it, but swallows errors.
    pub fn close(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        debug!("Removing scratch directory {}", path.display());
        self.dir.close().map_err(|source| {
            warn!("Failed to remove scratch directory {}: {}", path.display(), source);
            Error::Cleanup { path, source }
        })
    }
}

/// The local buffer file and whether it is currently gzip-encoded.
///
/// The gzip tools rename files in place, so the path moves through the
/// pipeline: `download.gz` becomes `download`, `file_to_upload` becomes
/// `file_to_upload.gz`. The suffix and the flag always agree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    path: PathBuf,
    compressed: bool,
}

impl StagedFile {
    /// Current path of the staged file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the content on disk is gzip-encoded
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// State after compressing in place: the suffix is appended
    pub fn compressed(self) -> Self {
        if self.compressed {
            return self;
        }
        let mut name: OsString = self.path.into_os_string();
        name.push(GZIP_SUFFIX);
        Self {
            path: PathBuf::from(name),
            compressed: true,
        }
    }

    /// State after decompressing in place: the suffix is stripped
    pub fn decompressed(self) -> Self {
        if !self.compressed {
            return self;
        }
        Self {
            // ".gz" is the only extension ever appended
            path: self.path.with_extension(""),
            compressed: false,
        }
    }
}
