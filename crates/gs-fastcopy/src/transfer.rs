//! Transfer backends
//!
//! Moving bytes between the scratch session and the final location is done by
//! one of two backends, picked once per operation from the locator:
//! a [`RemoteTransfer`] implementation for `gs://` objects, or the local fast
//! path (symlink in, rename out) for filesystem paths.

use crate::locator::{Locator, RemoteLocator};
use crate::{Error, Result};
use std::fmt::Debug;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Upload tuning, resolved before the operation starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferParams {
    /// Maximum number of chunks in flight
    pub max_workers: usize,
    /// Chunk size in bytes; `None` leaves it to the backend
    pub chunk_size: Option<usize>,
}

/// Moves whole files to and from the remote store
pub trait RemoteTransfer: Send + Sync + Debug {
    /// Copy the remote object `source` to the local file `dest`
    fn download(&self, source: &RemoteLocator, dest: &Path) -> Result<()>;

    /// Upload the local file `source` to the remote object `dest`
    fn upload(&self, source: &Path, dest: &RemoteLocator, params: &TransferParams) -> Result<()>;
}

/// How the staged file came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StageOrigin {
    /// Downloaded into scratch; scratch owns it
    Downloaded,
    /// Symlinked to the caller's file, which must survive
    Linked,
}

impl StageOrigin {
    /// Whether decompression must leave its input alone
    pub(crate) fn keep_original(self) -> bool {
        matches!(self, StageOrigin::Linked)
    }
}

/// The backend for one operation
#[derive(Debug)]
pub(crate) enum Backend<'a> {
    Remote {
        transfer: &'a dyn RemoteTransfer,
        locator: &'a RemoteLocator,
    },
    Local {
        path: &'a Path,
    },
}

impl<'a> Backend<'a> {
    pub(crate) fn select(locator: &'a Locator, transfer: &'a dyn RemoteTransfer) -> Self {
        match locator {
            Locator::Remote(locator) => Backend::Remote { transfer, locator },
            Locator::Local(path) => Backend::Local { path },
        }
    }

    /// Make the source's bytes available at `staged`
    pub(crate) fn stage_in(&self, staged: &Path) -> Result<StageOrigin> {
        match self {
            Backend::Remote { transfer, locator } => {
                debug!("Downloading {} to {}", locator, staged.display());
                transfer.download(locator, staged)?;
                Ok(StageOrigin::Downloaded)
            }
            Backend::Local { path } => {
                link_local(path, staged).map_err(|source| Error::Stage {
                    locator: path.display().to_string(),
                    source,
                })?;
                Ok(StageOrigin::Linked)
            }
        }
    }

    /// Hand the finished staged file to its destination
    pub(crate) fn deliver(&self, staged: &Path, params: &TransferParams) -> Result<()> {
        match self {
            Backend::Remote { transfer, locator } => {
                debug!(
                    "Uploading {} to {} with {} workers",
                    staged.display(),
                    locator,
                    params.max_workers
                );
                transfer.upload(staged, locator, params)?;
                info!("Uploaded {}", locator);
                Ok(())
            }
            Backend::Local { path } => {
                move_file(staged, path).map_err(|source| Error::Deliver {
                    path: path.to_path_buf(),
                    source,
                })?;
                info!("Wrote {}", path.display());
                Ok(())
            }
        }
    }
}

/// Symlink `staged` to the caller's file, which must already exist
fn link_local(path: &Path, staged: &Path) -> std::io::Result<()> {
    let source = std::path::absolute(path)?;
    if !fs::metadata(&source)?.is_file() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "not a regular file",
        ));
    }
    debug!("Linking {} to {}", staged.display(), source.display());
    symlink_file(&source, staged)
}

/// Rename `from` to `to`, copying when a rename is not possible
/// (different filesystems, for instance).
fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) => {
            debug!(
                "Rename of {} failed ({}), copying instead",
                from.display(),
                e
            );
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
    }
}

#[cfg(unix)]
fn symlink_file(original: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(windows)]
fn symlink_file(original: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(original, link)
}

/// Number of CPUs this process may run on.
///
/// Uses the scheduler affinity mask where the platform has one, so a process
/// pinned to a subset of cores does not oversubscribe them; otherwise the
/// total logical CPU count.
pub fn available_cpus() -> usize {
    affinity_cpus().unwrap_or_else(num_cpus::get).max(1)
}

#[cfg(target_os = "linux")]
fn affinity_cpus() -> Option<usize> {
    // SAFETY: cpu_set_t is plain data, and sched_getaffinity writes at most
    // size_of::<cpu_set_t>() bytes into it.
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        if libc::sched_getaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &mut set) != 0 {
            return None;
        }
        usize::try_from(libc::CPU_COUNT(&set)).ok().filter(|&n| n > 0)
    }
}

#[cfg(not(target_os = "linux"))]
fn affinity_cpus() -> Option<usize> {
    None
}
