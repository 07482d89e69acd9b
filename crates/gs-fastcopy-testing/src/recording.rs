//! In-process remote backend that records every call

use crate::fixtures::gzip;
use gs_fastcopy::{Error, RemoteLocator, RemoteTransfer, Result, TransferParams};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// One recorded download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    /// Object that was requested
    pub source: RemoteLocator,
    /// Local path it was written to
    pub dest: PathBuf,
}

/// One recorded upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    /// Local file name handed to the backend
    pub file_name: String,
    /// Bytes of the local file at upload time, as stored on disk
    pub bytes: Vec<u8>,
    /// Destination object
    pub dest: RemoteLocator,
    /// Parameters the upload was given
    pub params: TransferParams,
}

/// A [`RemoteTransfer`] that serves a fixed payload and captures uploads
#[derive(Debug, Default)]
pub struct RecordingTransfer {
    payload: Vec<u8>,
    upload_failure: Option<String>,
    downloads: Mutex<Vec<Download>>,
    uploads: Mutex<Vec<Upload>>,
}

impl RecordingTransfer {
    /// Serve `payload` for downloads (gzip-encoded when the staged name ends in `.gz`)
    pub fn serving(payload: &[u8]) -> Self {
        Self {
            payload: payload.to_vec(),
            ..Default::default()
        }
    }

    /// Reject every upload with `message`, recording nothing
    pub fn rejecting_uploads(message: &str) -> Self {
        Self {
            upload_failure: Some(message.to_string()),
            ..Default::default()
        }
    }

    /// Downloads performed so far
    pub fn downloads(&self) -> Vec<Download> {
        self.downloads.lock().map(|d| d.clone()).unwrap_or_default()
    }

    /// Uploads performed so far
    pub fn uploads(&self) -> Vec<Upload> {
        self.uploads.lock().map(|u| u.clone()).unwrap_or_default()
    }

    /// Total number of remote calls
    pub fn call_count(&self) -> usize {
        self.downloads().len() + self.uploads().len()
    }
}

impl RemoteTransfer for RecordingTransfer {
    fn download(&self, source: &RemoteLocator, dest: &Path) -> Result<()> {
        let contents = if dest.to_string_lossy().ends_with(".gz") {
            gzip(&self.payload).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?
        } else {
            self.payload.clone()
        };
        std::fs::write(dest, contents)?;

        if let Ok(mut downloads) = self.downloads.lock() {
            downloads.push(Download {
                source: source.clone(),
                dest: dest.to_path_buf(),
            });
        }
        Ok(())
    }

    fn upload(&self, source: &Path, dest: &RemoteLocator, params: &TransferParams) -> Result<()> {
        if let Some(message) = &self.upload_failure {
            return Err(Error::Upload {
                locator: dest.to_string(),
                message: message.clone(),
            });
        }

        let upload = Upload {
            file_name: source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            bytes: std::fs::read(source)?,
            dest: dest.clone(),
            params: *params,
        };

        if let Ok(mut uploads) = self.uploads.lock() {
            uploads.push(upload);
        }
        Ok(())
    }
}
