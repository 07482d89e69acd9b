//! Google Cloud Storage transfer backend
//!
//! Downloads shell out to `gcloud storage cp`, which already does sliced
//! parallel downloads. Uploads go through `object_store`'s multipart API:
//! the file is cut into `chunk_size` parts with at most `max_workers` parts in
//! flight at once.

use crate::config::TransferConfig;
use crate::locator::RemoteLocator;
use crate::process::ToolCommand;
use crate::runtime::get_runtime;
use crate::transfer::{RemoteTransfer, TransferParams};
use crate::{Error, Result};
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload, WriteMultipart};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Upload part size when none is configured (32 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 32 * 1024 * 1024;

/// Header that bills requests to a project other than the bucket owner's
#[cfg_attr(not(feature = "gcp"), allow(dead_code))]
const USER_PROJECT_HEADER: &str = "x-goog-user-project";

/// Transfers to and from `gs://` objects
#[derive(Debug, Clone)]
pub struct GcsTransfer {
    /// Program invoked as `<program> storage cp`
    copy_program: String,
    /// Store used for every upload instead of building one per bucket
    store: Option<Arc<dyn ObjectStore>>,
}

impl GcsTransfer {
    /// Create a backend using `gcloud` for downloads and environment
    /// credentials for uploads
    pub fn new() -> Self {
        Self::from_config(&TransferConfig::default())
    }

    /// Create a backend from transfer configuration
    pub fn from_config(config: &TransferConfig) -> Self {
        Self {
            copy_program: config.copy_program.clone(),
            store: None,
        }
    }

    /// Use a different program for `storage cp`
    pub fn with_copy_program(mut self, program: impl Into<String>) -> Self {
        self.copy_program = program.into();
        self
    }

    /// Upload into `store` regardless of the destination bucket
    pub fn with_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    fn store_for(&self, dest: &RemoteLocator) -> Result<Arc<dyn ObjectStore>> {
        match &self.store {
            Some(store) => Ok(store.clone()),
            None => build_gcs_store(dest),
        }
    }
}

impl Default for GcsTransfer {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteTransfer for GcsTransfer {
    fn download(&self, source: &RemoteLocator, dest: &Path) -> Result<()> {
        let mut command = ToolCommand::new(&self.copy_program).args(["storage", "cp"]);
        if let Some(project) = &source.billing_project {
            command = command.arg("--billing-project").arg(project);
        }

        command
            .arg(source.to_string())
            .arg(dest)
            .run()
            .map_err(|failure| Error::Download {
                locator: source.to_string(),
                source: failure,
            })
    }

    fn upload(&self, source: &Path, dest: &RemoteLocator, params: &TransferParams) -> Result<()> {
        let store = self.store_for(dest)?;
        let location = ObjectPath::from(dest.key.as_str());
        let chunk_size = params.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE).max(1);
        let max_workers = params.max_workers.max(1);

        let staging_error = |source| Error::Stage {
            locator: dest.to_string(),
            source,
        };
        let mut file = File::open(source).map_err(staging_error)?;
        let length = file.metadata().map_err(staging_error)?.len();

        let runtime = get_runtime()?;
        runtime
            .block_on(async {
                if length == 0 {
                    debug!("Uploading empty object to {}", dest);
                    store.put(&location, PutPayload::new()).await?;
                    return Ok(());
                }
                upload_chunks(store.as_ref(), &location, &mut file, chunk_size, max_workers).await
            })
            .map_err(|e: UploadError| match e {
                UploadError::Io(source) => staging_error(source),
                UploadError::Store(source) => Error::Upload {
                    locator: dest.to_string(),
                    message: source.to_string(),
                },
            })
    }
}

#[derive(Debug)]
enum UploadError {
    Io(std::io::Error),
    Store(object_store::Error),
}

impl From<std::io::Error> for UploadError {
    fn from(err: std::io::Error) -> Self {
        UploadError::Io(err)
    }
}

impl From<object_store::Error> for UploadError {
    fn from(err: object_store::Error) -> Self {
        UploadError::Store(err)
    }
}

async fn upload_chunks(
    store: &dyn ObjectStore,
    location: &ObjectPath,
    file: &mut File,
    chunk_size: usize,
    max_workers: usize,
) -> std::result::Result<(), UploadError> {
    let upload = store.put_multipart(location).await?;
    let mut writer = WriteMultipart::new_with_chunk_size(upload, chunk_size);

    match fill_parts(&mut writer, file, chunk_size, max_workers).await {
        Ok(()) => {
            writer.finish().await?;
            Ok(())
        }
        Err(e) => {
            if let Err(abort_err) = writer.abort().await {
                warn!("Failed to abort upload to {}: {}", location, abort_err);
            }
            Err(e)
        }
    }
}

async fn fill_parts(
    writer: &mut WriteMultipart,
    file: &mut File,
    chunk_size: usize,
    max_workers: usize,
) -> std::result::Result<(), UploadError> {
    let mut buffer = vec![0u8; chunk_size];
    loop {
        let n = read_chunk(file, &mut buffer)?;
        if n == 0 {
            return Ok(());
        }
        writer.wait_for_capacity(max_workers).await?;
        trace!("Queueing {} bytes", n);
        writer.write(&buffer[..n]);
    }
}

/// Read until `buffer` is full or the file ends
fn read_chunk(file: &mut File, buffer: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match file.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(feature = "gcp")]
fn build_gcs_store(dest: &RemoteLocator) -> Result<Arc<dyn ObjectStore>> {
    use http::{HeaderMap, HeaderName, HeaderValue};
    use object_store::gcp::GoogleCloudStorageBuilder;
    use object_store::ClientOptions;

    let mut builder = GoogleCloudStorageBuilder::from_env().with_bucket_name(&dest.bucket);

    if let Some(project) = &dest.billing_project {
        let value = HeaderValue::from_str(project).map_err(|_| Error::InvalidLocator {
            locator: dest.to_string(),
            reason: format!("invalid billing project '{}'", project),
        })?;
        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static(USER_PROJECT_HEADER), value);
        builder = builder.with_client_options(ClientOptions::new().with_default_headers(headers));
    }

    let store = builder.build().map_err(|e| Error::Upload {
        locator: dest.to_string(),
        message: e.to_string(),
    })?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "gcp"))]
fn build_gcs_store(dest: &RemoteLocator) -> Result<Arc<dyn ObjectStore>> {
    Err(Error::Config(format!(
        "cannot upload to {}: built without the `gcp` feature",
        dest
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;
    use std::fs;
    use tempfile::TempDir;

    fn remote(key: &str) -> RemoteLocator {
        RemoteLocator {
            bucket: "bucket".to_string(),
            key: key.to_string(),
            billing_project: None,
        }
    }

    fn fetch(store: &InMemory, key: &str) -> Vec<u8> {
        get_runtime()
            .unwrap()
            .block_on(async {
                store
                    .get(&ObjectPath::from(key))
                    .await
                    .unwrap()
                    .bytes()
                    .await
                    .unwrap()
            })
            .to_vec()
    }

    #[test]
    fn test_upload_in_several_chunks() {
        let store = Arc::new(InMemory::new());
        let transfer = GcsTransfer::new().with_store(store.clone());

        let dir = TempDir::new().unwrap();
        let source = dir.path().join("file_to_upload");
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        fs::write(&source, &data).unwrap();

        let params = TransferParams {
            max_workers: 3,
            chunk_size: Some(1024),
        };
        transfer
            .upload(&source, &remote("dir/data.bin"), &params)
            .unwrap();

        assert_eq!(fetch(&store, "dir/data.bin"), data);
    }

    #[test]
    fn test_upload_empty_file() {
        let store = Arc::new(InMemory::new());
        let transfer = GcsTransfer::new().with_store(store.clone());

        let dir = TempDir::new().unwrap();
        let source = dir.path().join("file_to_upload");
        fs::write(&source, b"").unwrap();

        let params = TransferParams {
            max_workers: 1,
            chunk_size: None,
        };
        transfer.upload(&source, &remote("empty"), &params).unwrap();
        assert!(fetch(&store, "empty").is_empty());
    }

    #[test]
    fn test_upload_missing_source() {
        let transfer = GcsTransfer::new().with_store(Arc::new(InMemory::new()));
        let params = TransferParams {
            max_workers: 1,
            chunk_size: None,
        };
        let err = transfer
            .upload(Path::new("/nonexistent/file_to_upload"), &remote("k"), &params)
            .unwrap_err();
        assert!(err.to_string().contains("gs://bucket/k"));
        match err {
            Error::Stage { source, .. } => assert_eq!(source.kind(), std::io::ErrorKind::NotFound),
            other => panic!("expected stage error, got {:?}", other),
        }
    }

    #[test]
    fn test_read_chunk_fills_buffer() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data");
        fs::write(&path, vec![7u8; 2500]).unwrap();

        let mut file = File::open(&path).unwrap();
        let mut buffer = vec![0u8; 1000];
        assert_eq!(read_chunk(&mut file, &mut buffer).unwrap(), 1000);
        assert_eq!(read_chunk(&mut file, &mut buffer).unwrap(), 1000);
        assert_eq!(read_chunk(&mut file, &mut buffer).unwrap(), 500);
        assert_eq!(read_chunk(&mut file, &mut buffer).unwrap(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_download_failure_carries_stderr() {
        let dir = TempDir::new().unwrap();
        let transfer = GcsTransfer::new().with_copy_program("false");
        let err = transfer
            .download(&remote("file.json"), &dir.path().join("download"))
            .unwrap_err();

        match err {
            Error::Download { locator, source } => {
                assert_eq!(locator, "gs://bucket/file.json");
                assert_eq!(source.status, Some(1));
            }
            other => panic!("expected download error, got {:?}", other),
        }
    }
}
