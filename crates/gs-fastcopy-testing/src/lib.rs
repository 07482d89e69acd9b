//! Testing utilities and fixtures for gs-fastcopy
//!
//! This crate provides temporary test directories, gzip and fake-`gcloud`
//! fixtures, a recording remote backend, and filesystem assertions for
//! testing gs-fastcopy.

use anyhow::Result;
use gs_fastcopy::config::{Config, ScratchConfig};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

pub mod assertions;
pub mod fixtures;
pub mod recording;

pub use recording::{Download, RecordingTransfer, Upload};

/// Creates a temporary test directory with cleanup on drop
#[derive(Debug)]
pub struct TestDir {
    dir: TempDir,
}

impl TestDir {
    /// Creates a new temporary test directory
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: TempDir::new()?,
        })
    }

    /// Creates a new temporary test directory under `parent`
    pub fn new_in(parent: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            dir: TempDir::new_in(parent)?,
        })
    }

    /// Returns the path to the temporary directory
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Creates a file with the given name and content in the test directory
    pub fn create_file(&self, name: &str, content: &[u8]) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Directory used for scratch sessions by [`TestDir::config`]
    pub fn scratch_root(&self) -> PathBuf {
        self.dir.path().join("scratch")
    }

    /// Default configuration with scratch sessions kept inside this directory
    pub fn config(&self) -> Config {
        Config {
            scratch: ScratchConfig {
                root: Some(self.scratch_root()),
            },
            ..Default::default()
        }
    }
}

/// Install a `tracing` subscriber honouring `RUST_LOG`; safe to call repeatedly
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_dir() {
        let test_dir = TestDir::new().unwrap();
        assert!(test_dir.path().exists());
    }

    #[test]
    fn test_create_file() {
        let test_dir = TestDir::new().unwrap();
        let file_path = test_dir.create_file("sub/test.txt", b"Hello, World!").unwrap();
        assert!(file_path.exists());
        assert_eq!(std::fs::read(&file_path).unwrap(), b"Hello, World!");
    }

    #[test]
    fn test_config_uses_scratch_root() {
        let test_dir = TestDir::new().unwrap();
        let config = test_dir.config();
        assert_eq!(config.scratch.root, Some(test_dir.scratch_root()));
        assert_eq!(config.transfer.copy_program, "gcloud");
    }
}
