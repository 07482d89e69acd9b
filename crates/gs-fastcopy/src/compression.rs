//! Compression selector
//!
//! gzip work is never done in-process. A parallel tool (`pigz`/`unpigz`) is
//! used when one is on the search path, the standard `gzip`/`gunzip`
//! otherwise. Both rename the file in place, toggling the `.gz` suffix.

use crate::config::ToolConfig;
use crate::process::{ProcessFailure, ToolCommand};
use crate::scratch::StagedFile;
use std::env;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Which way to run the gzip tools
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Append `.gz`, encoding the content
    Compress,
    /// Strip `.gz`, decoding the content
    Decompress,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Compress => f.write_str("compress"),
            Direction::Decompress => f.write_str("decompress"),
        }
    }
}

/// Picks and runs the gzip tool for a direction
#[derive(Debug, Clone)]
pub struct Compressor {
    tools: ToolConfig,
}

impl Compressor {
    /// Create a compressor from tool configuration
    pub fn new(tools: ToolConfig) -> Self {
        Self { tools }
    }

    /// Resolve the tool for `direction`: the parallel one if present, else
    /// the serial one. Falls back to the bare serial name when neither is
    /// found, leaving the spawn to report the problem.
    pub fn select(&self, direction: Direction) -> PathBuf {
        let (parallel, serial) = match direction {
            Direction::Compress => (&self.tools.parallel_compress, &self.tools.serial_compress),
            Direction::Decompress => (
                &self.tools.parallel_decompress,
                &self.tools.serial_decompress,
            ),
        };

        let search_path = self.search_path();
        find_executable(parallel, search_path.as_ref())
            .or_else(|| find_executable(serial, search_path.as_ref()))
            .unwrap_or_else(|| PathBuf::from(serial))
    }

    /// Run the tool on `staged` and return the file's new state.
    ///
    /// With `keep_original` the tool leaves its input in place and
    /// overwrites any existing output.
    pub fn apply(
        &self,
        direction: Direction,
        staged: StagedFile,
        keep_original: bool,
    ) -> std::result::Result<StagedFile, ProcessFailure> {
        let tool = self.select(direction);
        debug!(
            "Using {} to {} {}",
            tool.display(),
            direction,
            staged.path().display()
        );

        let mut command = ToolCommand::new(&tool);
        if keep_original {
            command = command.args(["--keep", "--force"]);
        }
        command.arg(staged.path()).run()?;

        let result = match direction {
            Direction::Compress => staged.compressed(),
            Direction::Decompress => staged.decompressed(),
        };

        if !result.path().exists() {
            return Err(ProcessFailure {
                program: tool.to_string_lossy().into_owned(),
                status: Some(0),
                stderr: format!("expected output {} was not produced", result.path().display()),
            });
        }

        Ok(result)
    }

    fn search_path(&self) -> Option<OsString> {
        match &self.tools.search_path {
            Some(path) => Some(OsString::from(path)),
            None => env::var_os("PATH"),
        }
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new(ToolConfig::default())
    }
}

/// Find an executable file called `name` in a `PATH`-style list
pub fn find_executable(name: &str, search_path: Option<&OsString>) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    env::split_paths(search_path?)
        .map(|dir| dir.join(name))
        .find(|path| is_executable(path))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::scratch::ScratchSession;
    use std::fs;
    use std::io::{Read, Write};
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn install_tool(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn compressor_with_search_path(dir: &Path) -> Compressor {
        Compressor::new(ToolConfig {
            search_path: Some(dir.to_string_lossy().into_owned()),
            ..Default::default()
        })
    }

    #[test]
    fn test_prefers_parallel_tool() {
        let bin = TempDir::new().unwrap();
        let pigz = install_tool(bin.path(), "pigz");
        install_tool(bin.path(), "gzip");
        let unpigz = install_tool(bin.path(), "unpigz");

        let compressor = compressor_with_search_path(bin.path());
        assert_eq!(compressor.select(Direction::Compress), pigz);
        assert_eq!(compressor.select(Direction::Decompress), unpigz);
    }

    #[test]
    fn test_falls_back_to_serial_tool() {
        let bin = TempDir::new().unwrap();
        let gzip = install_tool(bin.path(), "gzip");
        let gunzip = install_tool(bin.path(), "gunzip");

        let compressor = compressor_with_search_path(bin.path());
        assert_eq!(compressor.select(Direction::Compress), gzip);
        assert_eq!(compressor.select(Direction::Decompress), gunzip);
    }

    #[test]
    fn test_non_executable_is_skipped() {
        let bin = TempDir::new().unwrap();
        fs::write(bin.path().join("pigz"), "not a program").unwrap();
        let gzip = install_tool(bin.path(), "gzip");

        let compressor = compressor_with_search_path(bin.path());
        assert_eq!(compressor.select(Direction::Compress), gzip);
    }

    #[test]
    fn test_nothing_found_uses_serial_name() {
        let bin = TempDir::new().unwrap();
        let compressor = compressor_with_search_path(bin.path());
        assert_eq!(compressor.select(Direction::Compress), PathBuf::from("gzip"));
    }

    #[test]
    fn test_compress_then_decompress_in_place() {
        let session = ScratchSession::create(None).unwrap();
        let staged = session.stage("file_to_upload", false);
        fs::write(staged.path(), br#"{"A": 3}"#).unwrap();

        let compressor = Compressor::default();
        let staged = compressor
            .apply(Direction::Compress, staged, false)
            .unwrap();
        assert!(staged.is_compressed());
        assert_eq!(staged.path(), session.path().join("file_to_upload.gz"));
        assert!(!session.path().join("file_to_upload").exists());

        let mut decoded = Vec::new();
        flate2::read::GzDecoder::new(fs::File::open(staged.path()).unwrap())
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, br#"{"A": 3}"#);

        let staged = compressor
            .apply(Direction::Decompress, staged, false)
            .unwrap();
        assert_eq!(staged.path(), session.path().join("file_to_upload"));
        assert_eq!(fs::read(staged.path()).unwrap(), br#"{"A": 3}"#);
    }

    #[test]
    fn test_keep_original_on_decompress() {
        let session = ScratchSession::create(None).unwrap();
        let staged = session.stage("download", true);

        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"kept").unwrap();
        fs::write(staged.path(), encoder.finish().unwrap()).unwrap();
        // A stale output must be overwritten
        fs::write(session.path().join("download"), b"stale").unwrap();

        let original = staged.path().to_path_buf();
        let staged = Compressor::default()
            .apply(Direction::Decompress, staged, true)
            .unwrap();

        assert!(original.exists());
        assert_eq!(fs::read(staged.path()).unwrap(), b"kept");
    }

    #[test]
    fn test_tool_failure_is_reported() {
        let session = ScratchSession::create(None).unwrap();
        let staged = session.stage("download", true);
        fs::write(staged.path(), b"plain text, not gzip").unwrap();

        let failure = Compressor::default()
            .apply(Direction::Decompress, staged, false)
            .unwrap_err();
        assert_ne!(failure.status, Some(0));
        assert!(!failure.stderr.is_empty());
    }
}
