//! Common test fixtures for gs-fastcopy testing

use crate::TestDir;
use anyhow::Result;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// The small JSON document used throughout the tests
pub const JSON_BYTES: &[u8] = br#"{"A": 3}"#;

/// Gzip-encode `data`
pub fn gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Decode gzip-encoded `data`
pub fn gunzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoded = Vec::new();
    GzDecoder::new(data).read_to_end(&mut decoded)?;
    Ok(decoded)
}

/// Content big enough to span several upload chunks
pub fn large_payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Paths belonging to a fake `gcloud` executable
#[derive(Debug, Clone)]
pub struct FakeGcloud {
    /// The executable to configure as `copy_program`
    pub program: PathBuf,
    /// File each invocation appends its arguments to
    pub log: PathBuf,
}

impl FakeGcloud {
    /// Argument lines recorded so far, one per invocation
    pub fn invocations(&self) -> Result<Vec<String>> {
        if !self.log.exists() {
            return Ok(Vec::new());
        }
        Ok(std::fs::read_to_string(&self.log)?
            .lines()
            .map(str::to_string)
            .collect())
    }
}

/// Install a fake `gcloud` that serves `payload` for every `storage cp`.
///
/// Like the real tool it writes to its last argument; when that ends in
/// `.gz` the payload is written gzip-encoded.
#[cfg(unix)]
pub fn fake_gcloud(test_dir: &TestDir, payload: &[u8]) -> Result<FakeGcloud> {
    let plain = test_dir.create_file("fake-gcloud/payload", payload)?;
    let compressed = test_dir.create_file("fake-gcloud/payload.gz", &gzip(payload)?)?;
    let log = test_dir.path().join("fake-gcloud/invocations.log");

    let script = format!(
        r#"#!/bin/sh
echo "$@" >> '{log}'
for dest; do :; done
case "$dest" in
  *.gz) cat '{compressed}' > "$dest" ;;
  *) cat '{plain}' > "$dest" ;;
esac
"#,
        log = log.display(),
        compressed = compressed.display(),
        plain = plain.display(),
    );

    let program = install_script(test_dir, "fake-gcloud/gcloud", &script)?;
    Ok(FakeGcloud { program, log })
}

/// Install a fake `gcloud` that always fails with `message` on stderr
#[cfg(unix)]
pub fn failing_gcloud(test_dir: &TestDir, message: &str) -> Result<PathBuf> {
    let script = format!("#!/bin/sh\necho '{}' >&2\nexit 1\n", message);
    install_script(test_dir, "failing-gcloud/gcloud", &script)
}

/// Write an executable shell script into the test directory
#[cfg(unix)]
pub fn install_script(test_dir: &TestDir, name: &str, script: &str) -> Result<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    let path = test_dir.create_file(name, script.as_bytes())?;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
    Ok(path)
}

/// Read a file that may be gzip-encoded, judging by its name
pub fn read_maybe_gzipped(path: &Path) -> Result<Vec<u8>> {
    let data = std::fs::read(path)?;
    if path.to_string_lossy().ends_with(".gz") {
        gunzip(&data)
    } else {
        Ok(data)
    }
}
