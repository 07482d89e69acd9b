//! Resource locators
//!
//! A locator is the caller-supplied string naming either a Google Cloud
//! Storage object (`gs://bucket/key`) or a local filesystem path.

use crate::{Error, Result};
use std::fmt;
use std::path::{Path, PathBuf};

/// URI scheme prefix that marks a remote object
pub const REMOTE_SCHEME: &str = "gs://";

/// Name suffix that selects the gzip path
pub const GZIP_SUFFIX: &str = ".gz";

/// Where a read comes from or a write goes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// An object in a remote bucket
    Remote(RemoteLocator),
    /// A local file
    Local(PathBuf),
}

/// A remote object plus the project billed for accessing it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLocator {
    /// Bucket name
    pub bucket: String,
    /// Object key within the bucket
    pub key: String,
    /// Project billed for the transfer (requester-pays buckets)
    pub billing_project: Option<String>,
}

impl Locator {
    /// Parse a locator string.
    ///
    /// Strings starting with `gs://` must name both a bucket and an object
    /// key; anything else is taken as a local path.
    pub fn parse(locator: &str) -> Result<Self> {
        if locator.is_empty() {
            return Err(invalid(locator, "locator is empty"));
        }

        let Some(rest) = locator.strip_prefix(REMOTE_SCHEME) else {
            return Ok(Locator::Local(PathBuf::from(locator)));
        };

        let (bucket, key) = rest
            .split_once('/')
            .ok_or_else(|| invalid(locator, "missing object name"))?;
        if bucket.is_empty() {
            return Err(invalid(locator, "missing bucket name"));
        }
        if key.is_empty() {
            return Err(invalid(locator, "missing object name"));
        }

        Ok(Locator::Remote(RemoteLocator {
            bucket: bucket.to_string(),
            key: key.to_string(),
            billing_project: None,
        }))
    }

    /// Attach a billing project; ignored for local paths
    pub fn with_billing_project(self, billing_project: Option<&str>) -> Self {
        match self {
            Locator::Remote(remote) => Locator::Remote(RemoteLocator {
                billing_project: billing_project.map(str::to_string),
                ..remote
            }),
            local => local,
        }
    }

    /// Whether the name asks for gzip (de)compression
    pub fn is_compressed(&self) -> bool {
        match self {
            Locator::Remote(remote) => remote.key.ends_with(GZIP_SUFFIX),
            Locator::Local(path) => path
                .as_os_str()
                .to_string_lossy()
                .ends_with(GZIP_SUFFIX),
        }
    }

    /// Whether this names a remote object
    pub fn is_remote(&self) -> bool {
        matches!(self, Locator::Remote(_))
    }

    /// Local path, if this is a local locator
    pub fn as_local(&self) -> Option<&Path> {
        match self {
            Locator::Local(path) => Some(path),
            Locator::Remote(_) => None,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Remote(remote) => remote.fmt(f),
            Locator::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

impl fmt::Display for RemoteLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/{}", REMOTE_SCHEME, self.bucket, self.key)
    }
}

fn invalid(locator: &str, reason: &str) -> Error {
    Error::InvalidLocator {
        locator: locator.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_locator_parsing() {
        let locator = Locator::parse("gs://my-bucket/path/to/file.json").unwrap();
        let Locator::Remote(remote) = &locator else {
            panic!("expected remote locator, got {:?}", locator);
        };
        assert_eq!(remote.bucket, "my-bucket");
        assert_eq!(remote.key, "path/to/file.json");
        assert_eq!(remote.billing_project, None);
        assert_eq!(locator.to_string(), "gs://my-bucket/path/to/file.json");
        assert!(locator.is_remote());
        assert!(!locator.is_compressed());
    }

    #[test]
    fn test_local_locator_parsing() {
        let locator = Locator::parse("data/file.json.gz").unwrap();
        assert_eq!(locator.as_local(), Some(Path::new("data/file.json.gz")));
        assert!(locator.is_compressed());
        assert!(!locator.is_remote());

        // Other schemes are not remote
        let locator = Locator::parse("s3://bucket/file").unwrap();
        assert!(!locator.is_remote());
    }

    #[test]
    fn test_invalid_locators() {
        assert!(matches!(
            Locator::parse(""),
            Err(Error::InvalidLocator { .. })
        ));
        assert!(Locator::parse("gs://").is_err());
        assert!(Locator::parse("gs://bucket").is_err());
        assert!(Locator::parse("gs://bucket/").is_err());
        assert!(Locator::parse("gs:///key").is_err());
    }

    #[test]
    fn test_compression_intent_is_suffix_only() {
        assert!(Locator::parse("gs://b/file.json.gz").unwrap().is_compressed());
        assert!(!Locator::parse("gs://b/file.gzip").unwrap().is_compressed());
        assert!(!Locator::parse("gs://b/file.gz.json").unwrap().is_compressed());
    }

    #[test]
    fn test_billing_project() {
        let locator = Locator::parse("gs://b/k")
            .unwrap()
            .with_billing_project(Some("my-project"));
        match locator {
            Locator::Remote(remote) => {
                assert_eq!(remote.billing_project.as_deref(), Some("my-project"))
            }
            other => panic!("expected remote locator, got {:?}", other),
        }

        let local = Locator::parse("file.txt")
            .unwrap()
            .with_billing_project(Some("my-project"));
        assert_eq!(local, Locator::Local(PathBuf::from("file.txt")));
    }
}
