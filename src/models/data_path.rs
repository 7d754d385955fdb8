//! Typed data locations: S3 objects, EFS paths, and plain local paths.
//!
//! All three serialize as plain strings:
//!
//! ```text
//! s3://bucket/some/key        -> DataPath::S3
//! fs-0123abcd:/scratch/run-1  -> DataPath::Efs
//! /opt/efs/shared/input       -> DataPath::Local
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{AppError, Result};

const S3_SCHEME: &str = "s3://";

/// An `s3://bucket/key` URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct S3Uri {
    bucket: String,
    key: String,
}

impl S3Uri {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Result<Self> {
        let bucket = bucket.into();
        if bucket.is_empty() || bucket.contains('/') {
            return Err(AppError::invalid_input(format!(
                "invalid S3 bucket name '{bucket}'"
            )));
        }
        Ok(Self {
            bucket,
            key: key.into(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Append a relative segment to the key, inserting exactly one `/`.
    pub fn join(&self, segment: &str) -> Self {
        let segment = segment.trim_start_matches('/');
        let key = if self.key.is_empty() {
            segment.to_string()
        } else {
            format!("{}/{}", self.key.trim_end_matches('/'), segment)
        };
        Self {
            bucket: self.bucket.clone(),
            key,
        }
    }
}

impl fmt::Display for S3Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/{}", S3_SCHEME, self.bucket, self.key)
    }
}

impl FromStr for S3Uri {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let rest = s
            .strip_prefix(S3_SCHEME)
            .ok_or_else(|| AppError::invalid_input(format!("'{s}' is not an s3:// URI")))?;
        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        Self::new(bucket, key)
    }
}

/// A path inside an EFS file system, rendered as `{file_system_id}:{path}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EfsPath {
    file_system_id: String,
    path: PathBuf,
}

impl EfsPath {
    pub fn new(file_system_id: impl Into<String>, path: impl Into<PathBuf>) -> Result<Self> {
        let file_system_id = file_system_id.into();
        let path = path.into();
        if !file_system_id.starts_with("fs-") {
            return Err(AppError::invalid_input(format!(
                "'{file_system_id}' is not an EFS file system id"
            )));
        }
        if !path.is_absolute() {
            return Err(AppError::invalid_input(format!(
                "EFS path '{}' must be absolute",
                path.display()
            )));
        }
        Ok(Self {
            file_system_id,
            path,
        })
    }

    pub fn file_system_id(&self) -> &str {
        &self.file_system_id
    }

    /// Absolute path relative to the file system root.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join(&self, segment: impl AsRef<Path>) -> Self {
        Self {
            file_system_id: self.file_system_id.clone(),
            path: self.path.join(segment),
        }
    }
}

impl fmt::Display for EfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file_system_id, self.path.display())
    }
}

impl FromStr for EfsPath {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let (fs, path) = s
            .split_once(':')
            .ok_or_else(|| AppError::invalid_input(format!("'{s}' is not an EFS path")))?;
        Self::new(fs, path)
    }
}

/// Any location a data-sync request can read from or write to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataPath {
    S3(S3Uri),
    Efs(EfsPath),
    Local(PathBuf),
}

impl DataPath {
    /// Whether the data lives outside the container and must be synced in or out.
    pub fn is_remote(&self) -> bool {
        !matches!(self, DataPath::Local(_))
    }
}

impl fmt::Display for DataPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataPath::S3(uri) => write!(f, "{uri}"),
            DataPath::Efs(path) => write!(f, "{path}"),
            DataPath::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

impl FromStr for DataPath {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        if s.starts_with(S3_SCHEME) {
            return Ok(DataPath::S3(s.parse()?));
        }
        if let Some((fs, path)) = s.split_once(':') {
            if fs.starts_with("fs-") && path.starts_with('/') {
                return Ok(DataPath::Efs(EfsPath::new(fs, path)?));
            }
        }
        Ok(DataPath::Local(PathBuf::from(s)))
    }
}

impl From<S3Uri> for DataPath {
    fn from(uri: S3Uri) -> Self {
        DataPath::S3(uri)
    }
}

impl From<EfsPath> for DataPath {
    fn from(path: EfsPath) -> Self {
        DataPath::Efs(path)
    }
}

macro_rules! string_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

string_serde!(S3Uri);
string_serde!(EfsPath);
string_serde!(DataPath);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s3_uri_parse_and_join() {
        let uri: S3Uri = "s3://bucket/key".parse().unwrap();
        assert_eq!(uri.bucket(), "bucket");
        assert_eq!(uri.key(), "key");
        assert_eq!(uri.join("outs").to_string(), "s3://bucket/key/outs");

        let prefix: S3Uri = "s3://bucket/outs/".parse().unwrap();
        assert_eq!(prefix.join("/c").to_string(), "s3://bucket/outs/c");

        let root: S3Uri = "s3://bucket".parse().unwrap();
        assert_eq!(root.join("x").to_string(), "s3://bucket/x");
    }

    #[test]
    fn test_s3_uri_rejects_other_schemes() {
        assert!("https://bucket/key".parse::<S3Uri>().is_err());
        assert!("s3:///key".parse::<S3Uri>().is_err());
    }

    #[test]
    fn test_data_path_variants() {
        assert!(matches!(
            "s3://bucket/key".parse::<DataPath>().unwrap(),
            DataPath::S3(_)
        ));
        let efs: DataPath = "fs-1234abcd:/scratch/run".parse().unwrap();
        assert_eq!(efs.to_string(), "fs-1234abcd:/scratch/run");
        assert!(efs.is_remote());

        let local: DataPath = "relative/dir".parse().unwrap();
        assert_eq!(local, DataPath::Local(PathBuf::from("relative/dir")));
        assert!(!local.is_remote());
    }

    #[test]
    fn test_data_path_serializes_as_string() {
        let path = DataPath::Efs(EfsPath::new("fs-1", "/shared/abc").unwrap());
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, r#""fs-1:/shared/abc""#);
        let back: DataPath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, path);
    }

    #[test]
    fn test_efs_path_requires_absolute_path() {
        assert!(EfsPath::new("fs-1", "scratch").is_err());
        assert!(EfsPath::new("vol-1", "/scratch").is_err());
    }
}
