//! Utility functions and helpers.

use std::fmt::Write;
use std::path::{Component, Path};
use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

/// Shell-safe environment variable name.
static ENV_VAR_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Invalid env var regex"));

/// Hex-encoded SHA-256 digest of `data`.
pub fn sha256_hex(data: impl AsRef<[u8]>) -> String {
    hex::encode(Sha256::digest(data.as_ref()))
}

/// Derive a stable 64-bit RNG seed from arbitrary text.
pub fn seed_from(text: &str) -> u64 {
    let digest = Sha256::digest(text.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// Turn a path into a hyphen-separated slug (`/opt/efs/shared` -> `opt-efs-shared`).
///
/// Distinct paths give distinct slugs: inside a component `-` becomes `_-`,
/// `_` becomes `__` and any other byte outside `[A-Za-z0-9]` becomes `_xx`.
pub fn slugify_path(path: &Path) -> String {
    let mut slug = String::new();
    let components = path.components().filter_map(|component| match component {
        Component::Normal(part) => Some(part.as_encoded_bytes()),
        Component::ParentDir => Some(b"..".as_slice()),
        Component::RootDir | Component::CurDir | Component::Prefix(_) => None,
    });
    for (i, bytes) in components.enumerate() {
        if i > 0 {
            slug.push('-');
        }
        for &byte in bytes {
            match byte {
                b'-' => slug.push_str("_-"),
                b'_' => slug.push_str("__"),
                b if b.is_ascii_alphanumeric() => slug.push(b as char),
                b => {
                    let _ = write!(slug, "_{b:02x}");
                }
            }
        }
    }
    slug
}

/// Whether `name` can be exported by a POSIX shell.
pub fn is_valid_env_var_name(name: &str) -> bool {
    ENV_VAR_NAME.is_match(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex_of_s3_uri() {
        assert_eq!(
            sha256_hex("s3://bucket/key"),
            "558ca1533e03aaea2e3fb825be29124c1648046a2893052d1a1df0059becbf4f"
        );
    }

    #[test]
    fn test_seed_from_is_stable() {
        assert_eq!(seed_from("exec-1"), seed_from("exec-1"));
        assert_ne!(seed_from("exec-1"), seed_from("exec-2"));
    }

    #[test]
    fn test_slugify_path() {
        assert_eq!(slugify_path(Path::new("/opt/efs")), "opt-efs");
        assert_eq!(slugify_path(Path::new("/opt/efs/shared/")), "opt-efs-shared");
        assert_eq!(slugify_path(Path::new("/mnt/my data")), "mnt-my_20data");
        assert_eq!(slugify_path(Path::new("/mnt/my_data")), "mnt-my__data");
        assert_eq!(slugify_path(Path::new("/opt/efs-x")), "opt-efs_-x");
        assert_eq!(slugify_path(Path::new("/")), "");
    }

    #[test]
    fn test_slugify_path_keeps_paths_apart() {
        let paths = [
            "/opt/efs-x",
            "/opt/efs/x",
            "/opt/efs_x",
            "/opt/efs x",
            "/opt/efs_2fx",
            "/opt/efs/../x",
            "/opt/x",
        ];
        let slugs: std::collections::HashSet<_> =
            paths.iter().map(|p| slugify_path(Path::new(p))).collect();
        assert_eq!(slugs.len(), paths.len());
    }

    #[test]
    fn test_env_var_names() {
        assert!(is_valid_env_var_name("EXECUTION_ID"));
        assert!(is_valid_env_var_name("_x1"));
        assert!(!is_valid_env_var_name("1X"));
        assert!(!is_valid_env_var_name("A-B"));
        assert!(!is_valid_env_var_name(""));
    }
}
