// Cache path utilities.
// Maps cache keys to record files under the snapshot directory.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use sha2::{Digest, Sha256};

/// Extension of persisted snapshot records.
pub const RECORD_EXTENSION: &str = "json";

/// Get the default snapshot directory (~/.cache/ghsnap/snapshots on Linux).
pub fn default_snapshot_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "ghsnap").map(|dirs| dirs.cache_dir().join("snapshots"))
}

/// Path to the record file for a key.
///
/// The readable part is the sanitized key; the hash suffix keeps keys that
/// sanitize identically (`a.b` and `a_b`) in separate files.
pub fn record_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!(
        "{}-{}.{}",
        sanitize_name(key),
        key_digest(key),
        RECORD_EXTENSION
    ))
}

/// Whether a directory entry looks like a snapshot record.
pub fn is_record(path: &Path) -> bool {
    path.is_file() && path.extension().is_some_and(|ext| ext == RECORD_EXTENSION)
}

/// Sanitize a name for use in filesystem paths.
/// Keeps ASCII alphanumerics, `-` and `_`; everything else becomes `_`.
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}

/// First 8 bytes of the key's SHA-256, hex encoded.
fn key_digest(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    hex::encode(&digest[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("simple"), "simple");
        assert_eq!(sanitize_name("with-dash_under"), "with-dash_under");
        assert_eq!(sanitize_name("with/slash"), "with_slash");
        assert_eq!(sanitize_name("owner:name.x"), "owner_name_x");
        assert_eq!(sanitize_name("ünï"), "_n_");
    }

    #[test]
    fn test_record_path_is_stable() {
        let dir = Path::new("/tmp/snapshots");
        let a = record_path(dir, "octocat");
        let b = record_path(dir, "octocat");
        assert_eq!(a, b);

        let name = a.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("octocat-"));
        assert!(name.ends_with(".json"));
        assert_eq!(name.len(), "octocat-".len() + 16 + ".json".len());
    }

    #[test]
    fn test_colliding_sanitized_keys_get_distinct_paths() {
        let dir = Path::new("/tmp/snapshots");
        assert_ne!(record_path(dir, "a.b"), record_path(dir, "a_b"));
        assert_ne!(record_path(dir, "a/b"), record_path(dir, "a:b"));
    }

    #[test]
    fn test_default_snapshot_dir() {
        if let Some(dir) = default_snapshot_dir() {
            assert!(dir.ends_with("snapshots"));
        }
    }
}
