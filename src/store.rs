//! The page store: persists each fetched page under
//! `${HOME}/<dot-dir>/pages/`, one file per URL, per §6's "Persisted
//! state".
//!
//! Filenames are the URL's lowercase hex FNV-1a hash plus `.html` —
//! deliberately not the URL itself (which could require percent-decoding
//! or path sanitization to be filesystem-safe) and not a sequential
//! counter (which wouldn't dedup a URL fetched twice across the two
//! depth-layer pools before archive insertion lands).

use std::{
    io,
    path::{Path, PathBuf},
};

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Writes fetched page bodies under a single `pages/` directory.
pub struct PageStore {
    dir: PathBuf,
}

impl PageStore {
    /// Creates `<dot_dir>/pages` if it doesn't already exist.
    pub fn open(dot_dir: &Path) -> io::Result<Self> {
        let dir = dot_dir.join("pages");
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// The path a given URL's page would be (or is) stored at, without
    /// touching the filesystem.
    pub fn path_for(&self, url: &str) -> PathBuf {
        self.dir.join(format!("{:016x}.html", fnv1a(url.as_bytes())))
    }

    /// Writes `body` for `url`, overwriting any prior fetch of the same
    /// URL.
    pub fn put(&self, url: &str, body: &[u8]) -> io::Result<PathBuf> {
        let path = self.path_for(url);
        std::fs::write(&path, body)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_for_is_deterministic_and_stable() {
        let store = PageStore { dir: PathBuf::from("/tmp/webscout-test-pages") };
        let a = store.path_for("http://example.test/a");
        let b = store.path_for("http://example.test/a");
        assert_eq!(a, b);
    }

    #[test]
    fn different_urls_hash_to_different_paths() {
        let store = PageStore { dir: PathBuf::from("/tmp/webscout-test-pages") };
        assert_ne!(store.path_for("http://example.test/a"), store.path_for("http://example.test/b"));
    }

    #[test]
    fn put_writes_the_body_to_the_expected_path() {
        let tmp = tempfile::tempdir().unwrap();
        let store = PageStore::open(tmp.path()).unwrap();
        let path = store.put("http://example.test/page", b"<html></html>").unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"<html></html>");
    }

    #[test]
    fn open_creates_the_pages_directory() {
        let tmp = tempfile::tempdir().unwrap();
        PageStore::open(tmp.path()).unwrap();
        assert!(tmp.path().join("pages").is_dir());
    }
}
