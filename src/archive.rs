//! The archive: the set of URLs already fetched (successfully or with a
//! terminal [`ProtocolError`](crate::errors::ErrorKind::ProtocolError)),
//! never shrinking.
//!
//! §4.4 calls for "a sorted/searchable set... backed by a balanced tree",
//! which `BTreeSet` is directly. Two shapes are provided: [`Archive`] for
//! sequential mode (single-writer, no locking needed) and
//! [`SharedArchive`] for fast mode, where §5 specifies "reader-writer
//! exclusion; many concurrent lookups, exclusive inserts" — a
//! `std::sync::RwLock` around the same `BTreeSet`.

use std::{collections::BTreeSet, sync::RwLock};

/// Single-threaded archive used by the sequential (two-cache) scheduler.
#[derive(Debug, Default)]
pub struct Archive {
    urls: BTreeSet<String>,
}

impl Archive {
    pub fn new() -> Self {
        Self { urls: BTreeSet::new() }
    }

    /// Inserts `url` if absent. Idempotent: calling this twice with the
    /// same URL has the same effect as calling it once.
    pub fn put(&mut self, url: impl Into<String>) -> bool {
        self.urls.insert(url.into())
    }

    pub fn contains(&self, url: &str) -> bool {
        self.urls.contains(url)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.urls.iter()
    }
}

/// Thread-shared archive used by the fast-mode worker pool. Inserts
/// happen-before any subsequent `contains` observing the URL as present,
/// guaranteed by `RwLock`'s acquire-release pairing (§5).
#[derive(Debug, Default)]
pub struct SharedArchive {
    urls: RwLock<BTreeSet<String>>,
}

impl SharedArchive {
    pub fn new() -> Self {
        Self { urls: RwLock::new(BTreeSet::new()) }
    }

    pub fn contains(&self, url: &str) -> bool {
        self.urls.read().expect("archive lock poisoned").contains(url)
    }

    pub fn put(&self, url: impl Into<String>) -> bool {
        self.urls.write().expect("archive lock poisoned").insert(url.into())
    }

    /// Inserts every URL in `urls` under a single critical section — the
    /// "locks the shared archive once per batch of discoveries" rule from
    /// §4.7 — and returns the subset that was newly inserted (i.e. not
    /// already claimed by this or a concurrent worker's batch). Fast
    /// mode enqueues only the returned subset, so a URL discovered by
    /// two racing workers is fetched by at most one of them.
    pub fn claim_many(&self, urls: impl IntoIterator<Item = String>) -> Vec<String> {
        let mut guard = self.urls.write().expect("archive lock poisoned");
        let mut claimed = Vec::new();
        for url in urls {
            if guard.insert(url.clone()) {
                claimed.push(url);
            }
        }
        claimed
    }

    pub fn len(&self) -> usize {
        self.urls.read().expect("archive lock poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_is_idempotent() {
        let mut a = Archive::new();
        assert!(a.put("http://example.test/"));
        assert!(!a.put("http://example.test/"));
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn contains_reflects_puts() {
        let mut a = Archive::new();
        assert!(!a.contains("http://example.test/"));
        a.put("http://example.test/");
        assert!(a.contains("http://example.test/"));
    }

    #[test]
    fn shared_archive_claim_many_locks_once_for_the_whole_batch() {
        let archive = SharedArchive::new();
        let claimed = archive.claim_many(["/a".to_string(), "/b".to_string(), "/a".to_string()]);
        assert_eq!(claimed, vec!["/a".to_string(), "/b".to_string()]);
        assert_eq!(archive.len(), 2);
        assert!(archive.contains("/a"));
        assert!(archive.contains("/b"));
    }

    #[test]
    fn shared_archive_claim_many_excludes_already_archived_urls() {
        let archive = SharedArchive::new();
        archive.put("/a");
        let claimed = archive.claim_many(["/a".to_string(), "/b".to_string()]);
        assert_eq!(claimed, vec!["/b".to_string()]);
    }
}
