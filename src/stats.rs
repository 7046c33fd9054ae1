//! [`CrawlStats`]: the mutable counters the status line renders and
//! `tracing` events annotate, per §3's "ambient" data model entry.
//!
//! Sequential mode has a single writer (the scheduler loop), so a plain
//! struct behind one `std::sync::Mutex` is enough; fast mode has one
//! writer per worker thread, so the fields become atomics instead —
//! mirrors the `Archive`/`SharedArchive` split in `archive.rs` for the
//! same single-writer-vs-many-writers reason.

use crate::errors::ErrorKind;
use std::sync::{
    atomic::{AtomicU16, AtomicU64, Ordering},
    Mutex,
};

/// Sequential-mode counters: one writer (the two-cache scheduler loop),
/// any number of readers (the status line thread).
#[derive(Debug, Default)]
pub struct CrawlStats {
    inner: Mutex<Snapshot>,
}

/// Plain-field snapshot returned by [`CrawlStats::snapshot`] and
/// [`SharedCrawlStats::snapshot`] so the status line doesn't hold a lock
/// across a terminal write.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub pages_archived: u64,
    pub bytes_downloaded: u64,
    pub current_status: u16,
    pub current_url: String,
    pub policy_drops: u64,
    pub protocol_errors: u64,
    pub transport_errors: u64,
}

impl CrawlStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_fetch_started(&self, url: &str) {
        self.inner.lock().expect("stats lock poisoned").current_url = url.to_string();
    }

    pub fn record_page_archived(&self, status: u16, bytes: usize) {
        let mut s = self.inner.lock().expect("stats lock poisoned");
        s.pages_archived += 1;
        s.bytes_downloaded += bytes as u64;
        s.current_status = status;
    }

    pub fn record_error(&self, err: &ErrorKind) {
        let mut s = self.inner.lock().expect("stats lock poisoned");
        match err {
            ErrorKind::PolicyDrop(_) => s.policy_drops += 1,
            ErrorKind::ProtocolError(_) => s.protocol_errors += 1,
            ErrorKind::TransportError(_) => s.transport_errors += 1,
            _ => {}
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.inner.lock().expect("stats lock poisoned").clone()
    }
}

/// Fast-mode counters: one writer per worker thread. `current_url`
/// becomes "the most recently started fetch across all workers" rather
/// than a precise per-worker value — acceptable for a decorative status
/// line per §5, not used for crawl logic.
#[derive(Debug, Default)]
pub struct SharedCrawlStats {
    pages_archived: AtomicU64,
    bytes_downloaded: AtomicU64,
    current_status: AtomicU16,
    current_url: Mutex<String>,
    policy_drops: AtomicU64,
    protocol_errors: AtomicU64,
    transport_errors: AtomicU64,
}

impl SharedCrawlStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_fetch_started(&self, url: &str) {
        *self.current_url.lock().expect("stats lock poisoned") = url.to_string();
    }

    pub fn record_page_archived(&self, status: u16, bytes: usize) {
        self.pages_archived.fetch_add(1, Ordering::Relaxed);
        self.bytes_downloaded.fetch_add(bytes as u64, Ordering::Relaxed);
        self.current_status.store(status, Ordering::Relaxed);
    }

    pub fn record_error(&self, err: &ErrorKind) {
        let counter = match err {
            ErrorKind::PolicyDrop(_) => &self.policy_drops,
            ErrorKind::ProtocolError(_) => &self.protocol_errors,
            ErrorKind::TransportError(_) => &self.transport_errors,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            pages_archived: self.pages_archived.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            current_status: self.current_status.load(Ordering::Relaxed),
            current_url: self.current_url.lock().expect("stats lock poisoned").clone(),
            policy_drops: self.policy_drops.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PolicyReason;

    #[test]
    fn sequential_stats_accumulate_across_calls() {
        let stats = CrawlStats::new();
        stats.record_page_archived(200, 1024);
        stats.record_page_archived(200, 512);
        let snap = stats.snapshot();
        assert_eq!(snap.pages_archived, 2);
        assert_eq!(snap.bytes_downloaded, 1536);
        assert_eq!(snap.current_status, 200);
    }

    #[test]
    fn sequential_stats_classify_errors_by_kind() {
        let stats = CrawlStats::new();
        stats.record_error(&ErrorKind::PolicyDrop(PolicyReason::Blacklisted));
        stats.record_error(&ErrorKind::ProtocolError("x"));
        let snap = stats.snapshot();
        assert_eq!(snap.policy_drops, 1);
        assert_eq!(snap.protocol_errors, 1);
        assert_eq!(snap.transport_errors, 0);
    }

    #[test]
    fn shared_stats_accumulate_across_workers() {
        let stats = SharedCrawlStats::new();
        stats.record_page_archived(200, 100);
        stats.record_page_archived(404, 50);
        let snap = stats.snapshot();
        assert_eq!(snap.pages_archived, 2);
        assert_eq!(snap.bytes_downloaded, 150);
        assert_eq!(snap.current_status, 404);
    }
}
