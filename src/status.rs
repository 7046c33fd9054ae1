//! The status line: a dedicated OS thread that periodically renders
//! [`CrawlStats`](crate::stats)/[`SharedCrawlStats`](crate::stats) counters
//! to the terminal, per §5 — "guarded by a mutex around all output
//! calls... may suspend via `std::thread::sleep` but never performs I/O
//! against the network side."
//!
//! `terminal_lock` is handed out so fast mode's worker threads (which may
//! also want to print a one-off diagnostic line) serialize against the
//! status thread's writes rather than interleaving mid-line, per §5's
//! "the terminal output mutex" being a resource shared across the worker
//! pool, not private to this module.

use crate::stats::Snapshot;
use std::{
    io::Write,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread::JoinHandle,
    time::Duration,
};

const REFRESH_INTERVAL: Duration = Duration::from_millis(500);

/// A handle to the background status-line thread. Dropping this without
/// calling [`StatusLine::stop`] leaves the thread running until the
/// process exits; `stop` joins it cleanly.
pub struct StatusLine {
    handle: Option<JoinHandle<()>>,
    done: Arc<AtomicBool>,
}

impl StatusLine {
    /// Spawns the status thread. `snapshot_fn` is polled every refresh
    /// tick and its result rendered to stdout under `terminal_lock`.
    pub fn spawn<F>(terminal_lock: Arc<Mutex<()>>, snapshot_fn: F) -> Self
    where
        F: Fn() -> Snapshot + Send + 'static,
    {
        let done = Arc::new(AtomicBool::new(false));
        let done_for_thread = Arc::clone(&done);

        let handle = std::thread::Builder::new()
            .name("webscout-status".into())
            .spawn(move || {
                while !done_for_thread.load(Ordering::Relaxed) {
                    render(&terminal_lock, &snapshot_fn());
                    std::thread::sleep(REFRESH_INTERVAL);
                }
                // final render so the last counts aren't lost to a sleep in progress
                render(&terminal_lock, &snapshot_fn());
            })
            .expect("failed to spawn status line thread");

        Self { handle: Some(handle), done }
    }

    /// Signals the thread to stop and waits for it to exit.
    pub fn stop(mut self) {
        self.done.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn render(terminal_lock: &Mutex<()>, snap: &Snapshot) {
    let _guard = terminal_lock.lock().expect("terminal lock poisoned");
    print!(
        "\rarchived={} bytes={} status={} drops={} perr={} terr={} url={}\x1b[K",
        snap.pages_archived,
        snap.bytes_downloaded,
        snap.current_status,
        snap.policy_drops,
        snap.protocol_errors,
        snap.transport_errors,
        snap.current_url,
    );
    let _ = std::io::stdout().flush();
}
