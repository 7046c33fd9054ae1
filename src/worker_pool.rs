//! The fast-mode worker pool: `FAST_MODE_NR_WORKERS` real OS threads
//! sharing a lock-free frontier and an `RwLock`-guarded archive, per
//! §4.7 and §5.
//!
//! Each worker builds its own single-threaded `tokio` runtime to drive
//! its own `Connection`/`Transaction` — no socket, buffer, or runtime is
//! shared across threads, matching the teacher's one-task-per-connection
//! model scaled to one-runtime-per-worker-thread instead of one runtime
//! for the whole pool.
//!
//! The frontier itself is grounded on the teacher's `server_impl.rs`
//! `get_stream`/`TcpQueue` pattern: a lock-free `crossbeam::queue::SegQueue`
//! polled in a loop, backing off with a short sleep when empty rather than
//! blocking on a condvar (the teacher's `WaitStrategy::Sleep`). Pending
//! in-flight count is a plain atomic alongside it, since the drain
//! condition only needs to observe it, never lock it.

use crate::{
    archive::SharedArchive,
    errors::ErrorKind,
    http::{
        extract::{extract_urls, rewrite_to_absolute},
        transaction::Transaction,
        types::resolve_url,
    },
    limits::{BufferLimits, ConnLimits, HttpLimits},
    options::CrawlOptions,
    policy, signal,
    stats::SharedCrawlStats,
    store::PageStore,
};
use crossbeam::queue::SegQueue;
use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio_rustls::rustls::ClientConfig;

/// Backoff between empty-queue polls, matching the teacher's
/// `WaitStrategy::Sleep` default order of magnitude scaled up for a
/// network-bound workload rather than an in-memory connection queue.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A lock-free FIFO queue shared across worker threads, polled rather
/// than blocked on. `pop` loops on [`SegQueue::pop`] until an item is
/// available, the pool is draining (queue empty and no in-flight fetch
/// anywhere), or the stop flag is set — §4.7's "sentinel drain state...
/// wakes blocked workers and lets them exit" becomes "polling workers
/// observe the drain condition and exit" with no wakeup needed.
struct SharedFrontier {
    queue: SegQueue<(String, u32)>,
    in_flight: AtomicUsize,
}

impl SharedFrontier {
    fn new() -> Self {
        Self {
            queue: SegQueue::new(),
            in_flight: AtomicUsize::new(0),
        }
    }

    fn push(&self, url: String, depth: u32) {
        self.queue.push((url, depth));
    }

    fn push_many(&self, items: impl IntoIterator<Item = (String, u32)>) {
        for item in items {
            self.queue.push(item);
        }
    }

    /// Pops the next item, or `None` once the pool should drain.
    async fn pop(&self, stop_flag: &AtomicBool) -> Option<(String, u32)> {
        loop {
            if let Some(item) = self.queue.pop() {
                self.in_flight.fetch_add(1, Ordering::SeqCst);
                return Some(item);
            }
            if self.in_flight.load(Ordering::SeqCst) == 0 || signal::is_stopping(stop_flag) {
                return None;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Marks one in-flight fetch as complete.
    fn finish(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Runs the fast-mode crawl to completion across `opts.fast_mode_workers`
/// OS threads, blocking the calling thread until every worker exits.
#[allow(clippy::too_many_arguments)]
pub fn run(
    opts: &CrawlOptions,
    tls_config: &Arc<ClientConfig>,
    buf_limits: &BufferLimits,
    conn_limits: &ConnLimits,
    http_limits: &HttpLimits,
    stats: &Arc<SharedCrawlStats>,
    store: &Arc<PageStore>,
    stop_flag: &Arc<AtomicBool>,
) -> Result<(), ErrorKind> {
    let primary_host = crate::http::types::parse_host(&opts.seed_url)?.to_string();
    let archive = Arc::new(SharedArchive::new());
    let frontier = Arc::new(SharedFrontier::new());

    let claimed_seed = archive.claim_many([opts.seed_url.clone()]);
    for url in claimed_seed {
        frontier.push(url, 0);
    }

    let mut handles = Vec::with_capacity(opts.fast_mode_workers);
    for worker_id in 0..opts.fast_mode_workers {
        let frontier = Arc::clone(&frontier);
        let archive = Arc::clone(&archive);
        let tls_config = Arc::clone(tls_config);
        let stats = Arc::clone(stats);
        let store = Arc::clone(store);
        let stop_flag = Arc::clone(stop_flag);
        let opts = opts.clone();
        let buf_limits = buf_limits.clone();
        let conn_limits = conn_limits.clone();
        let http_limits = http_limits.clone();
        let primary_host = primary_host.clone();

        let handle = std::thread::Builder::new()
            .name(format!("webscout-worker-{worker_id}"))
            .spawn(move || {
                worker_main(
                    worker_id,
                    &opts,
                    &primary_host,
                    &frontier,
                    &archive,
                    &tls_config,
                    &buf_limits,
                    &conn_limits,
                    &http_limits,
                    &stats,
                    &store,
                    &stop_flag,
                )
            })
            .expect("failed to spawn worker thread");
        handles.push(handle);
    }

    let mut first_fatal = None;
    for handle in handles {
        if let Ok(Err(e)) = handle.join() {
            if first_fatal.is_none() {
                first_fatal = Some(e);
            }
        }
    }

    match first_fatal {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[allow(clippy::too_many_arguments)]
fn worker_main(
    worker_id: usize,
    opts: &CrawlOptions,
    primary_host: &str,
    frontier: &SharedFrontier,
    archive: &SharedArchive,
    tls_config: &Arc<ClientConfig>,
    buf_limits: &BufferLimits,
    conn_limits: &ConnLimits,
    http_limits: &HttpLimits,
    stats: &SharedCrawlStats,
    store: &PageStore,
    stop_flag: &AtomicBool,
) -> Result<(), ErrorKind> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;

    let mut transaction = Transaction::new(buf_limits, primary_host.to_string(), opts.follow_redirects, worker_id)?;

    runtime.block_on(async {
        loop {
            let Some((url, depth)) = frontier.pop(stop_flag).await else {
                break;
            };

            stats.record_fetch_started(&url);
            tracing::debug!(worker = worker_id, url = %url, depth, "fetching");

            let outcome = transaction
                .fetch(&url, tls_config, conn_limits, http_limits, buf_limits, &opts.user_agent)
                .await;

            match outcome {
                Ok(page) => {
                    stats.record_page_archived(page.status.as_u16(), page.body.len());

                    if page.status.is_success() {
                        let transformed = rewrite_to_absolute(&page.body, &page.final_url);
                        if let Err(e) = store.put(&page.final_url, &transformed) {
                            tracing::warn!(worker = worker_id, url = %page.final_url, error = %e, "failed to persist page");
                        }

                        // §4.7 shares one flat frontier with no generational pools, but
                        // §8 property 7 ("no URL is fetched whose discovery-depth exceeds
                        // the configured maximum") still applies to fast mode — depth
                        // just travels with each queue entry instead of with a pool swap.
                        if depth < opts.max_depth {
                            let candidates: Vec<String> = extract_urls(&page.body)
                                .into_iter()
                                .filter_map(|c| simdutf8::basic::from_utf8(&page.body[c.start..c.end]).ok())
                                .filter_map(|raw| resolve_url(&page.final_url, raw).ok())
                                .filter(|absolute| policy::validate(absolute, primary_host, opts, buf_limits).is_ok())
                                .collect();

                            let claimed = archive.claim_many(candidates);
                            frontier.push_many(claimed.into_iter().map(|url| (url, depth + 1)));
                        }
                    }
                }
                Err(e) => {
                    stats.record_error(&e);
                    tracing::warn!(worker = worker_id, url = %url, error = %e, "fetch failed");
                    if e.is_fatal_to_crawl() {
                        frontier.finish();
                        return Err(e);
                    }
                }
            }

            frontier.finish();
        }
        Ok(())
    })
}
