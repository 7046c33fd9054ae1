//! Process entry point: resolves options, wires up the ambient stack
//! (logging, signal handling, TLS, page store, status line), and
//! dispatches to the sequential scheduler or the fast-mode worker pool.
//!
//! Grounded on the teacher's own binary-less library design turned
//! inside out: `maker_web` expects an embedding program to call
//! `Server::builder()...launch().await`; this crate *is* that embedding
//! program, per §6/§7's exit-code and bootstrap contract.

use std::{
    process::ExitCode,
    sync::{Arc, Mutex},
};
use webscout::{
    errors::ErrorKind,
    http::transport::shared_tls_config,
    limits::{BufferLimits, ConnLimits, HttpLimits, SlabLimits},
    options, scheduler, signal,
    stats::{CrawlStats, SharedCrawlStats},
    status::StatusLine,
    store::PageStore,
    worker_pool,
};

fn main() -> ExitCode {
    if options::print_help_if_requested(std::env::args()) {
        return ExitCode::SUCCESS;
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let opts = match options::resolve(std::env::args()) {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("webscout: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(opts) {
        Ok(()) => ExitCode::SUCCESS,
        Err(ErrorKind::SignalInterrupt) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("webscout: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(opts: options::CrawlOptions) -> Result<(), ErrorKind> {
    let stop_flag = signal::install().map_err(|e| ErrorKind::ConfigError(e.to_string()))?;
    let tls_config = shared_tls_config()?;
    let store = Arc::new(PageStore::open(&opts.dot_dir)?);

    let buf_limits = BufferLimits::default();
    let conn_limits = ConnLimits::default();
    let http_limits = HttpLimits::default();
    let terminal_lock = Arc::new(Mutex::new(()));

    if opts.fast_mode {
        let stats = Arc::new(SharedCrawlStats::new());
        let status_stats = Arc::clone(&stats);
        let status = StatusLine::spawn(terminal_lock, move || status_stats.snapshot());

        let result = worker_pool::run(
            &opts,
            &tls_config,
            &buf_limits,
            &conn_limits,
            &http_limits,
            &stats,
            &store,
            &stop_flag,
        );

        status.stop();
        result
    } else {
        let stats = Arc::new(CrawlStats::new());
        let status_stats = Arc::clone(&stats);
        let status = StatusLine::spawn(terminal_lock, move || status_stats.snapshot());

        let slab_limits = SlabLimits::default();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ErrorKind::from)?;

        let result = runtime.block_on(async {
            let mut scheduler = scheduler::Scheduler::new(&slab_limits)?;
            scheduler
                .run(
                    &opts,
                    &tls_config,
                    &buf_limits,
                    &conn_limits,
                    &http_limits,
                    &stats,
                    &store,
                    &stop_flag,
                )
                .await
        });

        status.stop();
        result
    }
}
