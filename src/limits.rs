//! Crawl engine tunables: buffer sizing, timeouts, and pool capacities.
//!
//! # Defaults
//!
//! Defaults favor a single well-behaved crawl against a single host: modest
//! buffer pre-allocation, a conservative redirect cap, and a worker count
//! that won't hammer a target from a laptop.
//!
//! # Memory Consumption
//!
//! Each connection pre-allocates a read buffer and a write buffer according
//! to [`BufferLimits`]. Each depth layer pre-allocates two URL slabs sized
//! by [`SlabLimits::layer_capacity`].

use std::time::Duration;

/// Buffer pre-allocation and growth tuning.
#[derive(Debug, Clone)]
pub struct BufferLimits {
    /// Initial capacity for a connection's read/write buffers (default: `8 KiB`).
    pub initial_capacity: usize,
    /// Maximum single absolute URL length, `URL_MAX` in the design (default: `2048`).
    pub url_max: usize,
    /// Maximum bytes read in chasing headers before giving up (default: `64 KiB`).
    pub max_header_bytes: usize,
    /// Maximum response body size accepted (default: `16 MiB`).
    pub max_body_bytes: usize,

    #[doc(hidden)]
    pub _priv: (),
}

impl Default for BufferLimits {
    fn default() -> Self {
        Self {
            initial_capacity: 8 * 1024,
            url_max: 2048,
            max_header_bytes: 64 * 1024,
            max_body_bytes: 16 * 1024 * 1024,
            _priv: (),
        }
    }
}

/// Socket- and TLS-level timeouts.
#[derive(Debug, Clone)]
pub struct ConnLimits {
    /// Maximum duration to wait for a TCP connect (default: `10 seconds`).
    pub connect_timeout: Duration,
    /// Maximum duration to wait for any single read (default: `15 seconds`).
    pub read_timeout: Duration,
    /// Maximum duration to wait for any single write (default: `15 seconds`).
    pub write_timeout: Duration,
    /// Readiness-wait timeout used while draining a TLS `want-read` condition
    /// (default: `1 second`, per the design's "stop reading, return what
    /// was gathered so far" rule).
    pub tls_readiness_timeout: Duration,

    #[doc(hidden)]
    pub _priv: (),
}

impl Default for ConnLimits {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(15),
            write_timeout: Duration::from_secs(15),
            tls_readiness_timeout: Duration::from_secs(1),
            _priv: (),
        }
    }
}

/// Slab and frontier/archive capacity tuning.
#[derive(Debug, Clone)]
pub struct SlabLimits {
    /// Capacity of each depth layer's URL pool (default: `4096`, matching
    /// the source's `WR_CACHE_SIZE`).
    pub layer_capacity: usize,

    #[doc(hidden)]
    pub _priv: (),
}

impl Default for SlabLimits {
    fn default() -> Self {
        Self {
            layer_capacity: 4096,
            _priv: (),
        }
    }
}

/// HTTP-transaction-level limits.
#[derive(Debug, Clone)]
pub struct HttpLimits {
    /// Maximum number of redirects followed before giving up (default: `5`).
    pub max_redirects: u8,
    /// Maximum number of response headers accepted (default: `64`).
    pub max_headers: usize,

    #[doc(hidden)]
    pub _priv: (),
}

impl Default for HttpLimits {
    fn default() -> Self {
        Self {
            max_redirects: 5,
            max_headers: 64,
            _priv: (),
        }
    }
}

/// Upper bound enforced on `--crawl-delay`, in seconds.
pub const MAX_CRAWL_DELAY_SECS: u64 = 3600;

/// Default maximum crawl depth when `-D`/`--depth` is not given.
pub const CRAWL_DEPTH_DEFAULT: u32 = 3;

/// Default fill-pool threshold used when `--cache-set-threshold` enables
/// backpressure without a value override.
pub const CACHE_DEFAULT_THRESHOLD: usize = 4096;

/// Default number of fast-mode workers.
pub const FAST_MODE_NR_WORKERS_DEFAULT: usize = 8;
