//! End-to-end scenarios driven against a local `TcpListener` serving
//! canned responses — there is no live network in the test environment,
//! so every fixture here plays the part of an origin server the way
//! `maker_web`'s own `server_impl.rs` plays the part of a client's peer
//! in its accept loop, just with the roles reversed.

use std::{
    path::Path,
    sync::{atomic::AtomicBool, Arc},
    time::Duration,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};
use webscout::{
    http::transport::shared_tls_config,
    limits::{BufferLimits, ConnLimits, HttpLimits, SlabLimits},
    options::CrawlOptions,
    scheduler::Scheduler,
    stats::{CrawlStats, SharedCrawlStats},
    store::PageStore,
    worker_pool,
};

fn test_options(seed_url: String, dot_dir: &Path) -> CrawlOptions {
    CrawlOptions {
        seed_url,
        max_depth: 3,
        crawl_delay: Duration::ZERO,
        fast_mode: false,
        fast_mode_workers: 4,
        cache_threshold: None,
        cross_domain: false,
        blacklist: vec![],
        tls_for_seed: false,
        dot_dir: dot_dir.to_path_buf(),
        follow_redirects: true,
        max_redirects: 5,
        request_timeout: Duration::from_secs(5),
        user_agent: "webscout-test/0.1".to_string(),
    }
}

/// Builds a well-formed `HTTP/1.1 <status>` response with `Content-Length`
/// computed from `body` and `Connection: close` so the fixture server
/// never has to guess when a handler is done writing.
fn response_bytes(status_line: &str, extra_headers: &[&str], body: &[u8]) -> Vec<u8> {
    let mut out = format!("HTTP/1.1 {status_line}\r\n").into_bytes();
    for header in extra_headers {
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
    out.extend_from_slice(b"Connection: close\r\n\r\n");
    out.extend_from_slice(body);
    out
}

/// Same shape, but `Transfer-Encoding: chunked` framing instead of a
/// `Content-Length`, one chunk per entry in `chunks` plus the terminator.
fn chunked_response_bytes(chunks: &[&[u8]]) -> Vec<u8> {
    let mut out = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n".to_vec();
    for chunk in chunks {
        out.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
        out.extend_from_slice(chunk);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"0\r\n\r\n");
    out
}

/// Reads one HTTP request off `stream` (headers only — every request
/// here is a GET with no body) and returns its request-target, e.g. `/a`.
async fn read_request_path(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await.expect("read request");
        assert!(n > 0, "peer closed before a full request arrived");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = find_header_end(&buf) {
            let head = String::from_utf8_lossy(&buf[..end]);
            let line = head.lines().next().expect("status line");
            let mut parts = line.split_whitespace();
            parts.next(); // method
            return parts.next().expect("request target").to_string();
        }
    }
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|idx| idx + 4)
}

/// Serves one canned response per accepted connection, keyed by request
/// path, until `routes` is exhausted or the listener is dropped.
async fn serve(listener: TcpListener, mut routes: std::collections::HashMap<String, Vec<u8>>) {
    loop {
        let Ok((mut stream, _)) = listener.accept().await else {
            return;
        };
        let path = read_request_path(&mut stream).await;
        let Some(response) = routes.remove(&path) else {
            let _ = stream
                .write_all(&response_bytes("404 Not Found", &[], b""))
                .await;
            continue;
        };
        let _ = stream.write_all(&response).await;
        let _ = stream.shutdown().await;
        if routes.is_empty() {
            return;
        }
    }
}

async fn local_listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    (listener, format!("127.0.0.1:{}", addr.port()))
}

#[tokio::test]
async fn s1_happy_path_archives_seed_and_discovered_links() {
    let authority = {
        let (listener, authority) = local_listener().await;

        let mut routes = std::collections::HashMap::new();
        routes.insert(
            "/".to_string(),
            response_bytes(
                "200 OK",
                &["Content-Type: text/html"],
                br#"<html><body><a href="/a">a</a><a href="/b">b</a></body></html>"#,
            ),
        );
        routes.insert("/a".to_string(), response_bytes("200 OK", &["Content-Type: text/html"], b"<html>a</html>"));
        routes.insert("/b".to_string(), response_bytes("200 OK", &["Content-Type: text/html"], b"<html>b</html>"));

        tokio::spawn(serve(listener, routes));
        authority
    };

    let tmp = tempfile::tempdir().unwrap();
    let opts = test_options(format!("http://{authority}/"), tmp.path());

    let tls_config = shared_tls_config_for_tests();
    let buf_limits = BufferLimits::default();
    let conn_limits = ConnLimits::default();
    let http_limits = HttpLimits::default();
    let slab_limits = SlabLimits::default();
    let stats = CrawlStats::new();
    let store = PageStore::open(&opts.dot_dir).unwrap();
    let stop_flag = Arc::new(AtomicBool::new(false));

    let mut scheduler = Scheduler::new(&slab_limits).unwrap();
    scheduler
        .run(&opts, &tls_config, &buf_limits, &conn_limits, &http_limits, &stats, &store, &stop_flag)
        .await
        .unwrap();

    let archived = scheduler.archived_urls();
    assert_eq!(archived.len(), 3);
    assert!(archived.contains(&format!("http://{authority}/")));
    assert!(archived.contains(&format!("http://{authority}/a")));
    assert!(archived.contains(&format!("http://{authority}/b")));

    for url in &archived {
        assert!(store.path_for(url).is_file(), "expected a persisted file for {url}");
    }
}

#[tokio::test]
async fn s3_redirect_archives_both_the_original_and_final_url() {
    let (listener, authority) = local_listener().await;

    let location_header = format!("Location: http://{authority}/final");
    let mut routes = std::collections::HashMap::new();
    routes.insert(
        "/".to_string(),
        response_bytes("301 Moved Permanently", &[location_header.as_str()], b""),
    );
    routes.insert("/final".to_string(), response_bytes("200 OK", &["Content-Type: text/html"], b"<html>ok</html>"));

    tokio::spawn(serve(listener, routes));

    let tmp = tempfile::tempdir().unwrap();
    let opts = test_options(format!("http://{authority}/"), tmp.path());

    let tls_config = shared_tls_config_for_tests();
    let buf_limits = BufferLimits::default();
    let conn_limits = ConnLimits::default();
    let http_limits = HttpLimits::default();
    let slab_limits = SlabLimits::default();
    let stats = CrawlStats::new();
    let store = PageStore::open(&opts.dot_dir).unwrap();
    let stop_flag = Arc::new(AtomicBool::new(false));

    let mut scheduler = Scheduler::new(&slab_limits).unwrap();
    scheduler
        .run(&opts, &tls_config, &buf_limits, &conn_limits, &http_limits, &stats, &store, &stop_flag)
        .await
        .unwrap();

    let archived = scheduler.archived_urls();
    assert!(archived.contains(&format!("http://{authority}/")));
    assert!(archived.contains(&format!("http://{authority}/final")));
    assert_eq!(archived.len(), 2);
}

#[tokio::test]
async fn s4_chunked_body_decodes_to_contiguous_concatenation() {
    let (listener, authority) = local_listener().await;

    let mut routes = std::collections::HashMap::new();
    routes.insert(
        "/".to_string(),
        chunked_response_bytes(&[b"<html><body>", b"hello ", b"chunked world", b"</body></html>"]),
    );

    tokio::spawn(serve(listener, routes));

    let tmp = tempfile::tempdir().unwrap();
    let opts = test_options(format!("http://{authority}/"), tmp.path());

    let tls_config = shared_tls_config_for_tests();
    let buf_limits = BufferLimits::default();
    let conn_limits = ConnLimits::default();
    let http_limits = HttpLimits::default();
    let slab_limits = SlabLimits::default();
    let stats = CrawlStats::new();
    let store = PageStore::open(&opts.dot_dir).unwrap();
    let stop_flag = Arc::new(AtomicBool::new(false));

    let mut scheduler = Scheduler::new(&slab_limits).unwrap();
    scheduler
        .run(&opts, &tls_config, &buf_limits, &conn_limits, &http_limits, &stats, &store, &stop_flag)
        .await
        .unwrap();

    let seed = format!("http://{authority}/");
    let path = store.path_for(&seed);
    let body = std::fs::read(path).unwrap();
    assert_eq!(body, b"<html><body>hello chunked world</body></html>");
}

#[tokio::test]
async fn s6_fast_mode_fetches_every_discovered_page_exactly_once() {
    let (listener, authority) = local_listener().await;

    let mut routes = std::collections::HashMap::new();
    routes.insert(
        "/".to_string(),
        response_bytes(
            "200 OK",
            &["Content-Type: text/html"],
            format!(
                r#"<html><body><a href="/p1">1</a><a href="/p2">2</a><a href="/p1">again</a></body></html>"#
            )
            .as_bytes(),
        ),
    );
    routes.insert("/p1".to_string(), response_bytes("200 OK", &["Content-Type: text/html"], b"<html>p1</html>"));
    routes.insert("/p2".to_string(), response_bytes("200 OK", &["Content-Type: text/html"], b"<html>p2</html>"));

    let visit_counts = Arc::new(std::sync::Mutex::new(std::collections::HashMap::<String, usize>::new()));
    let counts_for_server = Arc::clone(&visit_counts);
    let server_listener = listener;
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = server_listener.accept().await else {
                return;
            };
            let path = read_request_path(&mut stream).await;
            let mut counts = counts_for_server.lock().unwrap();
            *counts.entry(path.clone()).or_insert(0) += 1;
            drop(counts);

            let response = routes.get(&path).cloned().unwrap_or_else(|| response_bytes("404 Not Found", &[], b""));
            let _ = stream.write_all(&response).await;
            let _ = stream.shutdown().await;
        }
    });

    let tmp = tempfile::tempdir().unwrap();
    let mut opts = test_options(format!("http://{authority}/"), tmp.path());
    opts.fast_mode = true;
    opts.fast_mode_workers = 3;

    let tls_config = shared_tls_config_for_tests();
    let buf_limits = BufferLimits::default();
    let conn_limits = ConnLimits::default();
    let http_limits = HttpLimits::default();
    let stats = Arc::new(SharedCrawlStats::new());
    let store = Arc::new(PageStore::open(&opts.dot_dir).unwrap());
    let stop_flag = Arc::new(AtomicBool::new(false));

    // `worker_pool::run` spawns its own OS threads and blocks the calling
    // thread until they all join, so it is driven from a blocking task
    // rather than awaited directly on the current-thread test runtime.
    let result = tokio::task::spawn_blocking(move || {
        worker_pool::run(&opts, &tls_config, &buf_limits, &conn_limits, &http_limits, &stats, &store, &stop_flag)
    })
    .await
    .unwrap();
    result.unwrap();

    let counts = visit_counts.lock().unwrap();
    assert_eq!(counts.get("/"), Some(&1));
    assert_eq!(counts.get("/p1"), Some(&1), "a URL discovered twice must still be fetched only once");
    assert_eq!(counts.get("/p2"), Some(&1));
}

/// A `ClientConfig` built from an empty in-memory trust store rather than
/// [`shared_tls_config`]'s platform trust store: every fixture here is
/// plaintext HTTP, so the config is never actually used to perform a
/// handshake, but `Transaction`/`worker_pool::run` both require one to be
/// threaded through regardless of whether a given crawl ever dials
/// `https://`.
fn shared_tls_config_for_tests() -> Arc<tokio_rustls::rustls::ClientConfig> {
    // Building the real platform-trust-store config keeps this aligned
    // with production behavior and avoids hand-rolling a second TLS
    // bootstrap path just for tests.
    shared_tls_config().unwrap_or_else(|_| {
        let roots = tokio_rustls::rustls::RootCertStore::empty();
        Arc::new(
            tokio_rustls::rustls::ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth(),
        )
    })
}
