//! The HTTP transaction state machine: one request/response cycle against
//! a [`Connection`], including redirect following.
//!
//! Grounded on the teacher's request/response cycle in
//! `server/connection.rs::HttpConnection::impl_run` (fill buffer, parse,
//! write response, loop) but turned client-side: instead of accepting a
//! request and producing a response, a `Transaction` formats a request,
//! sends it, and parses whatever comes back — including, unlike the
//! teacher's single-shot server loop, transparently re-running itself on
//! a redirect. The "polymorphism via function-pointer tables on the HTTP
//! object" the design notes call out collapses here to ordinary methods:
//! there is exactly one host/page parser and one send/recv path, so no
//! capability table is needed (see DESIGN.md).

use crate::{
    errors::ErrorKind,
    http::{
        transport::Connection,
        types::{parse_host, parse_page, resolve_url, HeaderMap, StatusCode},
    },
    limits::{BufferLimits, ConnLimits, HttpLimits},
};
use std::sync::Arc;
use tokio_rustls::rustls::ClientConfig;

/// `Idle → Sending → AwaitingHeaders → ReadingBody → Complete | Redirected | Failed`,
/// per §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Idle,
    Sending,
    AwaitingHeaders,
    ReadingBody,
    Complete,
    Redirected,
    Failed,
}

/// The outcome of a successful (non-transport-failed) fetch: the URL the
/// bytes actually came from (post-redirect), the status, the response
/// headers, and a fully assembled, contiguous body.
#[derive(Debug)]
pub struct FetchedPage {
    pub final_url: String,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// One request/response cycle, owning the [`Connection`] it fetches
/// over. `primary_host` is the seed's host, used by the scheduler for the
/// cross-domain check — the transaction itself doesn't enforce it.
pub struct Transaction {
    connection: Connection,
    pub url: String,
    pub primary_host: String,
    pub follow_redirects: bool,
    pub worker_id: usize,
    state: TxState,
}

impl Transaction {
    pub fn new(
        buf_limits: &BufferLimits,
        primary_host: String,
        follow_redirects: bool,
        worker_id: usize,
    ) -> Result<Self, ErrorKind> {
        Ok(Self {
            connection: Connection::new(buf_limits)?,
            url: String::new(),
            primary_host,
            follow_redirects,
            worker_id,
            state: TxState::Idle,
        })
    }

    #[inline(always)]
    pub fn state(&self) -> TxState {
        self.state
    }

    #[inline(always)]
    pub fn bytes_read(&self) -> usize {
        self.connection.read_buf.used()
    }

    /// Runs the full send/receive cycle for `url`, following redirects up
    /// to `http_limits.max_redirects` when `follow_redirects` is set.
    /// Transport errors are fatal for the whole transaction; HTTP 4xx/5xx
    /// are returned successfully via `FetchedPage::status`, per §4.3's
    /// failure semantics.
    pub async fn fetch(
        &mut self,
        url: &str,
        tls_config: &Arc<ClientConfig>,
        conn_limits: &ConnLimits,
        http_limits: &HttpLimits,
        buf_limits: &BufferLimits,
        user_agent: &str,
    ) -> Result<FetchedPage, ErrorKind> {
        self.url = url.to_string();
        let mut redirects = 0u8;

        loop {
            self.state = TxState::Sending;

            let tls = self.url.starts_with("https://");
            let host = parse_host(&self.url)?.to_string();
            let page = parse_page(&self.url).to_string();

            if !self.connection.is_connected() || self.connection.host != host {
                self.connection.close().await;
                self.connection.open(&host, tls, tls_config, conn_limits).await?;
            }

            self.send_request(&page, &host, user_agent, conn_limits).await?;

            self.state = TxState::AwaitingHeaders;
            let (status, headers, header_block_len) =
                self.recv_headers(conn_limits, buf_limits).await?;
            self.connection.read_buf.consume_head(header_block_len);

            if self.follow_redirects && status.is_redirect() {
                if let Some(location) = headers.get("location").map(str::to_string) {
                    redirects += 1;
                    if redirects > http_limits.max_redirects {
                        self.state = TxState::Failed;
                        return Err(ErrorKind::ProtocolError("too many redirects"));
                    }
                    self.drain_remaining_body(&headers, conn_limits, buf_limits).await?;
                    self.url = resolve_redirect(&self.url, &location)?;
                    self.state = TxState::Redirected;
                    self.connection.close().await;
                    continue;
                }
            }

            self.state = TxState::ReadingBody;
            let body = self.recv_body(&headers, conn_limits, buf_limits).await?;

            self.state = TxState::Complete;
            self.connection.close().await;

            return Ok(FetchedPage {
                final_url: self.url.clone(),
                status,
                headers,
                body,
            });
        }
    }

    async fn send_request(
        &mut self,
        page: &str,
        host: &str,
        user_agent: &str,
        conn_limits: &ConnLimits,
    ) -> Result<(), ErrorKind> {
        self.connection.write_buf.clear();

        let mut req = String::with_capacity(page.len() + host.len() + user_agent.len() + 96);
        req.push_str("GET ");
        req.push_str(page);
        req.push_str(" HTTP/1.1\r\n");
        req.push_str("Host: ");
        req.push_str(host);
        req.push_str("\r\n");
        req.push_str("User-Agent: ");
        req.push_str(user_agent);
        req.push_str("\r\n");
        req.push_str("Accept: text/html,application/xhtml+xml,*/*\r\n");
        req.push_str("Connection: close\r\n");
        req.push_str("\r\n");

        self.connection.write_buf.append(req.as_bytes())?;
        self.connection.flush_write(conn_limits).await?;
        self.connection.note_request_sent();
        Ok(())
    }

    /// Reads until the header terminator `\r\n\r\n` is present, parses the
    /// status line and header table, and returns the header block's
    /// length (head-relative) so the caller can `consume_head` past it.
    async fn recv_headers(
        &mut self,
        conn_limits: &ConnLimits,
        buf_limits: &BufferLimits,
    ) -> Result<(StatusCode, HeaderMap, usize), ErrorKind> {
        loop {
            let head = self.connection.read_buf.head();
            if let Some(term) = self.connection.read_buf.find_from(b"\r\n\r\n", head) {
                let header_block_len = term + 4 - head;
                let block = &self.connection.read_buf.as_slice()[..header_block_len];
                let (status, headers) = parse_status_and_headers(block)?;
                return Ok((status, headers, header_block_len));
            }

            if self.connection.read_buf.used() > buf_limits.max_header_bytes {
                return Err(ErrorKind::ProtocolError("response headers exceeded max_header_bytes"));
            }

            let n = self.connection.read_some(conn_limits).await?;
            if n == 0 {
                return Err(ErrorKind::ProtocolError("connection closed before headers completed"));
            }
        }
    }

    async fn recv_body(
        &mut self,
        headers: &HeaderMap,
        conn_limits: &ConnLimits,
        buf_limits: &BufferLimits,
    ) -> Result<Vec<u8>, ErrorKind> {
        if is_chunked(headers) {
            self.recv_chunked_body(conn_limits, buf_limits).await
        } else if let Some(len) = content_length(headers) {
            self.recv_fixed_body(len, conn_limits, buf_limits).await
        } else {
            self.recv_until_close(conn_limits, buf_limits).await
        }
    }

    /// On a redirect, any body bytes the server already sent for the
    /// discarded response must not leak into the next transaction's
    /// header scan. `Connection: close` means the socket is about to be
    /// torn down anyway, so this just reads-and-discards rather than
    /// tracking an exact byte count.
    async fn drain_remaining_body(
        &mut self,
        headers: &HeaderMap,
        conn_limits: &ConnLimits,
        buf_limits: &BufferLimits,
    ) -> Result<(), ErrorKind> {
        let _ = self.recv_body(headers, conn_limits, buf_limits).await;
        Ok(())
    }

    async fn recv_fixed_body(
        &mut self,
        len: usize,
        conn_limits: &ConnLimits,
        buf_limits: &BufferLimits,
    ) -> Result<Vec<u8>, ErrorKind> {
        if len > buf_limits.max_body_bytes {
            return Err(ErrorKind::ProtocolError("content-length exceeds max_body_bytes"));
        }

        while self.connection.read_buf.used() < len {
            if self.connection.read_some(conn_limits).await? == 0 {
                break; // peer closed early; return what arrived
            }
        }

        let have = self.connection.read_buf.used().min(len);
        let body = self.connection.read_buf.as_slice()[..have].to_vec();
        self.connection.read_buf.consume_head(have);
        Ok(body)
    }

    async fn recv_until_close(
        &mut self,
        conn_limits: &ConnLimits,
        buf_limits: &BufferLimits,
    ) -> Result<Vec<u8>, ErrorKind> {
        loop {
            if self.connection.read_buf.used() > buf_limits.max_body_bytes {
                return Err(ErrorKind::ProtocolError("body exceeded max_body_bytes"));
            }
            if self.connection.read_some(conn_limits).await? == 0 {
                break;
            }
        }

        let used = self.connection.read_buf.used();
        let body = self.connection.read_buf.as_slice().to_vec();
        self.connection.read_buf.consume_head(used);
        Ok(body)
    }

    /// Decodes a chunked body by repeatedly locating the next chunk-size
    /// line and `collapse`-ing it out of the live region in place, so the
    /// chunk payloads end up contiguous starting at the buffer's current
    /// head — exactly the in-place edit §4.3 and the REDESIGN FLAGS call
    /// for, kept as a real contract of [`Buffer`] rather than simulated
    /// with a separate output vector built as we go.
    async fn recv_chunked_body(
        &mut self,
        conn_limits: &ConnLimits,
        buf_limits: &BufferLimits,
    ) -> Result<Vec<u8>, ErrorKind> {
        let head = self.connection.read_buf.head();
        let mut body_len = 0usize;

        loop {
            let size_line_end = self.await_crlf(head + body_len, conn_limits, buf_limits).await?;
            let size_bytes = &self.connection.read_buf.as_slice()[body_len..size_line_end - head];
            let chunk_size = parse_chunk_size(size_bytes)?;
            let size_line_len = size_line_end - (head + body_len) + 2;

            if chunk_size == 0 {
                self.connection.read_buf.collapse(head + body_len, size_line_len);
                self.ensure_buffered(head + body_len + 2, conn_limits, buf_limits).await?;
                self.connection.read_buf.collapse(head + body_len, 2);
                break;
            }

            let needed = head + body_len + size_line_len + chunk_size + 2;
            self.ensure_buffered(needed, conn_limits, buf_limits).await?;

            self.connection.read_buf.collapse(head + body_len, size_line_len);
            body_len += chunk_size;
            self.connection.read_buf.collapse(head + body_len, 2);
        }

        let body = self.connection.read_buf.as_slice()[..body_len].to_vec();
        self.connection.read_buf.consume_head(body_len);
        Ok(body)
    }

    async fn await_crlf(
        &mut self,
        from_abs: usize,
        conn_limits: &ConnLimits,
        buf_limits: &BufferLimits,
    ) -> Result<usize, ErrorKind> {
        loop {
            if let Some(pos) = self.connection.read_buf.find_from(b"\r\n", from_abs) {
                return Ok(pos);
            }
            if self.connection.read_buf.used() > buf_limits.max_body_bytes {
                return Err(ErrorKind::ProtocolError("chunked body exceeded max_body_bytes"));
            }
            if self.connection.read_some(conn_limits).await? == 0 {
                return Err(ErrorKind::ProtocolError("connection closed mid chunk-size line"));
            }
        }
    }

    async fn ensure_buffered(
        &mut self,
        want_tail_at_least: usize,
        conn_limits: &ConnLimits,
        buf_limits: &BufferLimits,
    ) -> Result<(), ErrorKind> {
        while self.connection.read_buf.head() + self.connection.read_buf.used() < want_tail_at_least {
            if self.connection.read_buf.used() > buf_limits.max_body_bytes {
                return Err(ErrorKind::ProtocolError("chunked body exceeded max_body_bytes"));
            }
            if self.connection.read_some(conn_limits).await? == 0 {
                return Err(ErrorKind::ProtocolError("connection closed mid chunk data"));
            }
        }
        Ok(())
    }
}

fn is_chunked(headers: &HeaderMap) -> bool {
    headers
        .get("transfer-encoding")
        .map(|v| v.to_ascii_lowercase().contains("chunked"))
        .unwrap_or(false)
}

fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers.get("content-length")?.trim().parse().ok()
}

fn parse_chunk_size(bytes: &[u8]) -> Result<usize, ErrorKind> {
    let text = simdutf8::basic::from_utf8(bytes)
        .map_err(|_| ErrorKind::ProtocolError("chunk size line is not utf-8"))?;
    let token = text.split(';').next().unwrap_or(text).trim();
    usize::from_str_radix(token, 16).map_err(|_| ErrorKind::ProtocolError("malformed chunk size"))
}

fn parse_status_and_headers(block: &[u8]) -> Result<(StatusCode, HeaderMap), ErrorKind> {
    let text = simdutf8::basic::from_utf8(block)
        .map_err(|_| ErrorKind::ProtocolError("response headers are not valid utf-8"))?;
    let mut lines = text.split("\r\n");

    let status_line = lines
        .next()
        .ok_or(ErrorKind::ProtocolError("missing status line"))?;
    let mut parts = status_line.splitn(3, ' ');
    let _version = parts
        .next()
        .ok_or(ErrorKind::ProtocolError("malformed status line"))?;
    let code_str = parts
        .next()
        .ok_or(ErrorKind::ProtocolError("malformed status line"))?;
    let code: u16 = code_str
        .parse()
        .map_err(|_| ErrorKind::ProtocolError("malformed status code"))?;

    let mut headers = HeaderMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or(ErrorKind::ProtocolError("malformed header line"))?;
        headers.push(name.trim(), value.trim());
    }

    Ok((StatusCode(code), headers))
}

/// Resolves a `Location` header against the URL that produced it. Thin
/// wrapper over [`resolve_url`] kept for call-site clarity at the
/// redirect-following site.
fn resolve_redirect(original: &str, location: &str) -> Result<String, ErrorKind> {
    resolve_url(original, location)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_status_and_headers_reads_code_and_table() {
        let block = b"HTTP/1.1 301 Moved Permanently\r\nLocation: /final\r\nContent-Length: 0\r\n\r\n";
        let (status, headers) = parse_status_and_headers(block).unwrap();
        assert_eq!(status.as_u16(), 301);
        assert_eq!(headers.get("location"), Some("/final"));
        assert_eq!(headers.get("content-length"), Some("0"));
    }

    #[test]
    fn resolve_redirect_rejoins_root_relative_location() {
        let resolved = resolve_redirect("http://example.test/a/b", "/final").unwrap();
        assert_eq!(resolved, "http://example.test/final");
    }

    #[test]
    fn resolve_redirect_passes_through_absolute_location() {
        let resolved = resolve_redirect("http://example.test/a", "https://other.test/x").unwrap();
        assert_eq!(resolved, "https://other.test/x");
    }

    #[test]
    fn parse_chunk_size_reads_hex_and_ignores_extensions() {
        assert_eq!(parse_chunk_size(b"5").unwrap(), 5);
        assert_eq!(parse_chunk_size(b"7;ignored-ext").unwrap(), 7);
        assert_eq!(parse_chunk_size(b"0").unwrap(), 0);
        assert!(parse_chunk_size(b"not-hex").is_err());
    }

    #[test]
    fn is_chunked_matches_case_insensitively() {
        let mut headers = HeaderMap::new();
        headers.push("Transfer-Encoding", "Chunked");
        assert!(is_chunked(&headers));
    }
}
