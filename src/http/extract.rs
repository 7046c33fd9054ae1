//! The URL-extraction scanner: the one external collaborator §6 specifies
//! a contract for but leaves out of scope conceptually, implemented here
//! (per SPEC_FULL.md §1) so the crate actually builds and crawls.
//!
//! Grounded on the teacher's byte-scanning idiom (`memchr`/`memchr_iter`
//! over a lowercased copy, as in `http/types.rs::into_lower_case` and
//! `http/query.rs`'s delimiter search) rather than pulling in a regex
//! engine or an HTML parser — which the design's "Out of scope" section
//! is explicit this module should not become.

use crate::http::types::resolve_url;
use memchr::{memchr, memmem};

/// One candidate URL found in a document body: `start..end` delimits the
/// URL bytes (in the *original*, not lowercased, buffer) and `quote` is
/// the quote character that closed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrlCandidate {
    pub start: usize,
    pub end: usize,
    pub quote: u8,
}

const ATTRIBUTES: [&[u8]; 2] = [b"href", b"src"];
const JSON_KEYS: [&[u8]; 2] = [b"\"url\"", b"\"href\""];

/// Scans `body` for `href="…"`, `href='…'`, `src="…"`, `src='…'`
/// (case-insensitive) and the JSON-embedded `"url":"…"` / `"href":"…"`
/// forms, returning candidates in ascending `start` order with duplicate
/// start offsets collapsed.
pub fn extract_urls(body: &[u8]) -> Vec<UrlCandidate> {
    let lower: Vec<u8> = body.iter().map(u8::to_ascii_lowercase).collect();
    let mut out = Vec::new();

    for attr in ATTRIBUTES {
        scan_html_attribute(&lower, body, attr, &mut out);
    }
    for key in JSON_KEYS {
        scan_json_key(&lower, body, key, &mut out);
    }

    out.sort_by_key(|c| c.start);
    out.dedup_by_key(|c| c.start);
    out
}

/// `attr="value"` / `attr='value'`, tolerating whitespace around `=`.
/// The byte before the match must not be an identifier character, so
/// `href` doesn't fire inside `data-href` or similar.
fn scan_html_attribute(lower: &[u8], body: &[u8], attr: &[u8], out: &mut Vec<UrlCandidate>) {
    let mut pos = 0;
    while pos < lower.len() {
        let Some(rel) = memmem::find(&lower[pos..], attr) else {
            break;
        };
        let idx = pos + rel;

        if idx > 0 && is_ident_byte(lower[idx - 1]) {
            pos = idx + 1;
            continue;
        }

        let mut cursor = idx + attr.len();
        cursor = skip_ascii_whitespace(lower, cursor);

        if lower.get(cursor) != Some(&b'=') {
            pos = idx + 1;
            continue;
        }
        cursor += 1;
        cursor = skip_ascii_whitespace(lower, cursor);

        let Some(&quote @ (b'"' | b'\'')) = lower.get(cursor) else {
            pos = idx + 1;
            continue;
        };
        cursor += 1;

        match memchr(quote, &body[cursor..]) {
            Some(end_rel) => {
                let end = cursor + end_rel;
                out.push(UrlCandidate { start: cursor, end, quote });
                pos = end + 1;
            }
            None => break,
        }
    }
}

/// `"url":"value"` / `"href":"value"`, JSON-only so always double-quoted.
fn scan_json_key(lower: &[u8], body: &[u8], key: &[u8], out: &mut Vec<UrlCandidate>) {
    let mut pos = 0;
    while pos < lower.len() {
        let Some(rel) = memmem::find(&lower[pos..], key) else {
            break;
        };
        let idx = pos + rel;

        let mut cursor = idx + key.len();
        cursor = skip_ascii_whitespace(lower, cursor);

        if lower.get(cursor) != Some(&b':') {
            pos = idx + 1;
            continue;
        }
        cursor += 1;
        cursor = skip_ascii_whitespace(lower, cursor);

        if lower.get(cursor) != Some(&b'"') {
            pos = idx + 1;
            continue;
        }
        cursor += 1;

        match memchr(b'"', &body[cursor..]) {
            Some(end_rel) => {
                let end = cursor + end_rel;
                out.push(UrlCandidate { start: cursor, end, quote: b'"' });
                pos = end + 1;
            }
            None => break,
        }
    }
}

/// Document transformation: rewrites every URL `extract_urls` finds into
/// its absolute form against `base_url`, leaving everything else in
/// `body` byte-for-byte unchanged. Relative URLs that fail to resolve are
/// left untouched rather than dropping the page. Per §4.6's "rewrite
/// intra-document URLs to absolute form... persist the transformed
/// page".
pub fn rewrite_to_absolute(body: &[u8], base_url: &str) -> Vec<u8> {
    let candidates = extract_urls(body);
    let mut out = Vec::with_capacity(body.len());
    let mut cursor = 0;

    for candidate in candidates {
        out.extend_from_slice(&body[cursor..candidate.start]);
        match simdutf8::basic::from_utf8(&body[candidate.start..candidate.end])
            .ok()
            .and_then(|raw| resolve_url(base_url, raw).ok())
        {
            Some(absolute) => out.extend_from_slice(absolute.as_bytes()),
            None => out.extend_from_slice(&body[candidate.start..candidate.end]),
        }
        cursor = candidate.end;
    }
    out.extend_from_slice(&body[cursor..]);
    out
}

#[inline(always)]
fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

#[inline(always)]
fn skip_ascii_whitespace(buf: &[u8], mut pos: usize) -> usize {
    while matches!(buf.get(pos), Some(b) if b.is_ascii_whitespace()) {
        pos += 1;
    }
    pos
}
