//! Candidate-URL validation shared by the sequential scheduler and the
//! fast-mode worker pool — the "reject if malformed... reject if
//! blacklisted... reject if cross-domain and disabled" rule from §4.6,
//! factored out so both schedulers apply it identically.

use crate::{
    errors::{ErrorKind, PolicyReason},
    http::types::parse_host,
    limits::BufferLimits,
    options::CrawlOptions,
};

/// Checks `candidate` (already resolved to an absolute URL) against the
/// policy rules from §4.6/§7, in the order the spec lists them. Does
/// *not* check the archive — callers consult that separately, since it
/// requires a lock in fast mode and this function stays lock-free.
pub fn validate(candidate: &str, primary_host: &str, opts: &CrawlOptions, buf_limits: &BufferLimits) -> Result<(), ErrorKind> {
    if !(candidate.starts_with("http://") || candidate.starts_with("https://")) {
        return Err(ErrorKind::PolicyDrop(PolicyReason::UnsupportedScheme));
    }
    if candidate.starts_with("mailto:") {
        return Err(ErrorKind::PolicyDrop(PolicyReason::Mailto));
    }
    if candidate.len() > buf_limits.url_max {
        return Err(ErrorKind::PolicyDrop(PolicyReason::TooLong));
    }

    let host = parse_host(candidate).map_err(|_| ErrorKind::PolicyDrop(PolicyReason::UnsupportedScheme))?;
    let bare_host = host.split(':').next().unwrap_or(host);
    if !bare_host.contains('.') {
        return Err(ErrorKind::PolicyDrop(PolicyReason::MissingDot));
    }

    if opts.blacklist.iter().any(|token| candidate.contains(token.as_str())) {
        return Err(ErrorKind::PolicyDrop(PolicyReason::Blacklisted));
    }

    if !opts.cross_domain && !same_host(bare_host, primary_host) {
        return Err(ErrorKind::PolicyDrop(PolicyReason::CrossDomain));
    }

    Ok(())
}

fn same_host(candidate_host: &str, primary_host: &str) -> bool {
    let primary_bare = primary_host.split(':').next().unwrap_or(primary_host);
    candidate_host.eq_ignore_ascii_case(primary_bare)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> CrawlOptions {
        CrawlOptions {
            seed_url: "http://example.test/".into(),
            max_depth: 3,
            crawl_delay: std::time::Duration::ZERO,
            fast_mode: false,
            fast_mode_workers: 8,
            cache_threshold: None,
            cross_domain: false,
            blacklist: vec![],
            tls_for_seed: false,
            dot_dir: std::path::PathBuf::from("/tmp/webscout-policy-test"),
            follow_redirects: true,
            max_redirects: 5,
            request_timeout: std::time::Duration::from_secs(15),
            user_agent: "webscout-test".into(),
        }
    }

    #[test]
    fn rejects_non_http_schemes() {
        let o = opts();
        let limits = BufferLimits::default();
        assert!(matches!(
            validate("ftp://example.test/x", "example.test", &o, &limits),
            Err(ErrorKind::PolicyDrop(PolicyReason::UnsupportedScheme))
        ));
    }

    #[test]
    fn rejects_mailto() {
        let o = opts();
        let limits = BufferLimits::default();
        assert!(matches!(
            validate("mailto:a@example.test", "example.test", &o, &limits),
            Err(ErrorKind::PolicyDrop(PolicyReason::Mailto))
        ));
    }

    #[test]
    fn rejects_cross_domain_when_disabled() {
        let o = opts();
        let limits = BufferLimits::default();
        assert!(matches!(
            validate("http://other.test/x", "example.test", &o, &limits),
            Err(ErrorKind::PolicyDrop(PolicyReason::CrossDomain))
        ));
    }

    #[test]
    fn allows_cross_domain_when_enabled() {
        let mut o = opts();
        o.cross_domain = true;
        let limits = BufferLimits::default();
        assert!(validate("http://other.test/x", "example.test", &o, &limits).is_ok());
    }

    #[test]
    fn rejects_blacklisted_substrings() {
        let mut o = opts();
        o.blacklist = vec!["ads".to_string()];
        let limits = BufferLimits::default();
        assert!(matches!(
            validate("http://example.test/ads/x", "example.test", &o, &limits),
            Err(ErrorKind::PolicyDrop(PolicyReason::Blacklisted))
        ));
    }

    #[test]
    fn rejects_hosts_without_a_dot() {
        let o = opts();
        let limits = BufferLimits::default();
        assert!(matches!(
            validate("http://localhost/x", "localhost", &o, &limits),
            Err(ErrorKind::PolicyDrop(PolicyReason::MissingDot))
        ));
    }

    #[test]
    fn accepts_well_formed_same_host_url() {
        let o = opts();
        let limits = BufferLimits::default();
        assert!(validate("http://example.test/other", "example.test", &o, &limits).is_ok());
    }
}
