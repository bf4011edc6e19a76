//! URL canonicalization and two-layer deduplication.
//!
//! Every record's identity is derived from its canonicalized source URL, so
//! re-ingesting the same fetch window is idempotent: the same URL always
//! hashes to the same id, and ids already persisted are rejected here.

use sha2::{Digest, Sha256};
use std::collections::HashSet;
use url::Url;

use crate::models::RawRecord;

/// Query parameters stripped during canonicalization. These vary per click,
/// not per document, and would defeat URL-based identity.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "ref",
    "ref_src",
    "fbclid",
    "gclid",
    "mc_cid",
    "mc_eid",
];

/// Canonicalize a URL to its single comparable form.
///
/// Lowercases scheme and host, upgrades http to https, strips default ports,
/// trailing slashes, tracking query parameters, and the fragment. Remaining
/// query parameters keep their original order. Unparseable input falls back
/// to trimmed lowercase so malformed records still get a stable id.
pub fn canonical_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut url) = Url::parse(trimmed) else {
        return trimmed.trim_end_matches('/').to_ascii_lowercase();
    };

    if url.scheme() == "http" {
        // Url::set_scheme is fallible but http -> https is always allowed.
        let _ = url.set_scheme("https");
    }
    if let Some(host) = url.host_str().map(|h| h.to_ascii_lowercase()) {
        let _ = url.set_host(Some(&host));
    }
    // Dropping the port leaves default-port and explicit-default-port URLs equal.
    if url.port() == Some(80) || url.port() == Some(443) {
        let _ = url.set_port(None);
    }
    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !TRACKING_PARAMS.contains(&k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    let mut s = url.to_string();
    while s.ends_with('/') && s.len() > url.scheme().len() + 3 {
        s.pop();
    }
    s
}

/// Derive the content-addressed record id from a URL.
///
/// Fixed-width: the first 16 bytes of sha256 over the canonical form,
/// hex-encoded (32 chars).
pub fn record_id(raw_url: &str) -> String {
    let canonical = canonical_url(raw_url);
    let digest = Sha256::digest(canonical.as_bytes());
    let mut id = String::with_capacity(32);
    for byte in &digest[..16] {
        id.push_str(&format!("{:02x}", byte));
    }
    id
}

/// Result of running a candidate batch through both dedup layers.
pub struct DedupOutcome {
    /// Survivors, paired with their derived ids, input order preserved.
    pub accepted: Vec<(String, RawRecord)>,
    /// Count rejected as intra-batch or cross-run duplicates.
    pub rejected: usize,
}

/// Deduplicate candidates against each other and against persisted ids.
///
/// Intra-batch: the first occurrence of an id wins. Cross-run: ids in
/// `already_seen` (window plus archive) are rejected unless `force_update`
/// lets them through for a metadata-refresh upsert.
pub fn dedupe(
    candidates: Vec<RawRecord>,
    already_seen: &HashSet<String>,
    force_update: bool,
) -> DedupOutcome {
    let mut seen_in_batch: HashSet<String> = HashSet::new();
    let mut accepted = Vec::new();
    let mut rejected = 0usize;

    for candidate in candidates {
        let id = record_id(&candidate.url);
        if seen_in_batch.contains(&id) {
            rejected += 1;
            continue;
        }
        if !force_update && already_seen.contains(&id) {
            rejected += 1;
            continue;
        }
        seen_in_batch.insert(id.clone());
        accepted.push((id, candidate));
    }

    DedupOutcome { accepted, rejected }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::models::SourceType;

    fn raw(url: &str) -> RawRecord {
        RawRecord {
            source_type: SourceType::Blog,
            source_name: "test".to_string(),
            title: "t".to_string(),
            url: url.to_string(),
            body_excerpt: String::new(),
            published_at: Utc::now(),
            popularity_signal: None,
            category_hint: None,
            extra: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_canonical_lowercases_scheme_and_host() {
        assert_eq!(
            canonical_url("HTTPS://Blog.Example.COM/Post"),
            "https://blog.example.com/Post"
        );
    }

    #[test]
    fn test_canonical_upgrades_http() {
        assert_eq!(
            canonical_url("http://example.com/a"),
            "https://example.com/a"
        );
    }

    #[test]
    fn test_canonical_strips_trailing_slash_and_default_port() {
        assert_eq!(
            canonical_url("https://example.com:443/a/"),
            "https://example.com/a"
        );
        assert_eq!(canonical_url("http://example.com:80/"), "https://example.com");
    }

    #[test]
    fn test_canonical_drops_tracking_params_keeps_rest() {
        assert_eq!(
            canonical_url("https://example.com/p?utm_source=x&id=7&fbclid=abc"),
            "https://example.com/p?id=7"
        );
    }

    #[test]
    fn test_canonical_drops_fragment() {
        assert_eq!(
            canonical_url("https://example.com/p#section-2"),
            "https://example.com/p"
        );
    }

    #[test]
    fn test_record_id_fixed_width_and_stable() {
        let a = record_id("https://example.com/post/");
        let b = record_id("http://EXAMPLE.com/post?utm_source=feed");
        assert_eq!(a.len(), 32);
        assert_eq!(a, b);
    }

    #[test]
    fn test_intra_batch_first_occurrence_wins() {
        let outcome = dedupe(
            vec![raw("https://a.com/1"), raw("http://A.com/1/"), raw("https://a.com/2")],
            &HashSet::new(),
            false,
        );
        assert_eq!(outcome.accepted.len(), 2);
        assert_eq!(outcome.rejected, 1);
        assert_eq!(outcome.accepted[0].1.url, "https://a.com/1");
    }

    #[test]
    fn test_cross_run_rejects_persisted_ids() {
        let mut seen = HashSet::new();
        seen.insert(record_id("https://a.com/1"));

        let outcome = dedupe(vec![raw("https://a.com/1")], &seen, false);
        assert!(outcome.accepted.is_empty());
        assert_eq!(outcome.rejected, 1);
    }

    #[test]
    fn test_force_update_readmits_persisted_ids() {
        let mut seen = HashSet::new();
        seen.insert(record_id("https://a.com/1"));

        let outcome = dedupe(vec![raw("https://a.com/1")], &seen, true);
        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(outcome.rejected, 0);
    }
}
