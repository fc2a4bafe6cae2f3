use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use url::Url;

const DEFAULT_REDACTION: &str = "[REDACTED]";

static SENSITIVE_HEADER_KEYS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "authorization",
        "proxy-authorization",
        "x-algolia-api-key",
        "x-api-key",
    ]
    .into_iter()
    .collect()
});

static INLINE_REDACTION_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (
            Regex::new(r"\b(Bearer)\s+([A-Za-z0-9._~-]{10,})\b").expect("inline redaction regex"),
            "$1 ***REDACTED***",
        ),
        (
            Regex::new(r#"\b(access_token|refresh_token|api[_-]?key|value)"\s*:\s*"[^"]+""#)
                .expect("inline redaction regex"),
            r#"$1": "***REDACTED***""#,
        ),
    ]
});

pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_lowercase();
    if normalized.is_empty() {
        return false;
    }
    SENSITIVE_HEADER_KEYS.contains(normalized.as_str())
        || normalized.contains("api-key")
        || normalized.contains("apikey")
        || normalized.contains("token")
        || normalized.contains("secret")
}

/// Header map safe for logs.
pub fn redact_headers(headers: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(key, value)| {
            let shown = if is_sensitive_key(key) {
                DEFAULT_REDACTION.to_string()
            } else {
                value.clone()
            };
            (key.clone(), shown)
        })
        .collect()
}

/// URL safe for logs: credentials-looking query values are masked.
pub fn redact_url(url: &Url) -> String {
    if !url.query_pairs().any(|(key, _)| is_sensitive_key(&key)) {
        return url.to_string();
    }
    let mut out = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let shown = if is_sensitive_key(&k) {
                DEFAULT_REDACTION.to_string()
            } else {
                v.into_owned()
            };
            (k.into_owned(), shown)
        })
        .collect();
    out.query_pairs_mut().clear().extend_pairs(pairs);
    out.to_string()
}

pub fn redact_text(value: &str) -> String {
    let mut out = value.to_string();
    for (re, replacement) in INLINE_REDACTION_PATTERNS.iter() {
        if re.is_match(&out) {
            out = re.replace_all(&out, *replacement).to_string();
        }
    }
    out
}
