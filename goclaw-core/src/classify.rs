//! Error classifier.
//!
//! Maps any transport/provider error text to a taxonomy reason by testing ordered,
//! case-insensitive substring patterns. Order matters: more specific categories are
//! tested before more general ones so a message like "context length exceeded due to
//! rate limiting upstream" still classifies as `context_overflow`.

use std::sync::OnceLock;

use regex::Regex;

/// Classification of a provider/transport error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Reason {
    ContextOverflow,
    Auth,
    RateLimit,
    Billing,
    Timeout,
    ServerError,
    Network,
    Unknown,
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Reason::ContextOverflow => "context_overflow",
            Reason::Auth => "auth",
            Reason::RateLimit => "rate_limit",
            Reason::Billing => "billing",
            Reason::Timeout => "timeout",
            Reason::ServerError => "server_error",
            Reason::Network => "network",
            Reason::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Ordered pattern table; evaluated top to bottom, first match wins.
const PATTERNS: &[(Reason, &[&str])] = &[
    (
        Reason::ContextOverflow,
        &[
            "context length",
            "context_length",
            "maximum context",
            "context window",
            "too many tokens",
            "context overflow",
        ],
    ),
    (
        Reason::Auth,
        &[
            "invalid api key",
            "incorrect api key",
            "unauthorized",
            "authentication",
            "api key not found",
            "invalid_api_key",
            "permission denied",
            "401",
        ],
    ),
    (
        Reason::RateLimit,
        &[
            "rate limit",
            "rate_limit",
            "too many requests",
            "429",
        ],
    ),
    (
        Reason::Billing,
        &[
            "insufficient quota",
            "billing",
            "payment required",
            "exceeded your current quota",
            "402",
        ],
    ),
    (
        Reason::Timeout,
        &["timeout", "timed out", "deadline exceeded"],
    ),
    (
        Reason::ServerError,
        &[
            "internal server error",
            "bad gateway",
            "service unavailable",
            "502",
            "503",
            "500",
        ],
    ),
    (
        Reason::Network,
        &[
            "connection refused",
            "connection reset",
            "dns",
            "network",
            "broken pipe",
            "econnrefused",
        ],
    ),
];

/// Classifies an error by its `Display`/`Debug` text against the ordered pattern table.
/// Matching is case-insensitive substring; `Reason::Unknown` when nothing matches.
pub fn classify(err: &str) -> Reason {
    let lower = err.to_lowercase();
    for (reason, needles) in PATTERNS {
        if needles.iter().any(|n| lower.contains(n)) {
            return *reason;
        }
    }
    Reason::Unknown
}

/// Retryable set: `{timeout, rate_limit, server_error, network, context_overflow}`.
pub fn is_retryable(reason: Reason) -> bool {
    matches!(
        reason,
        Reason::Timeout | Reason::RateLimit | Reason::ServerError | Reason::Network | Reason::ContextOverflow
    )
}

fn retry_after_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)reset\s+after\s+(\d+)\s*s").expect("valid regex"))
}

/// Parses a `"reset after Ns"` hint from upstream error text, clamped to
/// `[default_sec, max_sec]`. Returns `default_sec` when the pattern is absent.
pub fn extract_retry_after(err: &str, default_sec: u64, max_sec: u64) -> u64 {
    match retry_after_regex().captures(err) {
        Some(caps) => {
            let parsed: u64 = caps
                .get(1)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(default_sec);
            parsed.clamp(default_sec, max_sec)
        }
        None => default_sec,
    }
}
