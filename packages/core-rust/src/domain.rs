//! Routing-domain normalization.
//!
//! Tenant domains are case-insensitive. Every value that is compared against
//! the catalog (override header, override query parameter, request host,
//! configured central domains) goes through [`normalize_domain`] first.

/// Trims and lowercases a domain candidate.
///
/// Returns `None` for empty or whitespace-only input so callers can treat
/// "present but empty" the same as "absent".
#[must_use]
pub fn normalize_domain(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_ascii_lowercase())
    }
}

/// Strips an optional `:port` suffix from a `Host` header value.
///
/// Bracketed IPv6 literals (`[::1]:8080`) keep their brackets. A bare IPv6
/// literal without brackets is returned unchanged, since its colons are not a
/// port separator.
#[must_use]
pub fn host_without_port(host: &str) -> &str {
    let host = host.trim();
    if let Some(rest) = host.strip_prefix('[') {
        return match rest.find(']') {
            Some(end) => &host[..end + 2],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, port))
            if !name.contains(':') && !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) =>
        {
            name
        }
        _ => host,
    }
}

/// Parses a comma-separated domain list (e.g. the `CENTRAL_DOMAINS` setting).
///
/// Entries are normalized; empty entries are dropped.
#[must_use]
pub fn parse_domain_list(csv: &str) -> Vec<String> {
    csv.split(',').filter_map(normalize_domain).collect()
}
