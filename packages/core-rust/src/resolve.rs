//! Lookup-domain selection for inbound requests.
//!
//! This is the transport-agnostic half of tenant resolution: given the raw
//! override header, override query parameter and request host, decide which
//! domain (if any) must be looked up in the catalog. The catalog lookup and
//! the active-state guard live in the server crate.
//!
//! Priority (first non-empty wins):
//! 1. override header
//! 2. override query parameter
//! 3. request host, unless it is a central domain or the dev host

use std::collections::HashSet;

use crate::domain::{host_without_port, normalize_domain};

/// Where the lookup domain came from. Recorded on the request span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainSource {
    /// The override header (default `X-Tenant-Domain`).
    Header,
    /// The override query parameter (default `tenant`).
    Query,
    /// The request's own host.
    Host,
}

impl DomainSource {
    /// Stable lowercase label used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DomainSource::Header => "header",
            DomainSource::Query => "query",
            DomainSource::Host => "host",
        }
    }
}

/// Outcome of lookup-domain selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupTarget {
    /// No tenant applies; the request runs against the catalog store only.
    Central,
    /// The catalog must be searched for this (normalized) domain.
    Tenant {
        /// Lowercased domain to look up.
        domain: String,
        /// Which input supplied it.
        source: DomainSource,
    },
}

/// Raw, unnormalized inputs taken from one request.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolutionInputs<'a> {
    /// Value of the override header, if present.
    pub header: Option<&'a str>,
    /// Value of the override query parameter, if present.
    pub query: Option<&'a str>,
    /// Request host, possibly with a `:port` suffix.
    pub host: Option<&'a str>,
}

/// Hosts that never resolve to a tenant when they arrive as the request host.
#[derive(Debug, Clone)]
pub struct CentralPolicy {
    central_domains: HashSet<String>,
    dev_host: String,
}

impl CentralPolicy {
    /// Builds a policy from already-split domain names and the dev host.
    ///
    /// Every entry is normalized, so configuration may use any letter case.
    pub fn new<I, S>(central_domains: I, dev_host: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            central_domains: central_domains
                .into_iter()
                .filter_map(|d| normalize_domain(d.as_ref()))
                .collect(),
            dev_host: normalize_domain(dev_host).unwrap_or_default(),
        }
    }

    /// Whether `host` (already normalized, port stripped) is exempt from
    /// tenant resolution.
    #[must_use]
    pub fn is_central(&self, host: &str) -> bool {
        host == self.dev_host || self.central_domains.contains(host)
    }

    /// Configured central domains, for diagnostics.
    pub fn central_domains(&self) -> impl Iterator<Item = &str> {
        self.central_domains.iter().map(String::as_str)
    }
}

impl Default for CentralPolicy {
    fn default() -> Self {
        Self::new(std::iter::empty::<&str>(), "localhost")
    }
}

/// Picks the domain to look up for a request.
///
/// Overrides are honoured even when they name a central domain: an explicit
/// override always means "bind this tenant".
#[must_use]
pub fn select_lookup_target(inputs: &ResolutionInputs<'_>, policy: &CentralPolicy) -> LookupTarget {
    if let Some(domain) = inputs.header.and_then(normalize_domain) {
        return LookupTarget::Tenant {
            domain,
            source: DomainSource::Header,
        };
    }
    if let Some(domain) = inputs.query.and_then(normalize_domain) {
        return LookupTarget::Tenant {
            domain,
            source: DomainSource::Query,
        };
    }
    match inputs
        .host
        .map(host_without_port)
        .and_then(normalize_domain)
    {
        Some(host) if !policy.is_central(&host) => LookupTarget::Tenant {
            domain: host,
            source: DomainSource::Host,
        },
        _ => LookupTarget::Central,
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn policy() -> CentralPolicy {
        CentralPolicy::new(["Central.Example", "admin.example"], "localhost")
    }

    fn tenant(domain: &str, source: DomainSource) -> LookupTarget {
        LookupTarget::Tenant {
            domain: domain.to_string(),
            source,
        }
    }

    #[test]
    fn header_beats_query_beats_host() {
        let inputs = ResolutionInputs {
            header: Some("one.test"),
            query: Some("two.test"),
            host: Some("three.test"),
        };
        assert_eq!(
            select_lookup_target(&inputs, &policy()),
            tenant("one.test", DomainSource::Header)
        );

        let inputs = ResolutionInputs {
            header: None,
            ..inputs
        };
        assert_eq!(
            select_lookup_target(&inputs, &policy()),
            tenant("two.test", DomainSource::Query)
        );

        let inputs = ResolutionInputs {
            query: None,
            ..inputs
        };
        assert_eq!(
            select_lookup_target(&inputs, &policy()),
            tenant("three.test", DomainSource::Host)
        );
    }

    #[test]
    fn empty_override_falls_through() {
        let inputs = ResolutionInputs {
            header: Some("  "),
            query: Some(""),
            host: Some("three.test"),
        };
        assert_eq!(
            select_lookup_target(&inputs, &policy()),
            tenant("three.test", DomainSource::Host)
        );
    }

    #[test]
    fn central_host_resolves_to_central_mode() {
        let inputs = ResolutionInputs {
            host: Some("CENTRAL.example:443"),
            ..ResolutionInputs::default()
        };
        assert_eq!(select_lookup_target(&inputs, &policy()), LookupTarget::Central);
    }

    #[test]
    fn dev_host_resolves_to_central_mode() {
        let inputs = ResolutionInputs {
            host: Some("localhost:8000"),
            ..ResolutionInputs::default()
        };
        assert_eq!(select_lookup_target(&inputs, &policy()), LookupTarget::Central);
    }

    #[test]
    fn missing_host_is_central() {
        assert_eq!(
            select_lookup_target(&ResolutionInputs::default(), &policy()),
            LookupTarget::Central
        );
    }

    #[test]
    fn override_naming_central_domain_is_still_honoured() {
        let inputs = ResolutionInputs {
            header: Some("central.example"),
            host: Some("localhost"),
            ..ResolutionInputs::default()
        };
        assert_eq!(
            select_lookup_target(&inputs, &policy()),
            tenant("central.example", DomainSource::Header)
        );
    }

    #[test]
    fn override_keeps_port_suffix() {
        // Dev setups pass the frontend origin, e.g. `?tenant=localhost:3000`.
        let inputs = ResolutionInputs {
            query: Some("LocalHost:3000"),
            ..ResolutionInputs::default()
        };
        assert_eq!(
            select_lookup_target(&inputs, &policy()),
            tenant("localhost:3000", DomainSource::Query)
        );
    }

    proptest! {
        #[test]
        fn header_always_wins_regardless_of_case(
            header in "[a-zA-Z]{1,12}\\.[a-zA-Z]{2,5}",
            query in proptest::option::of("[a-z]{1,12}\\.test"),
            host in proptest::option::of("[a-z]{1,12}\\.test"),
        ) {
            let inputs = ResolutionInputs {
                header: Some(header.as_str()),
                query: query.as_deref(),
                host: host.as_deref(),
            };
            prop_assert_eq!(
                select_lookup_target(&inputs, &policy()),
                LookupTarget::Tenant { domain: header.to_ascii_lowercase(), source: DomainSource::Header }
            );
        }
    }
}
