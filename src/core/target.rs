// src/core/target.rs

//! Turns raw target strings into probeable endpoints.

use std::net::IpAddr;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;
use url::Url;

use crate::core::error::ProbeError;
use crate::core::models::Endpoint;

const DEFAULT_TLS_PORT: u16 = 443;
const DEFAULT_PLAIN_PORT: u16 = 80;

static RE_SCHEME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://").unwrap());
static RE_BRACKETED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[([^\]]+)\](?::([^:]*))?$").unwrap());

/// Normalizes a TCP/TLS target (`host`, `host:port`, `scheme://host:port`,
/// `[v6]:port`) into an [`Endpoint`].
///
/// `default_tls` applies whenever the target itself does not imply a scheme.
/// `server_name` overrides the SNI name for every TLS endpoint.
pub fn normalize_endpoint(
    raw: &str,
    default_tls: bool,
    server_name: Option<&str>,
) -> Result<Endpoint, ProbeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ProbeError::malformed(raw, "empty target"));
    }

    let (host, port, use_tls) = if RE_SCHEME.is_match(trimmed) {
        split_url(trimmed, default_tls)?
    } else if let Some(caps) = RE_BRACKETED.captures(trimmed) {
        let host = caps[1].to_string();
        let port = match caps.get(2) {
            Some(p) => parse_port(trimmed, p.as_str())?,
            None => default_port(default_tls),
        };
        (host, port, default_tls)
    } else if let Some((left, right)) = single_colon_split(trimmed) {
        (left.to_string(), parse_port(trimmed, right)?, default_tls)
    } else {
        (trimmed.to_string(), default_port(default_tls), default_tls)
    };

    if host.is_empty() {
        return Err(ProbeError::malformed(raw, "no host"));
    }

    let is_ip = host.parse::<IpAddr>().is_ok();
    let server_name = match (use_tls, server_name.filter(|s| !s.trim().is_empty())) {
        (false, _) => None,
        (true, Some(name)) => Some(name.trim().to_string()),
        (true, None) if is_ip => None,
        (true, None) => Some(host.clone()),
    };

    let endpoint = Endpoint { host, port, use_tls, server_name };
    debug!(raw, endpoint = %endpoint, tls = use_tls, "Normalized target.");
    Ok(endpoint)
}

/// DNS names: surrounding whitespace and one trailing root dot are dropped.
pub fn normalize_dns_name(raw: &str) -> Result<String, ProbeError> {
    let trimmed = raw.trim();
    let name = trimmed.strip_suffix('.').unwrap_or(trimmed);
    if name.is_empty() {
        return Err(ProbeError::malformed(raw, "empty name"));
    }
    Ok(name.to_string())
}

/// HTTP targets are literal URLs; only whitespace is trimmed.
pub fn normalize_url(raw: &str) -> Result<(String, Url), ProbeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ProbeError::malformed(raw, "empty URL"));
    }
    let url = Url::parse(trimmed).map_err(|e| ProbeError::malformed(trimmed, e.to_string()))?;
    Ok((trimmed.to_string(), url))
}

fn split_url(target: &str, default_tls: bool) -> Result<(String, u16, bool), ProbeError> {
    let url = Url::parse(target).map_err(|e| ProbeError::malformed(target, e.to_string()))?;
    let use_tls = match url.scheme() {
        "https" => true,
        "http" => false,
        _ => default_tls,
    };
    let host = url
        .host_str()
        .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
        .ok_or_else(|| ProbeError::malformed(target, "URL has no host"))?;
    let port = match url.port() {
        Some(0) => return Err(ProbeError::malformed(target, "invalid port '0'")),
        Some(port) => port,
        None => default_port(use_tls),
    };
    Ok((host, port, use_tls))
}

fn single_colon_split(target: &str) -> Option<(&str, &str)> {
    if target.matches(':').count() != 1 {
        return None;
    }
    let (left, right) = target.split_once(':')?;
    if left.contains('/') {
        return None;
    }
    Some((left, right))
}

fn parse_port(target: &str, port: &str) -> Result<u16, ProbeError> {
    match port.trim().parse::<u16>() {
        Ok(p) if p > 0 => Ok(p),
        _ => Err(ProbeError::malformed(target, format!("invalid port '{port}'"))),
    }
}

fn default_port(use_tls: bool) -> u16 {
    if use_tls { DEFAULT_TLS_PORT } else { DEFAULT_PLAIN_PORT }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_and_port_ignore_default_tls_flag() {
        for tls in [true, false] {
            let ep = normalize_endpoint("example.com:8443", tls, None).unwrap();
            assert_eq!(ep.host, "example.com");
            assert_eq!(ep.port, 8443);
            assert_eq!(ep.use_tls, tls);
        }
    }

    #[test]
    fn https_scheme_implies_tls_and_443() {
        let ep = normalize_endpoint("https://example.com", false, None).unwrap();
        assert_eq!(ep.port, 443);
        assert!(ep.use_tls);
        assert_eq!(ep.server_name.as_deref(), Some("example.com"));
    }

    #[test]
    fn http_scheme_implies_plaintext_and_80() {
        let ep = normalize_endpoint("http://example.com/health", true, None).unwrap();
        assert_eq!(ep.port, 80);
        assert!(!ep.use_tls);
        assert_eq!(ep.server_name, None);
    }

    #[test]
    fn explicit_url_port_overrides_scheme_default() {
        let ep = normalize_endpoint("https://example.com:9443", false, None).unwrap();
        assert_eq!(ep.port, 9443);
        assert!(ep.use_tls);
    }

    #[test]
    fn bracketed_ipv6_with_port() {
        let ep = normalize_endpoint("[2001:db8::1]:8443", true, None).unwrap();
        assert_eq!(ep.host, "2001:db8::1");
        assert_eq!(ep.port, 8443);
        assert_eq!(ep.server_name, None, "IP literals get no SNI");
    }

    #[test]
    fn bracketed_ipv6_without_port_uses_default() {
        let ep = normalize_endpoint("[::1]", false, None).unwrap();
        assert_eq!(ep.host, "::1");
        assert_eq!(ep.port, 80);
    }

    #[test]
    fn bare_host_defaults_by_tls_flag() {
        assert_eq!(normalize_endpoint("example.com", true, None).unwrap().port, 443);
        assert_eq!(normalize_endpoint("example.com", false, None).unwrap().port, 80);
        let v6 = normalize_endpoint("::1", true, None).unwrap();
        assert_eq!(v6.host, "::1");
        assert_eq!(v6.port, 443);
    }

    #[test]
    fn sni_only_for_tls_hostnames() {
        let plain = normalize_endpoint("example.com:80", false, None).unwrap();
        assert_eq!(plain.server_name, None);

        let ip = normalize_endpoint("10.0.0.1:443", true, None).unwrap();
        assert_eq!(ip.server_name, None);

        let named = normalize_endpoint("example.com", true, None).unwrap();
        assert_eq!(named.server_name.as_deref(), Some("example.com"));
    }

    #[test]
    fn server_name_override_wins_when_tls() {
        let ep = normalize_endpoint("edge.example.net:443", true, Some("api.example.com")).unwrap();
        assert_eq!(ep.server_name.as_deref(), Some("api.example.com"));

        let ip = normalize_endpoint("10.0.0.1:443", true, Some("api.example.com")).unwrap();
        assert_eq!(ip.server_name.as_deref(), Some("api.example.com"));

        let plain = normalize_endpoint("example.com:80", false, Some("api.example.com")).unwrap();
        assert_eq!(plain.server_name, None);
    }

    #[test]
    fn normalization_is_idempotent_through_display() {
        for raw in ["example.com:8443", "https://example.com", "[::1]:9000", "10.1.2.3"] {
            let first = normalize_endpoint(raw, true, None).unwrap();
            let second = normalize_endpoint(&first.to_string(), first.use_tls, None).unwrap();
            assert_eq!(first, second, "{raw}");
        }
    }

    #[test]
    fn malformed_targets_are_rejected() {
        for raw in ["", "   ", ":443", "example.com:0", "example.com:http", "example.com:70000", "https://", "https://example.com:0"] {
            let err = normalize_endpoint(raw, true, None).unwrap_err();
            assert!(matches!(err, ProbeError::MalformedTarget { .. }), "{raw}: {err}");
        }
    }

    #[test]
    fn dns_names_lose_one_trailing_dot() {
        assert_eq!(normalize_dns_name(" example.com. ").unwrap(), "example.com");
        assert_eq!(normalize_dns_name("example.com").unwrap(), "example.com");
        assert!(normalize_dns_name(".").is_err());
        assert!(normalize_dns_name("  ").is_err());
    }

    #[test]
    fn urls_are_trimmed_and_validated() {
        let (url, parsed) = normalize_url("  https://example.com/health ").unwrap();
        assert_eq!(url, "https://example.com/health");
        assert_eq!(parsed.host_str(), Some("example.com"));
        assert!(normalize_url("not a url").is_err());
    }
}
