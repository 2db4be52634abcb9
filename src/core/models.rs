// src/core/models.rs

use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, VariantNames};

use crate::core::error::ProbeError;

// --- Probe Kinds ---

/// The three families of checks a run can perform. One run = one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    #[strum(serialize = "DNS")]
    Dns,
    #[strum(serialize = "HTTP(S)")]
    Http,
    #[strum(serialize = "TCP")]
    Tcp,
}

impl ProbeKind {
    /// File stem used for the report artifacts (`dns-summary.md`, ...).
    pub fn slug(self) -> &'static str {
        match self {
            ProbeKind::Dns => "dns",
            ProbeKind::Http => "http",
            ProbeKind::Tcp => "tcp",
        }
    }
}

// --- DNS ---

/// Record types the DNS probe knows how to request.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, VariantNames,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordKind {
    A,
    Aaaa,
    Cname,
    Txt,
    Ns,
}

/// Final verdict for one DNS name.
#[derive(Debug, Clone, Serialize)]
pub struct DnsTargetResult {
    pub name: String,
    pub record_type: RecordKind,
    pub answers: Option<Vec<String>>,
    pub passed: bool,
    pub error: Option<ProbeError>,
}

// --- HTTP ---

/// Request methods accepted by the HTTP probe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, VariantNames,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

/// What a single HTTP attempt observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponseInfo {
    pub status: u16,
    pub server: Option<String>,
    pub via: Option<String>,
}

/// Final verdict for one URL.
#[derive(Debug, Clone, Serialize)]
pub struct HttpTargetResult {
    pub url: String,
    pub method: HttpMethod,
    pub status: Option<u16>,
    pub latency_ms: Option<u64>,
    pub server: Option<String>,
    pub via: Option<String>,
    pub attempts: u32,
    pub passed: bool,
    pub error: Option<ProbeError>,
}

// --- TCP / TLS ---

/// A target after normalization: always has a concrete port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    pub server_name: Option<String>,
}

impl Endpoint {
    pub fn is_ip_literal(&self) -> bool {
        self.host.parse::<IpAddr>().is_ok()
    }

    /// Name presented to the TLS stack: the SNI name when set, else the host.
    pub fn tls_domain(&self) -> &str {
        self.server_name.as_deref().unwrap_or(&self.host)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Summary of the peer certificate, recorded for diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateInfo {
    pub subject_name: String,
    pub issuer_name: String,
    pub not_after: DateTime<Utc>,
    pub days_until_expiry: i64,
}

/// What a single successful TCP/TLS connection attempt observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub alpn: Option<String>,
    pub certificate: Option<CertificateInfo>,
}

/// Final verdict for one TCP/TLS target.
#[derive(Debug, Clone, Serialize)]
pub struct TcpTargetResult {
    pub target: String,
    pub endpoint: Option<Endpoint>,
    pub latency_ms: Option<u64>,
    pub alpn: Option<String>,
    pub certificate: Option<CertificateInfo>,
    pub attempts: u32,
    pub passed: bool,
    pub error: Option<ProbeError>,
}
