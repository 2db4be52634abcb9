// src/core/probe/dns_probe.rs

use std::net::SocketAddr;
use std::time::Duration;

use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::proto::op::ResponseCode;
use hickory_resolver::proto::rr::RecordType;
use hickory_resolver::system_conf::read_system_conf;
use tracing::{debug, info, warn};

use crate::core::attempt::{RetryPolicy, run_bounded};
use crate::core::error::{ProbeError, io_error_code};
use crate::core::expectation::check_answers;
use crate::core::models::{DnsTargetResult, RecordKind};
use crate::core::report::Report;
use crate::core::target::normalize_dns_name;

/// Something that can answer "which records of this type exist for this name".
pub trait DnsLookup {
    async fn lookup(&self, name: &str, kind: RecordKind) -> Result<Vec<String>, ProbeError>;
}

/// Resolver-backed lookup, built once per run and shared by every target.
pub struct HickoryLookup {
    resolver: TokioAsyncResolver,
}

impl HickoryLookup {
    /// Uses `server` when given, the host's resolver configuration otherwise.
    ///
    /// Caching and resolver-internal retries are disabled: every target gets
    /// exactly one fresh query bounded by the probe's own deadline.
    pub fn new(server: Option<SocketAddr>, timeout: Duration) -> Self {
        let (config, mut opts) = match server {
            Some(addr) => {
                info!(resolver = %addr, "Using custom DNS resolver.");
                let group = NameServerConfigGroup::from_ips_clear(&[addr.ip()], addr.port(), true);
                (ResolverConfig::from_parts(None, vec![], group), ResolverOpts::default())
            }
            None => read_system_conf().unwrap_or_else(|e| {
                warn!(error = %e, "Could not read system resolver configuration, using defaults.");
                (ResolverConfig::default(), ResolverOpts::default())
            }),
        };
        opts.timeout = timeout;
        opts.attempts = 1;
        opts.cache_size = 0;

        Self {
            resolver: TokioAsyncResolver::tokio(config, opts),
        }
    }
}

impl DnsLookup for HickoryLookup {
    async fn lookup(&self, name: &str, kind: RecordKind) -> Result<Vec<String>, ProbeError> {
        let wanted = record_type(kind);
        let lookup = self.resolver.lookup(name, wanted).await.map_err(resolve_error)?;
        let answers = lookup
            .iter()
            .filter(|rdata| rdata.record_type() == wanted)
            .map(|rdata| {
                let text = rdata.to_string();
                match kind {
                    RecordKind::Cname | RecordKind::Ns => text.trim_end_matches('.').to_string(),
                    _ => text,
                }
            })
            .collect();
        Ok(answers)
    }
}

fn record_type(kind: RecordKind) -> RecordType {
    match kind {
        RecordKind::A => RecordType::A,
        RecordKind::Aaaa => RecordType::AAAA,
        RecordKind::Cname => RecordType::CNAME,
        RecordKind::Txt => RecordType::TXT,
        RecordKind::Ns => RecordType::NS,
    }
}

fn resolve_error(err: ResolveError) -> ProbeError {
    let code = match err.kind() {
        ResolveErrorKind::NoRecordsFound { response_code, .. } => match *response_code {
            ResponseCode::NXDomain => "ENOTFOUND",
            ResponseCode::NoError => "ENODATA",
            ResponseCode::ServFail => "ESERVFAIL",
            ResponseCode::Refused => "EREFUSED",
            _ => "EBADRESP",
        },
        ResolveErrorKind::Timeout => "ETIMEOUT",
        ResolveErrorKind::Io(io) => io_error_code(io.kind()),
        _ => "EDNS",
    };
    ProbeError::transport(err.to_string(), Some(code))
}

/// Resolves every name for `kind` and reports which ones returned records.
///
/// Each name gets a single attempt; a failure for one record type is final
/// (no fallback to a different type).
pub async fn run_dns_probe<L: DnsLookup>(
    lookup: &L,
    targets: &[String],
    kind: RecordKind,
    timeout: Duration,
) -> Report<DnsTargetResult> {
    info!(targets = targets.len(), record_type = %kind, "Starting DNS probe.");

    let mut results = Vec::with_capacity(targets.len());
    for raw in targets {
        results.push(probe_name(lookup, raw, kind, timeout).await);
    }

    let report = Report::collect(results);
    info!(passed = report.overall_passed, failed = report.failed_targets.len(), "DNS probe finished.");
    report
}

async fn probe_name<L: DnsLookup>(
    lookup: &L,
    raw: &str,
    kind: RecordKind,
    timeout: Duration,
) -> DnsTargetResult {
    let name = match normalize_dns_name(raw) {
        Ok(name) => name,
        Err(err) => {
            warn!(target = raw, error = %err, "Skipping malformed DNS name.");
            return DnsTargetResult {
                name: raw.trim().to_string(),
                record_type: kind,
                answers: None,
                passed: false,
                error: Some(err),
            };
        }
    };

    let query = name.as_str();
    let outcome = RetryPolicy::none()
        .run(
            move |_| run_bounded(timeout, lookup.lookup(query, kind)),
            |timed| check_answers(&timed.value).is_ok(),
        )
        .await;

    match outcome.result {
        Ok(timed) => {
            let error = check_answers(&timed.value).err();
            debug!(name = %name, answers = ?timed.value, elapsed_ms = timed.elapsed_ms(), "DNS lookup completed.");
            DnsTargetResult {
                name,
                record_type: kind,
                passed: error.is_none(),
                answers: Some(timed.value),
                error,
            }
        }
        Err(err) => {
            warn!(name = %name, record_type = %kind, error = %err, "DNS lookup failed.");
            DnsTargetResult {
                name,
                record_type: kind,
                answers: None,
                passed: false,
                error: Some(err),
            }
        }
    }
}
