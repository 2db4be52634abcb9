// src/config.rs

//! Run inputs. Every option can come from the command line or from the
//! `INPUT_<NAME>` variable the pipeline agent exports for task inputs.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args, Parser, Subcommand};
use strum::VariantNames;
use thiserror::Error;

use crate::core::expectation::{ExpectationError, HttpExpectation, StatusExpectation};
use crate::core::models::{HttpMethod, RecordKind};
use crate::core::probe::ProbeSettings;

const DEFAULT_DNS_PORT: u16 = 53;

/// Problems with the inputs themselves. Fatal: no target is probed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no targets were provided")]
    NoTargets,
    #[error("an HTTP method is required")]
    MissingMethod,
    #[error("unsupported record type '{0}' (expected one of {expected})", expected = RecordKind::VARIANTS.join(", "))]
    UnsupportedRecordType(String),
    #[error("unsupported HTTP method '{0}' (expected one of {expected})", expected = HttpMethod::VARIANTS.join(", "))]
    UnsupportedMethod(String),
    #[error("invalid expected status '{expr}': {source}")]
    InvalidStatusExpression {
        expr: String,
        source: ExpectationError,
    },
    #[error("invalid resolver address '{0}'")]
    InvalidResolver(String),
    #[error("timeout must be at least one second")]
    InvalidTimeout,
}

#[derive(Debug, Parser)]
#[command(name = "network-preflight", version, about = "Pre-flight DNS, HTTP(S) and TCP/TLS reachability checks")]
pub struct Cli {
    #[command(subcommand)]
    pub probe: ProbeCommand,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Args)]
pub struct CommonArgs {
    /// Newline-delimited list of targets.
    #[arg(long, env = "INPUT_TARGETS", global = true)]
    pub targets: Option<String>,

    /// A single target; may be repeated.
    #[arg(short = 't', long = "target", global = true)]
    pub target: Vec<String>,

    /// Per-attempt timeout in seconds.
    #[arg(long, env = "INPUT_TIMEOUTSECONDS", default_value_t = 10, global = true)]
    pub timeout_seconds: u64,

    /// Directory receiving the report files.
    #[arg(long, env = "INPUT_REPORTDIRECTORY", global = true)]
    pub report_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum ProbeCommand {
    /// Resolve names and require at least one record.
    Dns(DnsArgs),
    /// Request URLs and match status and latency.
    Http(HttpArgs),
    /// Open TCP or TLS connections.
    Tcp(TcpArgs),
}

#[derive(Debug, Args)]
pub struct DnsArgs {
    #[arg(long, env = "INPUT_RECORDTYPE", default_value = "A")]
    pub record_type: String,

    /// Resolver to query instead of the system one (`ip` or `ip:port`).
    #[arg(long, env = "INPUT_RESOLVER")]
    pub resolver: Option<String>,
}

#[derive(Debug, Args)]
pub struct HttpArgs {
    #[arg(long, env = "INPUT_METHOD")]
    pub method: Option<String>,

    /// Comma-separated status codes and inclusive ranges, e.g. `200,301-302`.
    #[arg(long, env = "INPUT_EXPECTSTATUS", default_value = "200-399")]
    pub expect_status: String,

    /// Latency ceiling in milliseconds; 0 disables it.
    #[arg(long, env = "INPUT_MAXLATENCYMS", default_value_t = 0)]
    pub max_latency_ms: u64,

    #[arg(long, env = "INPUT_RETRIES", default_value_t = 0)]
    pub retries: u32,
}

#[derive(Debug, Args)]
pub struct TcpArgs {
    /// Use TLS for targets without an explicit scheme.
    #[arg(
        long,
        env = "INPUT_USETLS",
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub use_tls: bool,

    /// SNI name to present instead of the target host.
    #[arg(long, env = "INPUT_SERVERNAME")]
    pub server_name: Option<String>,

    #[arg(long, env = "INPUT_RETRIES", default_value_t = 0)]
    pub retries: u32,

    /// ALPN protocols offered during the TLS handshake.
    #[arg(long, env = "INPUT_ALPN", value_delimiter = ',', default_value = "h2,http/1.1")]
    pub alpn: Vec<String>,

    /// PEM file with an extra trusted root, for endpoints behind a private CA.
    #[arg(long, env = "INPUT_CACERTIFICATE")]
    pub ca_certificate: Option<PathBuf>,
}

/// Validated, typed inputs for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub targets: Vec<String>,
    pub timeout: Duration,
    pub report_dir: Option<PathBuf>,
    pub probe: ProbeConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProbeConfig {
    Dns {
        record_type: RecordKind,
        resolver: Option<SocketAddr>,
    },
    Http {
        method: HttpMethod,
        expectation: HttpExpectation,
        retries: u32,
    },
    Tcp {
        use_tls: bool,
        server_name: Option<String>,
        retries: u32,
        alpn: Vec<String>,
        ca_certificate: Option<PathBuf>,
    },
}

impl Settings {
    pub fn probe_settings(&self, retries: u32) -> ProbeSettings {
        ProbeSettings::new(self.timeout, retries)
    }
}

impl TryFrom<Cli> for Settings {
    type Error = ConfigError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let targets = collect_targets(cli.common.targets.as_deref(), &cli.common.target);
        if targets.is_empty() {
            return Err(ConfigError::NoTargets);
        }
        if cli.common.timeout_seconds == 0 {
            return Err(ConfigError::InvalidTimeout);
        }

        let probe = match cli.probe {
            ProbeCommand::Dns(args) => ProbeConfig::Dns {
                record_type: RecordKind::from_str(args.record_type.trim())
                    .map_err(|_| ConfigError::UnsupportedRecordType(args.record_type.clone()))?,
                resolver: args
                    .resolver
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(parse_resolver)
                    .transpose()?,
            },
            ProbeCommand::Http(args) => {
                let raw_method = args
                    .method
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .ok_or(ConfigError::MissingMethod)?;
                let method = HttpMethod::from_str(raw_method)
                    .map_err(|_| ConfigError::UnsupportedMethod(raw_method.to_string()))?;
                let status = StatusExpectation::from_str(&args.expect_status).map_err(|source| {
                    ConfigError::InvalidStatusExpression {
                        expr: args.expect_status.clone(),
                        source,
                    }
                })?;
                ProbeConfig::Http {
                    method,
                    expectation: HttpExpectation::new(status, args.max_latency_ms),
                    retries: args.retries,
                }
            }
            ProbeCommand::Tcp(args) => ProbeConfig::Tcp {
                use_tls: args.use_tls,
                server_name: args.server_name.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
                retries: args.retries,
                alpn: args
                    .alpn
                    .into_iter()
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect(),
                ca_certificate: args.ca_certificate.filter(|p| !p.as_os_str().is_empty()),
            },
        };

        Ok(Settings {
            targets,
            timeout: Duration::from_secs(cli.common.timeout_seconds),
            report_dir: cli.common.report_dir,
            probe,
        })
    }
}

/// Newline-delimited list plus repeated flags, blanks dropped, order kept.
fn collect_targets(list: Option<&str>, single: &[String]) -> Vec<String> {
    list.into_iter()
        .flat_map(str::lines)
        .chain(single.iter().map(String::as_str))
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_resolver(raw: &str) -> Result<SocketAddr, ConfigError> {
    if let Ok(addr) = raw.parse::<SocketAddr>() {
        return Ok(addr);
    }
    raw.trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, DEFAULT_DNS_PORT))
        .map_err(|_| ConfigError::InvalidResolver(raw.to_string()))
}
