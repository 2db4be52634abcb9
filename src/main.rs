// src/main.rs

use std::fs;
use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use tracing::{error, info};

mod config;
mod core;
mod logging;
mod pipeline;
mod ui;

use config::{Cli, ProbeConfig, Settings};
use crate::core::probe::{ConnectionProber, HickoryLookup, ReqwestSender, run_dns_probe, run_http_probe, run_tcp_probe};
use crate::core::report::{ProbeRecord, Report};
use pipeline::Publisher;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    logging::initialize_logging()?;

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        // --help and --version
        Err(err) if !err.use_stderr() => err.exit(),
        Err(err) => {
            let _ = err.print();
            return Ok(reject_configuration(&err.to_string()));
        }
    };
    let settings = match Settings::try_from(cli) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("error: {err}");
            return Ok(reject_configuration(&err.to_string()));
        }
    };

    let publisher = Publisher::detect(settings.report_dir.clone());
    info!(
        targets = settings.targets.len(),
        timeout_secs = settings.timeout.as_secs(),
        host = ?publisher.host(),
        "Starting network preflight."
    );

    let passed = match &settings.probe {
        ProbeConfig::Dns { record_type, resolver } => {
            let lookup = HickoryLookup::new(*resolver, settings.timeout);
            let report = run_dns_probe(&lookup, &settings.targets, *record_type, settings.timeout).await;
            finish(&publisher, &report)?
        }
        ProbeConfig::Http {
            method,
            expectation,
            retries,
        } => {
            let sender = ReqwestSender::new().wrap_err("building HTTP client")?;
            let report = run_http_probe(
                &sender,
                &settings.targets,
                *method,
                expectation,
                settings.probe_settings(*retries),
            )
            .await;
            finish(&publisher, &report)?
        }
        ProbeConfig::Tcp {
            use_tls,
            server_name,
            retries,
            alpn,
            ca_certificate,
        } => {
            let roots = match ca_certificate {
                Some(path) => vec![read_root_certificate(path)?],
                None => Vec::new(),
            };
            let prober = ConnectionProber::new(alpn, &roots).wrap_err("building TLS connector")?;
            let report = run_tcp_probe(
                &prober,
                &settings.targets,
                *use_tls,
                server_name.as_deref(),
                settings.probe_settings(*retries),
            )
            .await;
            finish(&publisher, &report)?
        }
    };

    Ok(if passed { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn reject_configuration(message: &str) -> ExitCode {
    error!(error = message, "Invalid configuration.");
    Publisher::detect(None).reject(message);
    ExitCode::FAILURE
}

fn read_root_certificate(path: &Path) -> Result<native_tls::Certificate> {
    let pem = fs::read(path).wrap_err_with(|| format!("reading CA certificate {}", path.display()))?;
    native_tls::Certificate::from_pem(&pem)
        .wrap_err_with(|| format!("parsing CA certificate {}", path.display()))
}

/// Publishes the report, prints the console summary and signals the verdict.
fn finish<R: ProbeRecord>(publisher: &Publisher, report: &Report<R>) -> Result<bool> {
    if let Err(err) = publisher.publish(report) {
        error!(error = ?err, "Could not publish the report.");
        publisher.log_error(&format!("{err:#}"));
        publisher.complete(false, "Report could not be written");
        return Err(err);
    }

    ui::print_report(report);
    publisher.complete(report.overall_passed, &report.verdict_message());
    Ok(report.overall_passed)
}
