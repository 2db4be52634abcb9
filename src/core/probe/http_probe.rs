// src/core/probe/http_probe.rs

use reqwest::Method;
use reqwest::header::{HeaderMap, SERVER, VIA};
use tracing::{debug, info, warn};
use url::Url;

use crate::core::attempt::run_bounded;
use crate::core::error::{ProbeError, error_chain, find_io_error, io_error_code};
use crate::core::expectation::HttpExpectation;
use crate::core::models::{HttpMethod, HttpResponseInfo, HttpTargetResult};
use crate::core::probe::ProbeSettings;
use crate::core::report::Report;
use crate::core::target::normalize_url;

const USER_AGENT: &str = concat!("network-preflight/", env!("CARGO_PKG_VERSION"));

/// Issues one request and reports what came back.
pub trait HttpSend {
    async fn send(&self, method: HttpMethod, url: &Url) -> Result<HttpResponseInfo, ProbeError>;
}

/// `reqwest` client shared by every target of a run. Certificate validation
/// stays at the library default (always on).
pub struct ReqwestSender {
    client: reqwest::Client,
}

impl ReqwestSender {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client })
    }
}

impl HttpSend for ReqwestSender {
    async fn send(&self, method: HttpMethod, url: &Url) -> Result<HttpResponseInfo, ProbeError> {
        let response = self
            .client
            .request(to_reqwest_method(method), url.clone())
            .send()
            .await
            .map_err(request_error)?;

        // Only the head is needed; dropping the response releases the connection.
        let headers = response.headers();
        Ok(HttpResponseInfo {
            status: response.status().as_u16(),
            server: header_value(headers, SERVER.as_str()),
            via: header_value(headers, VIA.as_str()),
        })
    }
}

fn to_reqwest_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Head => Method::HEAD,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
        HttpMethod::Options => Method::OPTIONS,
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).map(|value| match value.to_str() {
        Ok(s) => s.to_string(),
        Err(_) => "[Invalid UTF-8]".to_string(),
    })
}

fn request_error(err: reqwest::Error) -> ProbeError {
    let code = if let Some(io) = find_io_error(&err) {
        io_error_code(io.kind())
    } else if err.is_connect() {
        "ECONNECT"
    } else if err.is_redirect() {
        "EREDIRECT"
    } else if err.is_timeout() {
        "ETIMEDOUT"
    } else {
        "EHTTP"
    };
    ProbeError::transport(error_chain(&err), Some(code))
}

/// Requests every URL, retrying per `settings`, and checks each final
/// response against `expectation`.
pub async fn run_http_probe<S: HttpSend>(
    sender: &S,
    targets: &[String],
    method: HttpMethod,
    expectation: &HttpExpectation,
    settings: ProbeSettings,
) -> Report<HttpTargetResult> {
    info!(
        targets = targets.len(),
        method = %method,
        expect = %expectation.status,
        retries = settings.retry.retries(),
        "Starting HTTP probe."
    );

    let mut results = Vec::with_capacity(targets.len());
    for raw in targets {
        results.push(probe_url(sender, raw, method, expectation, settings).await);
    }

    let report = Report::collect(results);
    info!(passed = report.overall_passed, failed = report.failed_targets.len(), "HTTP probe finished.");
    report
}

async fn probe_url<S: HttpSend>(
    sender: &S,
    raw: &str,
    method: HttpMethod,
    expectation: &HttpExpectation,
    settings: ProbeSettings,
) -> HttpTargetResult {
    let mut result = HttpTargetResult {
        url: raw.trim().to_string(),
        method,
        status: None,
        latency_ms: None,
        server: None,
        via: None,
        attempts: 0,
        passed: false,
        error: None,
    };

    let parsed = match normalize_url(raw) {
        Ok((_, parsed)) => parsed,
        Err(err) => {
            warn!(target = raw, error = %err, "Skipping malformed URL.");
            result.error = Some(err);
            return result;
        }
    };

    let url = &parsed;
    let timeout = settings.timeout;
    let outcome = settings
        .retry
        .run(
            move |attempt| {
                debug!(url = %url, attempt, "Sending HTTP request.");
                run_bounded(timeout, sender.send(method, url))
            },
            |timed| expectation.is_met(&timed.value, timed.elapsed),
        )
        .await;
    result.attempts = outcome.attempts;

    match outcome.result {
        Ok(timed) => {
            let verdict = expectation.check(&timed.value, timed.elapsed);
            debug!(
                url = %result.url,
                status = timed.value.status,
                latency_ms = timed.elapsed_ms(),
                passed = verdict.is_ok(),
                "HTTP response received."
            );
            result.status = Some(timed.value.status);
            result.latency_ms = Some(timed.elapsed_ms());
            result.server = timed.value.server;
            result.via = timed.value.via;
            result.passed = verdict.is_ok();
            result.error = verdict.err();
        }
        Err(err) => {
            warn!(url = %result.url, attempts = outcome.attempts, error = %err, "HTTP check failed.");
            result.error = Some(err);
        }
    }
    result
}
