// src/core/probe/tcp_probe.rs

use chrono::{DateTime, Utc};
use native_tls::{Certificate, TlsConnector as NativeTlsConnector};
use tokio::net::TcpStream;
use tokio_native_tls::TlsConnector;
use tracing::{debug, info, warn};
use x509_parser::prelude::*;

use crate::core::attempt::run_bounded;
use crate::core::error::{ProbeError, error_chain};
use crate::core::models::{CertificateInfo, ConnectionInfo, Endpoint, TcpTargetResult};
use crate::core::probe::ProbeSettings;
use crate::core::report::Report;
use crate::core::target::normalize_endpoint;

/// Opens TCP (and optionally TLS) connections. The TLS connector is built
/// once per run; certificate and hostname verification are always enforced.
pub struct ConnectionProber {
    tls: TlsConnector,
}

impl ConnectionProber {
    /// `alpn` lists the application protocols offered during the handshake.
    /// `roots` are trusted in addition to the system store.
    pub fn new(alpn: &[String], roots: &[Certificate]) -> Result<Self, native_tls::Error> {
        let protocols: Vec<&str> = alpn.iter().map(String::as_str).collect();
        let mut builder = NativeTlsConnector::builder();
        builder.request_alpns(&protocols);
        for root in roots {
            builder.add_root_certificate(root.clone());
        }
        let connector = builder.build()?;
        Ok(Self {
            tls: TlsConnector::from(connector),
        })
    }

    /// Connects to `endpoint` and, for TLS endpoints, completes the handshake.
    ///
    /// The socket lives only inside this future: it is closed when the future
    /// returns or when it is dropped by a deadline.
    pub async fn connect(&self, endpoint: &Endpoint) -> Result<ConnectionInfo, ProbeError> {
        let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await?;
        if !endpoint.use_tls {
            return Ok(ConnectionInfo {
                alpn: None,
                certificate: None,
            });
        }

        debug!(endpoint = %endpoint, sni = endpoint.tls_domain(), "Performing TLS handshake.");
        let tls = self
            .tls
            .connect(endpoint.tls_domain(), stream)
            .await
            .map_err(|e| ProbeError::transport(format!("TLS handshake failed: {}", error_chain(&e)), Some("ETLS")))?;

        let session = tls.get_ref();
        let alpn = session
            .negotiated_alpn()
            .ok()
            .flatten()
            .map(|proto| String::from_utf8_lossy(&proto).into_owned());
        let certificate = match session.peer_certificate() {
            Ok(Some(cert)) => cert.to_der().ok().and_then(|der| certificate_info(&der)),
            _ => None,
        };
        Ok(ConnectionInfo { alpn, certificate })
    }
}

fn certificate_info(der: &[u8]) -> Option<CertificateInfo> {
    let (_, x509) = parse_x509_certificate(der)
        .map_err(|e| warn!(error = %e, "Could not parse peer certificate."))
        .ok()?;
    let not_after = asn1_time_to_chrono_utc(&x509.validity().not_after);
    Some(CertificateInfo {
        subject_name: x509.subject().to_string(),
        issuer_name: x509.issuer().to_string(),
        not_after,
        days_until_expiry: not_after.signed_duration_since(Utc::now()).num_days(),
    })
}

fn asn1_time_to_chrono_utc(time: &ASN1Time) -> DateTime<Utc> {
    DateTime::from_timestamp(time.timestamp(), 0).unwrap_or_default()
}

/// Connects to every target and reports which ones were reachable.
pub async fn run_tcp_probe(
    prober: &ConnectionProber,
    targets: &[String],
    default_tls: bool,
    server_name: Option<&str>,
    settings: ProbeSettings,
) -> Report<TcpTargetResult> {
    info!(
        targets = targets.len(),
        tls = default_tls,
        max_attempts = settings.retry.max_attempts(),
        "Starting TCP probe."
    );

    let mut results = Vec::with_capacity(targets.len());
    for raw in targets {
        results.push(probe_target(prober, raw, default_tls, server_name, settings).await);
    }

    let report = Report::collect(results);
    info!(passed = report.overall_passed, failed = report.failed_targets.len(), "TCP probe finished.");
    report
}

async fn probe_target(
    prober: &ConnectionProber,
    raw: &str,
    default_tls: bool,
    server_name: Option<&str>,
    settings: ProbeSettings,
) -> TcpTargetResult {
    let mut result = TcpTargetResult {
        target: raw.trim().to_string(),
        endpoint: None,
        latency_ms: None,
        alpn: None,
        certificate: None,
        attempts: 0,
        passed: false,
        error: None,
    };

    let endpoint = match normalize_endpoint(raw, default_tls, server_name) {
        Ok(endpoint) => endpoint,
        Err(err) => {
            warn!(target = raw, error = %err, "Skipping malformed target.");
            result.error = Some(err);
            return result;
        }
    };
    result.target = endpoint.to_string();
    if endpoint.use_tls && endpoint.is_ip_literal() && endpoint.server_name.is_none() {
        debug!(endpoint = %endpoint, "TLS to an IP literal without a server name; the certificate must carry an IP SAN.");
    }

    let ep = &endpoint;
    let timeout = settings.timeout;
    let outcome = settings
        .retry
        .run(
            move |attempt| {
                debug!(endpoint = %ep, attempt, "Connecting.");
                run_bounded(timeout, prober.connect(ep))
            },
            |_| true,
        )
        .await;
    result.attempts = outcome.attempts;

    match outcome.result {
        Ok(timed) => {
            debug!(endpoint = %endpoint, latency_ms = timed.elapsed_ms(), alpn = ?timed.value.alpn, "Connection established.");
            result.latency_ms = Some(timed.elapsed_ms());
            result.alpn = timed.value.alpn;
            result.certificate = timed.value.certificate;
            result.passed = true;
        }
        Err(err) => {
            warn!(
                endpoint = %endpoint,
                attempts = outcome.attempts,
                timed_out = err.is_timeout(),
                error = %err,
                "Connection failed."
            );
            result.error = Some(err);
        }
    }
    result.endpoint = Some(endpoint);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use tokio::net::TcpListener;

    fn prober() -> ConnectionProber {
        ConnectionProber::new(&["h2".to_string(), "http/1.1".to_string()], &[]).unwrap()
    }

    /// Self-signed `localhost` identity plus the matching root for the client.
    fn localhost_identity() -> (native_tls::Identity, Certificate) {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let cert_pem = cert.serialize_pem().unwrap();
        let key_pem = cert.serialize_private_key_pem();
        let identity = native_tls::Identity::from_pkcs8(cert_pem.as_bytes(), key_pem.as_bytes()).unwrap();
        let root = Certificate::from_pem(cert_pem.as_bytes()).unwrap();
        (identity, root)
    }

    #[tokio::test]
    async fn plaintext_connection_passes_with_latency() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let report = run_tcp_probe(
            &prober(),
            &[addr.to_string()],
            false,
            None,
            ProbeSettings::new(Duration::from_secs(5), 0),
        )
        .await;

        let result = &report.results[0];
        assert!(report.overall_passed);
        assert_eq!(result.target, addr.to_string());
        assert!(result.latency_ms.is_some());
        assert_eq!(result.alpn, None);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.endpoint.as_ref().map(|e| e.port), Some(addr.port()));
    }

    #[tokio::test]
    async fn refused_connection_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let report = run_tcp_probe(
            &prober(),
            &[addr.to_string()],
            false,
            None,
            ProbeSettings::new(Duration::from_secs(5), 1),
        )
        .await;

        let result = &report.results[0];
        assert!(!result.passed);
        assert_eq!(result.attempts, 2);
        assert_eq!(result.error.as_ref().and_then(|e| e.code()), Some("ECONNREFUSED"));
        assert_eq!(report.failed_targets, vec![addr.to_string()]);
    }

    #[tokio::test]
    async fn stalled_tls_handshake_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept and hold the socket without ever answering the ClientHello.
        tokio::spawn(async move {
            if let Ok((socket, _)) = listener.accept().await {
                tokio::time::sleep(Duration::from_secs(30)).await;
                drop(socket);
            }
        });

        let started = Instant::now();
        let report = run_tcp_probe(
            &prober(),
            &[addr.to_string()],
            true,
            None,
            ProbeSettings::new(Duration::from_millis(300), 0),
        )
        .await;

        let result = &report.results[0];
        assert!(!result.passed);
        assert_eq!(result.error, Some(ProbeError::Timeout { deadline_ms: 300 }));
        assert!(started.elapsed() < Duration::from_secs(3), "must not hang past the deadline");
    }

    #[tokio::test]
    async fn tls_against_plaintext_server_fails_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((socket, _)) = listener.accept().await {
                drop(socket);
            }
        });

        let report = run_tcp_probe(
            &prober(),
            &[format!("https://{addr}")],
            false,
            None,
            ProbeSettings::new(Duration::from_secs(5), 0),
        )
        .await;

        let result = &report.results[0];
        assert!(!result.passed);
        assert_eq!(result.endpoint.as_ref().map(|e| e.use_tls), Some(true));
        assert_eq!(result.error.as_ref().and_then(|e| e.code()), Some("ETLS"));
    }

    #[tokio::test]
    async fn trusted_tls_handshake_passes_and_records_certificate() {
        let (identity, root) = localhost_identity();
        let acceptor = tokio_native_tls::TlsAcceptor::from(native_tls::TlsAcceptor::new(identity).unwrap());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((socket, _)) = listener.accept().await {
                let _ = acceptor.accept(socket).await;
            }
        });

        let prober = ConnectionProber::new(&["h2".to_string(), "http/1.1".to_string()], &[root]).unwrap();
        let report = run_tcp_probe(
            &prober,
            &[addr.to_string()],
            true,
            Some("localhost"),
            ProbeSettings::new(Duration::from_secs(5), 0),
        )
        .await;

        let result = &report.results[0];
        assert!(result.passed, "{:?}", result.error);
        assert!(report.overall_passed);
        assert_eq!(result.endpoint.as_ref().and_then(|e| e.server_name.as_deref()), Some("localhost"));
        assert!(result.latency_ms.is_some());
        let certificate = result.certificate.as_ref().expect("peer certificate recorded");
        assert!(certificate.subject_name.contains("rcgen"), "{}", certificate.subject_name);
        assert!(certificate.days_until_expiry > 0);
    }

    #[tokio::test]
    async fn untrusted_certificate_fails_verification() {
        let (identity, _) = localhost_identity();
        let acceptor = tokio_native_tls::TlsAcceptor::from(native_tls::TlsAcceptor::new(identity).unwrap());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((socket, _)) = listener.accept().await {
                let _ = acceptor.accept(socket).await;
            }
        });

        let report = run_tcp_probe(
            &prober(),
            &[addr.to_string()],
            true,
            Some("localhost"),
            ProbeSettings::new(Duration::from_secs(5), 0),
        )
        .await;

        let result = &report.results[0];
        assert!(!result.passed);
        assert_eq!(result.error.as_ref().and_then(|e| e.code()), Some("ETLS"));
    }

    #[tokio::test]
    async fn malformed_target_is_recorded_and_run_continues() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let report = run_tcp_probe(
            &prober(),
            &["example.com:notaport".to_string(), addr.to_string()],
            false,
            None,
            ProbeSettings::default(),
        )
        .await;

        assert!(matches!(report.results[0].error, Some(ProbeError::MalformedTarget { .. })));
        assert_eq!(report.results[0].target, "example.com:notaport");
        assert!(report.results[1].passed);
        assert!(!report.overall_passed);
    }
}
