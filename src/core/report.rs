// src/core/report.rs

//! Aggregates per-target results into a run report and renders it.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::error::ProbeError;
use crate::core::models::{DnsTargetResult, HttpTargetResult, ProbeKind, TcpTargetResult};

/// Behaviour shared by the per-kind result types so one aggregator serves all three.
pub trait ProbeRecord: Serialize {
    const KIND: ProbeKind;
    const COLUMNS: &'static [&'static str];
    /// Markdown alignment row matching `COLUMNS`.
    const ALIGNMENT: &'static [&'static str];

    /// Identifier reported in `failed_targets`.
    fn target(&self) -> &str;
    fn passed(&self) -> bool;
    fn error(&self) -> Option<&ProbeError>;
    fn cells(&self) -> Vec<String>;

    fn success_message() -> String;
    fn failure_message(failed: &[String]) -> String;

    /// Pipeline variable that receives the comma-joined failed targets, if any.
    fn failed_targets_variable() -> Option<&'static str> {
        None
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Report<R> {
    pub kind: ProbeKind,
    pub generated_at: DateTime<Utc>,
    pub results: Vec<R>,
    pub overall_passed: bool,
    pub failed_targets: Vec<String>,
}

impl<R: ProbeRecord> Report<R> {
    /// Builds the report; results keep their input order.
    pub fn collect(results: Vec<R>) -> Self {
        let (overall_passed, failed_targets) =
            results
                .iter()
                .fold((true, Vec::new()), |(all, mut failed), result| {
                    if !result.passed() {
                        failed.push(result.target().to_string());
                    }
                    (all && result.passed(), failed)
                });
        Self {
            kind: R::KIND,
            generated_at: Utc::now(),
            results,
            overall_passed,
            failed_targets,
        }
    }

    /// Short message for the host's final status.
    pub fn verdict_message(&self) -> String {
        if self.overall_passed {
            R::success_message()
        } else {
            R::failure_message(&self.failed_targets)
        }
    }

    pub fn title(&self) -> String {
        format!("Network Preflight: {}", self.kind)
    }

    pub fn to_markdown(&self) -> String {
        let mut lines = vec![
            format!("# {}", self.title()),
            table_row(R::COLUMNS.iter().map(|c| c.to_string())),
            table_row(R::ALIGNMENT.iter().map(|c| c.to_string())),
        ];
        for result in &self.results {
            lines.push(table_row(result.cells().into_iter().map(|c| escape_cell(&c))));
        }
        lines.join("\n")
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn table_row(cells: impl Iterator<Item = String>) -> String {
    let cells: Vec<String> = cells.collect();
    format!("| {} |", cells.join(" | "))
}

fn escape_cell(cell: &str) -> String {
    cell.replace('|', "\\|").replace(['\r', '\n'], " ")
}

fn ok_mark(passed: bool) -> String {
    (if passed { "✅" } else { "❌" }).to_string()
}

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn error_text(error: Option<&ProbeError>) -> String {
    error.map(ToString::to_string).unwrap_or_else(|| "unknown error".to_string())
}

impl ProbeRecord for DnsTargetResult {
    const KIND: ProbeKind = ProbeKind::Dns;
    const COLUMNS: &'static [&'static str] = &["Name", "Type", "Answers", "OK"];
    const ALIGNMENT: &'static [&'static str] = &["---", ":--:", "---", ":--:"];

    fn target(&self) -> &str {
        &self.name
    }

    fn passed(&self) -> bool {
        self.passed
    }

    fn error(&self) -> Option<&ProbeError> {
        self.error.as_ref()
    }

    fn cells(&self) -> Vec<String> {
        let answers = match &self.answers {
            Some(answers) if !answers.is_empty() => answers.join(", "),
            _ => error_text(self.error.as_ref()),
        };
        vec![
            self.name.clone(),
            self.record_type.to_string(),
            answers,
            ok_mark(self.passed),
        ]
    }

    fn success_message() -> String {
        "All DNS lookups resolved".to_string()
    }

    fn failure_message(failed: &[String]) -> String {
        format!("Unresolved DNS: {}", failed.join(", "))
    }
}

impl ProbeRecord for HttpTargetResult {
    const KIND: ProbeKind = ProbeKind::Http;
    const COLUMNS: &'static [&'static str] = &["URL", "Status", "Latency (ms)", "OK"];
    const ALIGNMENT: &'static [&'static str] = &["---", "---:", "---:", ":--:"];

    fn target(&self) -> &str {
        &self.url
    }

    fn passed(&self) -> bool {
        self.passed
    }

    fn error(&self) -> Option<&ProbeError> {
        self.error.as_ref()
    }

    fn cells(&self) -> Vec<String> {
        let status = match self.status {
            Some(status) => status.to_string(),
            None => error_text(self.error.as_ref()),
        };
        vec![
            self.url.clone(),
            status,
            or_dash(self.latency_ms),
            ok_mark(self.passed),
        ]
    }

    fn success_message() -> String {
        "All HTTP checks passed".to_string()
    }

    fn failure_message(failed: &[String]) -> String {
        format!("HTTP check failed for: {}", failed.join(", "))
    }

    fn failed_targets_variable() -> Option<&'static str> {
        Some("NetworkPreflight.FailedTargets")
    }
}

impl ProbeRecord for TcpTargetResult {
    const KIND: ProbeKind = ProbeKind::Tcp;
    const COLUMNS: &'static [&'static str] = &["Target", "Latency (ms)", "ALPN", "OK"];
    const ALIGNMENT: &'static [&'static str] = &["---", "---:", ":--:", ":--:"];

    fn target(&self) -> &str {
        &self.target
    }

    fn passed(&self) -> bool {
        self.passed
    }

    fn error(&self) -> Option<&ProbeError> {
        self.error.as_ref()
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.target.clone(),
            or_dash(self.latency_ms),
            or_dash(self.alpn.as_deref()),
            ok_mark(self.passed),
        ]
    }

    fn success_message() -> String {
        "All TCP targets reachable".to_string()
    }

    fn failure_message(failed: &[String]) -> String {
        format!("TCP unreachable: {}", failed.join(", "))
    }
}
