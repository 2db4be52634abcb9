// src/pipeline.rs

//! Hand-off to the host: report files, attachments, variables and the final
//! task status. Logging commands are only emitted under the pipeline agent.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use color_eyre::eyre::{Result, WrapErr};
use tracing::{debug, info};

use crate::core::report::{ProbeRecord, Report};

const SUMMARY_ATTACHMENT_TYPE: &str = "Distributedtask.Core.Summary";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Host {
    AzurePipelines,
    Local,
}

impl Host {
    pub fn detect() -> Self {
        if env::var_os("TF_BUILD").is_some() {
            Host::AzurePipelines
        } else {
            Host::Local
        }
    }
}

/// Paths of the artifacts written for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedReport {
    pub markdown: PathBuf,
    pub json: PathBuf,
}

pub struct Publisher {
    host: Host,
    report_dir: PathBuf,
}

impl Publisher {
    /// Report directory: explicit input, then the agent's temp directory, then cwd.
    pub fn detect(report_dir: Option<PathBuf>) -> Self {
        let report_dir = report_dir
            .or_else(|| env::var_os("AGENT_TEMPDIRECTORY").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(Host::detect(), report_dir)
    }

    pub fn new(host: Host, report_dir: PathBuf) -> Self {
        Self { host, report_dir }
    }

    pub fn host(&self) -> Host {
        self.host
    }

    /// Writes the Markdown and JSON reports and registers the summary attachment.
    pub fn publish<R: ProbeRecord>(&self, report: &Report<R>) -> Result<PublishedReport> {
        fs::create_dir_all(&self.report_dir)
            .wrap_err_with(|| format!("creating report directory {}", self.report_dir.display()))?;

        let stem = format!("{}-summary", report.kind.slug());
        let markdown = self.report_dir.join(format!("{stem}.md"));
        let json = self.report_dir.join(format!("{stem}.json"));

        write_file(&markdown, &report.to_markdown())?;
        let body = report.to_json().wrap_err("serializing report")?;
        write_file(&json, &body)?;
        info!(markdown = %markdown.display(), json = %json.display(), "Report written.");

        self.emit(&attachment_command(&report.title(), &absolute(&markdown)));
        if let Some(variable) = R::failed_targets_variable() {
            self.emit(&set_variable_command(variable, &report.failed_targets.join(",")));
        }

        Ok(PublishedReport { markdown, json })
    }

    /// Final task status.
    pub fn complete(&self, passed: bool, message: &str) {
        self.emit(&complete_command(passed, message));
    }

    /// Surfaces an error on the run summary page.
    pub fn log_error(&self, message: &str) {
        self.emit(&log_error_command(message));
    }

    /// Fails the task before any target was probed.
    pub fn reject(&self, message: &str) {
        for command in rejection_commands(message) {
            self.emit(&command);
        }
    }

    fn emit(&self, command: &str) {
        match self.host {
            Host::AzurePipelines => println!("{command}"),
            Host::Local => debug!(command, "Pipeline command suppressed outside the agent."),
        }
    }
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).wrap_err_with(|| format!("writing {}", path.display()))
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

pub fn attachment_command(name: &str, path: &Path) -> String {
    format!(
        "##vso[task.addattachment type={SUMMARY_ATTACHMENT_TYPE};name={}]{}",
        escape_property(name),
        escape_data(&path.display().to_string())
    )
}

pub fn set_variable_command(name: &str, value: &str) -> String {
    format!(
        "##vso[task.setvariable variable={}]{}",
        escape_property(name),
        escape_data(value)
    )
}

pub fn log_error_command(message: &str) -> String {
    format!("##vso[task.logissue type=error]{}", escape_data(message))
}

/// The full message goes to the issue; its first non-blank line becomes the status.
pub fn rejection_commands(message: &str) -> [String; 2] {
    let summary = message
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("invalid configuration");
    [log_error_command(message.trim_end()), complete_command(false, summary)]
}

pub fn complete_command(passed: bool, message: &str) -> String {
    let result = if passed { "Succeeded" } else { "Failed" };
    format!("##vso[task.complete result={result};]{}", escape_data(message))
}

fn escape_data(value: &str) -> String {
    value
        .replace('%', "%AZP25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

fn escape_property(value: &str) -> String {
    escape_data(value).replace(';', "%3B").replace(']', "%5D")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ProbeError;
    use crate::core::models::{HttpMethod, HttpTargetResult};

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("network-preflight-{}-{name}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn http_result(url: &str, passed: bool) -> HttpTargetResult {
        HttpTargetResult {
            url: url.to_string(),
            method: HttpMethod::Get,
            status: Some(if passed { 200 } else { 503 }),
            latency_ms: Some(20),
            server: None,
            via: None,
            attempts: 1,
            passed,
            error: (!passed).then(|| ProbeError::expectation("status 503 not in 200-399")),
        }
    }

    #[test]
    fn commands_are_escaped() {
        assert_eq!(
            complete_command(false, "HTTP check failed for: a, b\n100%"),
            "##vso[task.complete result=Failed;]HTTP check failed for: a, b%0A100%AZP25"
        );
        assert_eq!(
            set_variable_command("NetworkPreflight.FailedTargets", "https://a,https://b"),
            "##vso[task.setvariable variable=NetworkPreflight.FailedTargets]https://a,https://b"
        );
        assert_eq!(
            attachment_command("Network Preflight: DNS", Path::new("/tmp/dns-summary.md")),
            "##vso[task.addattachment type=Distributedtask.Core.Summary;name=Network Preflight: DNS]/tmp/dns-summary.md"
        );
        assert_eq!(escape_property("a;b]c"), "a%3Bb%5Dc");
    }

    #[test]
    fn rejection_fails_the_task_with_the_first_line() {
        let [issue, complete] = rejection_commands(
            "error: invalid value 'abc' for '--timeout-seconds <TIMEOUT_SECONDS>'\n\nFor more information, try '--help'.\n",
        );
        assert_eq!(
            issue,
            "##vso[task.logissue type=error]error: invalid value 'abc' for '--timeout-seconds <TIMEOUT_SECONDS>'%0A%0AFor more information, try '--help'."
        );
        assert_eq!(
            complete,
            "##vso[task.complete result=Failed;]error: invalid value 'abc' for '--timeout-seconds <TIMEOUT_SECONDS>'"
        );

        let [_, fallback] = rejection_commands("  \n");
        assert_eq!(fallback, "##vso[task.complete result=Failed;]invalid configuration");
    }

    #[test]
    fn publish_writes_markdown_and_json() {
        let dir = scratch_dir("publish");
        let publisher = Publisher::new(Host::Local, dir.clone());
        let report = Report::collect(vec![http_result("https://ok", true), http_result("https://down", false)]);

        let written = publisher.publish(&report).unwrap();
        assert_eq!(written.markdown, dir.join("http-summary.md"));
        assert_eq!(written.json, dir.join("http-summary.json"));

        let markdown = fs::read_to_string(&written.markdown).unwrap();
        assert!(markdown.starts_with("# Network Preflight: HTTP(S)"));
        assert!(markdown.contains("| https://down | 503 | 20 | ❌ |"));

        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&written.json).unwrap()).unwrap();
        assert_eq!(json["failed_targets"], serde_json::json!(["https://down"]));

        fs::remove_dir_all(dir).unwrap();
    }
}
