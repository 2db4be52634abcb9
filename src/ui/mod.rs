// src/ui/mod.rs

//! Colored console summary printed after a run.

use crossterm::style::Stylize;

use crate::core::report::{ProbeRecord, Report};

pub fn print_report<R: ProbeRecord>(report: &Report<R>) {
    println!("{}", render_summary(report));
}

/// One line per target followed by the verdict.
pub fn render_summary<R: ProbeRecord>(report: &Report<R>) -> String {
    let mut lines = vec![report.title().bold().to_string()];

    for result in &report.results {
        let cells = result.cells();
        // Last column is the OK mark; the console shows its own.
        let detail = cells
            .iter()
            .skip(1)
            .take(cells.len().saturating_sub(2))
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("  ");
        let line = if result.passed() {
            format!("  {} {}  {}", "PASS".green().bold(), result.target(), detail.dark_grey())
        } else {
            let reason = result
                .error()
                .map(ToString::to_string)
                .unwrap_or_else(|| "failed".to_string());
            format!("  {} {}  {}", "FAIL".red().bold(), result.target(), reason.red())
        };
        lines.push(line);
    }

    let verdict = report.verdict_message();
    lines.push(if report.overall_passed {
        verdict.green().to_string()
    } else {
        verdict.red().bold().to_string()
    });
    lines.join("\n")
}
