// src/core/mod.rs

// The `core` module holds everything that does not touch the terminal or the
// pipeline host: target parsing, bounded attempts, the probes themselves and
// the report they produce.

/// Bounded execution of a single attempt and the linear retry loop.
pub mod attempt;

/// The error taxonomy recorded per target.
pub mod error;

/// Pass/fail criteria: status ranges, latency ceilings, non-empty answers.
pub mod expectation;

/// Data structures shared by the probes, such as `Endpoint`, `RecordKind`
/// and the per-kind target results.
pub mod models;

/// The DNS, HTTP(S) and TCP/TLS probe runners.
pub mod probe;

/// Aggregation of target results into a Markdown/JSON report.
pub mod report;

/// Normalization of raw target strings.
pub mod target;
