// src/core/expectation.rs

//! Per-kind pass/fail predicates.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::core::error::ProbeError;
use crate::core::models::HttpResponseInfo;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpectationError {
    #[error("status expression is empty")]
    Empty,
    #[error("invalid status term '{0}'")]
    InvalidTerm(String),
    #[error("inverted status range '{0}'")]
    InvertedRange(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusTerm {
    Exact(u16),
    Range(u16, u16),
}

impl StatusTerm {
    fn matches(self, status: u16) -> bool {
        match self {
            StatusTerm::Exact(code) => status == code,
            StatusTerm::Range(low, high) => (low..=high).contains(&status),
        }
    }
}

impl fmt::Display for StatusTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusTerm::Exact(code) => write!(f, "{code}"),
            StatusTerm::Range(low, high) => write!(f, "{low}-{high}"),
        }
    }
}

/// A parsed expected-status expression such as `200,204,301-302`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusExpectation {
    terms: Vec<StatusTerm>,
}

impl StatusExpectation {
    /// True when `status` matches at least one term.
    pub fn matches(&self, status: u16) -> bool {
        self.terms.iter().any(|term| term.matches(status))
    }
}

impl Default for StatusExpectation {
    fn default() -> Self {
        Self {
            terms: vec![StatusTerm::Range(200, 399)],
        }
    }
}

impl FromStr for StatusExpectation {
    type Err = ExpectationError;

    fn from_str(expr: &str) -> Result<Self, Self::Err> {
        let terms = expr
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(parse_term)
            .collect::<Result<Vec<_>, _>>()?;
        if terms.is_empty() {
            return Err(ExpectationError::Empty);
        }
        Ok(Self { terms })
    }
}

fn parse_term(part: &str) -> Result<StatusTerm, ExpectationError> {
    let number = |s: &str| {
        s.trim()
            .parse::<u16>()
            .map_err(|_| ExpectationError::InvalidTerm(part.to_string()))
    };
    match part.split_once('-') {
        Some((low, high)) => {
            let (low, high) = (number(low)?, number(high)?);
            if low > high {
                return Err(ExpectationError::InvertedRange(part.to_string()));
            }
            Ok(StatusTerm::Range(low, high))
        }
        None => Ok(StatusTerm::Exact(number(part)?)),
    }
}

impl fmt::Display for StatusExpectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.terms.iter().map(ToString::to_string).collect();
        f.write_str(&rendered.join(","))
    }
}

/// Everything an HTTP response must satisfy to pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HttpExpectation {
    pub status: StatusExpectation,
    /// Ceiling in whole milliseconds; `None` means no ceiling.
    pub max_latency_ms: Option<u64>,
}

impl HttpExpectation {
    pub fn new(status: StatusExpectation, max_latency_ms: u64) -> Self {
        Self {
            status,
            max_latency_ms: (max_latency_ms > 0).then_some(max_latency_ms),
        }
    }

    pub fn is_met(&self, response: &HttpResponseInfo, latency: Duration) -> bool {
        self.check(response, latency).is_ok()
    }

    /// Explains the first unmet criterion, if any.
    pub fn check(&self, response: &HttpResponseInfo, latency: Duration) -> Result<(), ProbeError> {
        if !self.status.matches(response.status) {
            return Err(ProbeError::expectation(format!(
                "status {} not in {}",
                response.status, self.status
            )));
        }
        // Compared at the millisecond resolution the report shows.
        let latency_ms = latency.as_millis() as u64;
        match self.max_latency_ms {
            Some(ceiling) if latency_ms > ceiling => Err(ProbeError::expectation(format!(
                "latency {latency_ms} ms exceeds {ceiling} ms"
            ))),
            _ => Ok(()),
        }
    }
}

/// DNS passes when at least one record of the requested type came back.
pub fn check_answers(answers: &[String]) -> Result<(), ProbeError> {
    if answers.is_empty() {
        Err(ProbeError::expectation("no records returned"))
    } else {
        Ok(())
    }
}
