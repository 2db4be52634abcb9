// src/core/probe/mod.rs

// One runner per probe kind. Each processes its targets strictly in input
// order, one network operation in flight at a time, and always finishes the
// whole batch before the report is built.
pub mod dns_probe;
pub mod http_probe;
pub mod tcp_probe;

use std::time::Duration;

use crate::core::attempt::RetryPolicy;

pub use self::dns_probe::{HickoryLookup, run_dns_probe};
pub use self::http_probe::{ReqwestSender, run_http_probe};
pub use self::tcp_probe::{ConnectionProber, run_tcp_probe};

/// Per-run knobs shared by every target of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSettings {
    /// Deadline of a single attempt.
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl ProbeSettings {
    pub fn new(timeout: Duration, retries: u32) -> Self {
        Self {
            timeout,
            retry: RetryPolicy::new(retries),
        }
    }
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), 0)
    }
}
