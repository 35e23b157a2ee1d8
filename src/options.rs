//! Agent options.
//!
//! The compact form is the string handed to the agent at startup:
//! `key:value` pairs separated by `#`, e.g. `p:com\.acme\..*#t:parse#d:1`.
//!
//! | key | meaning                                   |
//! |-----|-------------------------------------------|
//! | `p` | package pattern selecting instrumented types and methods |
//! | `t` | pattern selecting routines that print a live trace |
//! | `d` | debug level (0 silent, 1 instrumentation, 2+ every call) |
//! | `i` | statistics flush interval in seconds (0 = final report only) |
//! | `n` | rows per report table |

use std::str::FromStr;
use std::time::Duration;

use calltrace_runtime::{TracerConfig, DEFAULT_REPORT_LIMIT};

use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentOptions {
    pub package_pattern: Option<String>,
    pub trace_pattern: Option<String>,
    pub debug_level: u8,
    pub flush_interval_secs: u64,
    pub report_limit: usize,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            package_pattern: None,
            trace_pattern: None,
            debug_level: 0,
            flush_interval_secs: 0,
            report_limit: DEFAULT_REPORT_LIMIT,
        }
    }
}

impl AgentOptions {
    /// Settings the tracing core consumes.
    pub fn tracer_config(&self) -> TracerConfig {
        TracerConfig {
            debug_level: self.debug_level,
            flush_interval: (self.flush_interval_secs > 0)
                .then(|| Duration::from_secs(self.flush_interval_secs)),
            report_limit: self.report_limit,
        }
    }
}

impl FromStr for AgentOptions {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut options = AgentOptions::default();
        for arg in s.split('#').filter(|a| !a.trim().is_empty()) {
            let (key, value) = arg
                .split_once(':')
                .filter(|(_, v)| !v.is_empty())
                .ok_or_else(|| Error::InvalidOption(arg.to_owned()))?;
            match key.trim() {
                "p" => options.package_pattern = Some(value.to_owned()),
                "t" => options.trace_pattern = Some(value.to_owned()),
                "d" => options.debug_level = parse_number("d", value)?,
                "i" => options.flush_interval_secs = parse_number("i", value)?,
                "n" => options.report_limit = parse_number("n", value)?,
                other => return Err(Error::UnknownOption(other.to_owned())),
            }
        }
        Ok(options)
    }
}

fn parse_number<T>(key: &'static str, value: &str) -> Result<T, Error>
where
    T: FromStr<Err = std::num::ParseIntError>,
{
    value
        .trim()
        .parse()
        .map_err(|source| Error::InvalidNumber {
            key,
            value: value.to_owned(),
            source,
        })
}
