//! Coordinator configuration and `flock.toml` parsing.
//!
//! ```toml
//! [membership]
//! max_coalesce_time = "10s"
//! min_quiescent_time = "2s"
//! leave_timeout = "5s"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{MembershipError, MembershipResult};

/// Timing knobs for the coalescer and the leave-intent protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MembershipConfig {
    /// Hard cap on the length of one coalescing window.
    pub max_coalesce_time: Duration,
    /// Idle period after the last event that closes a window early.
    pub min_quiescent_time: Duration,
    /// Grace period before an unconfirmed leave intent is reverted.
    pub leave_timeout: Duration,
}

/// On-disk layout of `flock.toml`.
#[derive(Debug, Deserialize)]
struct FileConfig {
    membership: FileMembership,
}

#[derive(Debug, Deserialize)]
struct FileMembership {
    max_coalesce_time: String,
    min_quiescent_time: String,
    leave_timeout: String,
}

impl MembershipConfig {
    /// Every timing is required; there are no built-in defaults.
    pub fn new(
        max_coalesce_time: Duration,
        min_quiescent_time: Duration,
        leave_timeout: Duration,
    ) -> Self {
        Self {
            max_coalesce_time,
            min_quiescent_time,
            leave_timeout,
        }
    }

    pub fn with_max_coalesce_time(mut self, d: Duration) -> Self {
        self.max_coalesce_time = d;
        self
    }

    pub fn with_min_quiescent_time(mut self, d: Duration) -> Self {
        self.min_quiescent_time = d;
        self
    }

    pub fn with_leave_timeout(mut self, d: Duration) -> Self {
        self.leave_timeout = d;
        self
    }

    /// Reject zero durations; every knob is required.
    pub fn validate(&self) -> MembershipResult<()> {
        if self.max_coalesce_time.is_zero() {
            return Err(MembershipError::ZeroDuration("max_coalesce_time"));
        }
        if self.min_quiescent_time.is_zero() {
            return Err(MembershipError::ZeroDuration("min_quiescent_time"));
        }
        if self.leave_timeout.is_zero() {
            return Err(MembershipError::ZeroDuration("leave_timeout"));
        }
        Ok(())
    }

    /// Parse and validate a config from TOML text.
    pub fn from_toml_str(content: &str) -> MembershipResult<Self> {
        let file: FileConfig = toml::from_str(content)?;
        let m = file.membership;
        let config = Self {
            max_coalesce_time: parse_duration("max_coalesce_time", &m.max_coalesce_time)?,
            min_quiescent_time: parse_duration("min_quiescent_time", &m.min_quiescent_time)?,
            leave_timeout: parse_duration("leave_timeout", &m.leave_timeout)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load a config from a TOML file.
    pub fn from_file(path: &Path) -> MembershipResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

/// Parse a duration string such as `"250ms"`, `"2s"` or `"1m"`.
pub fn parse_duration(field: &'static str, s: &str) -> MembershipResult<Duration> {
    let invalid = || MembershipError::InvalidDuration {
        field,
        value: s.to_string(),
    };

    let s = s.trim();
    let (digits, unit): (&str, fn(u64) -> Duration) = if let Some(v) = s.strip_suffix("ms") {
        (v, Duration::from_millis)
    } else if let Some(v) = s.strip_suffix('s') {
        (v, Duration::from_secs)
    } else if let Some(v) = s.strip_suffix('m') {
        (v, from_mins)
    } else {
        return Err(invalid());
    };

    digits.trim().parse::<u64>().map(unit).map_err(|_| invalid())
}

fn from_mins(m: u64) -> Duration {
    Duration::from_secs(m.saturating_mul(60))
}
