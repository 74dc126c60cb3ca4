//! Fault-tolerance policy for per-item processing failures.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What a driver does when `process` fails on an item.
///
/// Every policy records the failure in the processing exception record.
/// Failures of `init`, `pre_process`, `post_process` and `release` are always
/// fatal, whatever the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaultTolerance {
    /// Zero tolerance: the first failure is escalated to a fatal error. The run
    /// loop aborts and goes straight to `release`, skipping `post_process`.
    Strict,
    /// The item is dropped and the loop continues. Logged as a warning.
    Continue,
    /// The item is dropped and the loop continues. Logged as an error so the
    /// record gets inspected later.
    #[default]
    Checked,
}

impl FaultTolerance {
    /// Whether a processing failure becomes fatal under this policy.
    pub fn escalates(self) -> bool {
        matches!(self, Self::Strict)
    }
}

impl fmt::Display for FaultTolerance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Strict => "strict",
            Self::Continue => "continue",
            Self::Checked => "checked",
        };
        f.write_str(label)
    }
}

impl FromStr for FaultTolerance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strict" | "no" | "none" => Ok(Self::Strict),
            "continue" | "all" => Ok(Self::Continue),
            "checked" => Ok(Self::Checked),
            other => Err(format!(
                "unknown fault tolerance '{}': expected strict, continue or checked",
                other
            )),
        }
    }
}
