// ABOUTME: Rollback modes: the scope and strategy of compensating teardown.
// ABOUTME: Parsed from config, CLI flags, and stored rollback records.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RollbackMode {
    /// Every registered resource, deepest dependency first.
    #[default]
    Full,
    /// Only the components named in `FAILED_COMPONENTS`.
    Partial,
    /// Phase by phase, newest phase first.
    Incremental,
    /// Everything at once, no ordering, no settle waits, hard timeout.
    Emergency,
}

impl RollbackMode {
    pub const ALL: [RollbackMode; 4] = [
        RollbackMode::Full,
        RollbackMode::Partial,
        RollbackMode::Incremental,
        RollbackMode::Emergency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RollbackMode::Full => "full",
            RollbackMode::Partial => "partial",
            RollbackMode::Incremental => "incremental",
            RollbackMode::Emergency => "emergency",
        }
    }
}

impl fmt::Display for RollbackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RollbackMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RollbackMode::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!("unknown rollback mode '{s}' (expected full, partial, incremental, or emergency)")
            })
    }
}
