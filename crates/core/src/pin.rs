//! Pin lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where a pin is in its lifecycle.
///
/// `Queued` and `Pinning` are both persisted as `pinning = true`; the
/// difference only exists in memory while a worker holds the operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinStatus {
    Queued,
    Pinning,
    Pinned,
    Failed,
}

impl PinStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PinStatus::Queued => "queued",
            PinStatus::Pinning => "pinning",
            PinStatus::Pinned => "pinned",
            PinStatus::Failed => "failed",
        }
    }

    /// No transition leaves a terminal state except deletion.
    pub fn is_terminal(self) -> bool {
        matches!(self, PinStatus::Pinned | PinStatus::Failed)
    }
}

impl fmt::Display for PinStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PinStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "queued" => Ok(PinStatus::Queued),
            "pinning" => Ok(PinStatus::Pinning),
            "pinned" => Ok(PinStatus::Pinned),
            "failed" => Ok(PinStatus::Failed),
            other => Err(crate::Error::Serialization(format!(
                "unknown pin status: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_strings() {
        for status in [
            PinStatus::Queued,
            PinStatus::Pinning,
            PinStatus::Pinned,
            PinStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<PinStatus>().unwrap(), status);
            assert_eq!(
                serde_json::to_string(&status).unwrap(),
                format!("\"{status}\"")
            );
        }
        assert!("active".parse::<PinStatus>().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(PinStatus::Pinned.is_terminal());
        assert!(PinStatus::Failed.is_terminal());
        assert!(!PinStatus::Queued.is_terminal());
        assert!(!PinStatus::Pinning.is_terminal());
    }
}
