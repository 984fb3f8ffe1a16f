//! Session health snapshot

use serde::{Deserialize, Serialize};

use crate::tracking::ChangeSummary;

/// Point-in-time view of a unit of work and its engine
///
/// Serializes to JSON so hosts can expose it from their own health
/// endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct SessionHealth {
    /// Session name from configuration
    pub session: String,

    /// Engine name
    pub engine: String,

    /// Engine answered the connectivity probe in time
    pub reachable: bool,

    /// Probe round-trip in milliseconds, when it answered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,

    /// Entities currently tracked, in any state
    pub tracked_entries: usize,

    /// Staged changes awaiting commit
    pub pending: ChangeSummary,

    /// An explicit transaction is open
    pub in_transaction: bool,
}

impl SessionHealth {
    /// Overall status label
    pub fn status(&self) -> HealthStatus {
        if self.reachable {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unreachable
        }
    }
}

/// Coarse health label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unreachable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_without_missing_latency() {
        let health = SessionHealth {
            session: "billing".to_string(),
            engine: "memory".to_string(),
            reachable: false,
            latency_ms: None,
            tracked_entries: 2,
            pending: ChangeSummary {
                added: 1,
                ..ChangeSummary::default()
            },
            in_transaction: false,
        };

        let value = serde_json::to_value(&health).unwrap();
        assert!(value.get("latency_ms").is_none());
        assert_eq!(value["pending"]["added"], 1);
        assert_eq!(health.status(), HealthStatus::Unreachable);
    }
}
