//! Operator alert kinds and severities.
//!
//! Alerts are raised whenever captured funds cannot be turned into an
//! assignment, and for non-blocking problems such as prize tagging failures.

use serde::{Deserialize, Serialize};

/// How urgently an operator must act.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    /// Money captured without tickets. Always requires a human.
    Critical,
}

impl AlertSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

/// Alert kind: the intent's funds were captured but allocation was refused.
pub const ALERT_UNALLOCATED: &str = "completed_unallocated";

/// Alert kind: the provider captured less than the intent amount.
pub const ALERT_UNDERPAID: &str = "underpaid";

/// Alert kind: the prize rules for a raffle could not be evaluated.
pub const ALERT_PRIZE_TAGGING_FAILED: &str = "prize_tagging_failed";

/// Alert kind: a completed intent stayed without an assignment after repeated
/// contention retries.
pub const ALERT_ALLOCATION_STALLED: &str = "allocation_stalled";

/// Severity for a given alert kind.
pub fn severity_for(kind: &str) -> AlertSeverity {
    match kind {
        ALERT_UNALLOCATED | ALERT_UNDERPAID | ALERT_ALLOCATION_STALLED => AlertSeverity::Critical,
        _ => AlertSeverity::Warning,
    }
}
