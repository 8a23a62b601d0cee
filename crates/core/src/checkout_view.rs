//! What the buyer's result page shows for a payment intent.

use serde::Serialize;

use crate::status::IntentStatus;

/// Result-page state derived from the intent status and whether an
/// assignment exists yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutView {
    /// Waiting for the provider, or paid and waiting for allocation.
    Processing,
    /// Paid and numbers assigned.
    Confirmed,
    Failed,
    Expired,
    /// Paid but numbers could not be assigned; support has been alerted.
    Unallocated,
}

impl CheckoutView {
    pub fn derive(status: IntentStatus, has_assignment: bool) -> Self {
        match status {
            IntentStatus::Pending => Self::Processing,
            IntentStatus::Completed if has_assignment => Self::Confirmed,
            IntentStatus::Completed => Self::Processing,
            IntentStatus::Failed => Self::Failed,
            IntentStatus::Expired => Self::Expired,
            IntentStatus::CompletedUnallocated => Self::Unallocated,
        }
    }

    /// Whether the page can stop polling / close its subscription.
    pub fn is_final(self) -> bool {
        !matches!(self, Self::Processing)
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::Processing => "Your payment is being processed.",
            Self::Confirmed => "Your numbers have been assigned.",
            Self::Failed => "The payment was not completed. No charge was made.",
            Self::Expired => {
                "The payment window expired. If you were charged, please contact support."
            }
            Self::Unallocated => {
                "Your payment was received but your numbers could not be assigned. \
                 Our team has been notified and will contact you."
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_is_processing() {
        assert_eq!(
            CheckoutView::derive(IntentStatus::Pending, false),
            CheckoutView::Processing
        );
    }

    #[test]
    fn completed_without_assignment_is_still_processing() {
        let view = CheckoutView::derive(IntentStatus::Completed, false);
        assert_eq!(view, CheckoutView::Processing);
        assert!(!view.is_final());
    }

    #[test]
    fn completed_with_assignment_is_confirmed() {
        let view = CheckoutView::derive(IntentStatus::Completed, true);
        assert_eq!(view, CheckoutView::Confirmed);
        assert!(view.is_final());
    }

    #[test]
    fn failure_states_are_final_and_distinct() {
        assert_eq!(
            CheckoutView::derive(IntentStatus::Failed, false),
            CheckoutView::Failed
        );
        assert_eq!(
            CheckoutView::derive(IntentStatus::Expired, false),
            CheckoutView::Expired
        );
        let unallocated = CheckoutView::derive(IntentStatus::CompletedUnallocated, false);
        assert_eq!(unallocated, CheckoutView::Unallocated);
        assert!(unallocated.message().contains("contact you"));
    }

    #[test]
    fn serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(CheckoutView::Unallocated).unwrap(),
            serde_json::json!("unallocated")
        );
    }
}
