//! Status enums mapping to SMALLSERIAL lookup tables, plus the lifecycle
//! state machines for payment intents and raffles.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding `*_statuses` database table.

use serde::{Deserialize, Serialize};

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:literal => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Resolve a database status ID back into the enum.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( $val => Some(Self::$variant), )+
                    _ => None,
                }
            }

            /// Seed-table name of this status.
            pub fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => $label, )+
                }
            }

            /// Parse a seed-table name.
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $( $label => Some(Self::$variant), )+
                    _ => None,
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

define_status_enum! {
    /// Payment intent lifecycle status.
    IntentStatus {
        Pending = 1 => "pending",
        Completed = 2 => "completed",
        Failed = 3 => "failed",
        Expired = 4 => "expired",
        /// Funds were captured but allocation was refused (quota or pool
        /// exhaustion). Requires an operator.
        CompletedUnallocated = 5 => "completed_unallocated",
    }
}

define_status_enum! {
    /// Raffle lifecycle status.
    RaffleStatus {
        Draft = 1 => "draft",
        Active = 2 => "active",
        Paused = 3 => "paused",
        Completed = 4 => "completed",
        Cancelled = 5 => "cancelled",
    }
}

/// Rejected lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// The intent already reached a terminal status.
    #[error("Payment intent is already resolved as '{current}'")]
    AlreadyResolved { current: IntentStatus },

    /// The transition is not part of the state machine.
    #[error("Invalid transition from '{from}' to '{to}'")]
    Invalid { from: String, to: String },
}

impl IntentStatus {
    /// Every status except `pending` is terminal.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Statuses reachable from `self`.
    ///
    /// `completed -> completed_unallocated` is the only move out of a
    /// terminal status and is reserved for the intent tracker.
    /// `pending -> completed_unallocated` parks a capture that cannot be
    /// honoured at all, such as an underpayment.
    pub fn valid_transitions(self) -> &'static [IntentStatus] {
        match self {
            Self::Pending => &[
                Self::Completed,
                Self::Failed,
                Self::Expired,
                Self::CompletedUnallocated,
            ],
            Self::Completed => &[Self::CompletedUnallocated],
            Self::Failed | Self::Expired | Self::CompletedUnallocated => &[],
        }
    }

    pub fn can_transition(self, to: IntentStatus) -> bool {
        self.valid_transitions().contains(&to)
    }

    /// Validate a transition. Moves out of a terminal status report
    /// [`TransitionError::AlreadyResolved`] so callers can treat them as
    /// idempotent no-ops.
    pub fn validate_transition(self, to: IntentStatus) -> Result<(), TransitionError> {
        if self.can_transition(to) {
            return Ok(());
        }
        if self.is_terminal() {
            return Err(TransitionError::AlreadyResolved { current: self });
        }
        Err(TransitionError::Invalid {
            from: self.name().to_string(),
            to: to.name().to_string(),
        })
    }
}

impl RaffleStatus {
    /// `completed` and `cancelled` are sinks.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Statuses reachable from `self`. Transitions only move forward,
    /// except for the `active <-> paused` pair.
    pub fn valid_transitions(self) -> &'static [RaffleStatus] {
        match self {
            Self::Draft => &[Self::Active, Self::Cancelled],
            Self::Active => &[Self::Paused, Self::Completed, Self::Cancelled],
            Self::Paused => &[Self::Active, Self::Completed, Self::Cancelled],
            Self::Completed | Self::Cancelled => &[],
        }
    }

    pub fn can_transition(self, to: RaffleStatus) -> bool {
        self.valid_transitions().contains(&to)
    }

    pub fn validate_transition(self, to: RaffleStatus) -> Result<(), TransitionError> {
        if self.can_transition(to) {
            Ok(())
        } else {
            Err(TransitionError::Invalid {
                from: self.name().to_string(),
                to: to.name().to_string(),
            })
        }
    }

    /// Whether checkout may create new intents for a raffle in this status.
    pub fn accepts_purchases(self) -> bool {
        matches!(self, Self::Active)
    }
}
