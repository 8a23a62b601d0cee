//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument. Status changes are written as
//! compare-and-swap updates so that concurrent writers in different
//! processes cannot both win.

pub mod assignment_repo;
pub mod event_repo;
pub mod number_pool_repo;
pub mod operator_alert_repo;
pub mod payment_intent_repo;
pub mod prize_tag_repo;
pub mod provider_transaction_repo;
pub mod raffle_repo;

pub use assignment_repo::AssignmentRepo;
pub use event_repo::EventRepo;
pub use number_pool_repo::NumberPoolRepo;
pub use operator_alert_repo::OperatorAlertRepo;
pub use payment_intent_repo::PaymentIntentRepo;
pub use prize_tag_repo::PrizeTagRepo;
pub use provider_transaction_repo::ProviderTransactionRepo;
pub use raffle_repo::RaffleRepo;
