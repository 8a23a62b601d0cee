//! Row structs and DTOs.
//!
//! Each submodule contains a `FromRow` + `Serialize` entity struct matching
//! the database row and, where rows are created from outside the crate, a
//! create DTO.

pub mod assignment;
pub mod event;
pub mod number_pool;
pub mod operator_alert;
pub mod payment_intent;
pub mod prize;
pub mod provider_transaction;
pub mod raffle;
pub mod status;
