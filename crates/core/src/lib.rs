//! Domain rules for ticket allocation and payment reconciliation.
//!
//! Everything here is pure: no database, no network. The `db`, `engine`
//! and `api` crates build on these types and functions.

pub mod alert;
pub mod backoff;
pub mod checkout_view;
pub mod error;
pub mod money;
pub mod pool;
pub mod prize;
pub mod provider;
pub mod quota;
pub mod roles;
pub mod signature;
pub mod status;
pub mod types;
