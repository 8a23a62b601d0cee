//! Authentication and authorization middleware extractors.
//!
//! - [`auth::AuthUser`] -- Extracts the operator from a JWT Bearer token.
//! - [`rbac::RequireAdmin`] -- Requires the `admin` role.
//! - [`rbac::RequireOperator`] -- Requires `admin` or `support`.

pub mod auth;
pub mod rbac;
