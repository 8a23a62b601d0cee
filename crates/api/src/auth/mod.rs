//! Operator authentication.
//!
//! - [`jwt`] -- validation of HS256 access tokens issued by the tenant platform.

pub mod jwt;
