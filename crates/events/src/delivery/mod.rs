//! External delivery channels.

pub mod alerts;
pub mod webhook;
