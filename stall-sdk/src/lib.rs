//! Shared types for the Stall checkout engine.
//!
//! - [`objects`]: request/response bodies and broadcast frames used by the
//!   HTTP surface and its clients.
//! - [`signature`]: the buyer-session assertion signed by the upstream
//!   session layer.
//! - [`credential`]: the at-rest format for payment provider secrets.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(unsafe_code)]

pub mod credential;
pub mod objects;
pub mod signature;
