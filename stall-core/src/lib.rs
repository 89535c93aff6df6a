#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod analytics;
pub mod config;
pub mod entities;
pub mod error;
pub mod events;
pub mod framework;
pub mod inventory;
pub mod lifecycle;
pub mod memory;
pub mod notifications;
pub mod payment;
pub mod processors;

#[cfg(test)]
mod testing;
