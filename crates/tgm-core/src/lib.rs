//! Core domain + application logic for the Telegram group manager.
//!
//! This crate is framework-agnostic. The MTProto client, the HTTP surface and
//! the CLI live in adapter crates and talk to the services here through ports
//! (traits).

pub mod config;
pub mod domain;
pub mod download;
pub mod errors;
pub mod export;
pub mod groups;
pub mod logging;
pub mod manager;
pub mod media;
pub mod metrics;
pub mod ports;
pub mod retry;
pub mod selection;
pub mod storage;
pub mod throttle;
pub mod transfer;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use errors::{Error, Result};
pub use manager::{GroupManager, ManagerOptions};
