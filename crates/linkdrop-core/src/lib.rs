//! Core domain + application logic for the link relay bot.
//!
//! This crate is intentionally framework-agnostic. Telegram, the Instagram web API and
//! the TikTok extraction backend live behind ports (traits) implemented in adapter crates.

pub mod config;
pub mod delivery;
pub mod domain;
pub mod download;
pub mod errors;
pub mod fetch;
pub mod formatting;
pub mod links;
pub mod logging;
pub mod media;
pub mod messaging;
pub mod pipeline;
pub mod rate;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};
