//! Core domain + application logic for the album-to-PDF chat bot.
//!
//! This crate is intentionally framework-agnostic. The chat platform and the
//! album downloader live behind ports (traits) implemented in adapter crates.

pub mod album;
pub mod audit;
pub mod cleanup;
pub mod config;
pub mod convert;
pub mod delivery;
pub mod domain;
pub mod errors;
pub mod job;
pub mod locator;
pub mod logging;
pub mod messaging;
pub mod ports;
pub mod security;

pub use errors::{Error, Result};
