//! whirlpool-engine library crate.
//!
//! Discovers catalog content from user-added sources and resolves items to
//! directly playable streams. [`Engine`] is the entry point; the modules
//! below are exposed for embedding and integration testing.

pub mod bridge;
pub mod cache;
pub mod config;
pub mod database;
pub mod discovery;
pub mod domain;
pub mod engine;
pub mod error;
pub mod filters;
pub mod logging;
pub mod resolver;
pub mod settings;
pub mod sources;
pub mod updater;
pub mod utils;

pub use config::EngineConfig;
pub use engine::{Engine, EngineBuilder, EngineHealth, PlaybackRequest};
pub use error::{Error, ErrorKind, Result};
