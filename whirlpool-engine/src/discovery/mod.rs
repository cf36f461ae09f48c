//! Discovery protocol: source status and paginated listings.

pub mod client;
mod wire;

pub use client::{CatalogClient, DiscoveryClient, VideoQuery};
