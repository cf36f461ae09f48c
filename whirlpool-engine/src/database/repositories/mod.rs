//! Repository layer for database access.
//!
//! Each table group gets an `async_trait` repository with a sqlx-backed
//! implementation. Reads use the read pool, writes the serialized write pool.

pub mod cache;
pub mod download;
pub mod favorite;
pub mod history;
pub mod setting;
pub mod source;

pub use cache::*;
pub use download::*;
pub use favorite::*;
pub use history::*;
pub use setting::*;
pub use source::*;
