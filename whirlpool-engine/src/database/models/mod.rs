//! Database row models.

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
