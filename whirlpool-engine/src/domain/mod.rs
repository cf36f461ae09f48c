//! Domain types shared by the engine's components.

pub mod history;
pub mod playback;
pub mod source;
pub mod status;
pub mod update;
pub mod video;

pub use history::*;
pub use playback::*;
pub use source::*;
pub use status::*;
pub use update::*;
pub use video::*;
