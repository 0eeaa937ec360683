pub mod document;
pub mod enums;
pub mod version;

pub use document::{Document, LockState};
pub use version::Version;
