//! Gallery Sync - cloud mirror for a local photo gallery
//!
//! Keeps a locally persisted photo library and mirrors it into a single
//! JSON record on a GitHub-style issue tracker.

pub mod error;
pub mod storage;
pub mod sync;
pub mod types;

pub use error::{ErrorKind, GalleryError, Result};
pub use storage::{FileStore, KeyValueStore, MemoryStore, PhotoLibrary};
pub use sync::CloudSyncManager;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
