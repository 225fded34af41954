//! PDF Viewer Cache Library
//!
//! Per-document page image cache: scale-aware lookups, an approximate
//! rescale path, a pixel budget with round-robin eviction, and thumbnails.

pub mod config;
pub mod entry;
pub mod events;
pub mod image_cache;

pub use config::{CacheConfig, ConfigError, ConfigResult};
pub use entry::{EntryInfo, PageState};
pub use events::{CacheEvent, RenderRequester, RequesterId};
pub use image_cache::{CacheStats, ImageCache};
