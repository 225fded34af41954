//! PDF Viewer Core Library
//!
//! Document sessions: one rasterizer, one background render worker and one
//! page image cache per open document.

pub mod config;
pub mod session;

pub use config::SessionConfig;
pub use session::{DocumentSession, PageChanged, SessionError, SessionResult};

pub use pdf_viewer_cache::{CacheConfig, CacheEvent, CacheStats, PageState, RequesterId};
pub use pdf_viewer_render::{PageBitmap, PageSize, Rasterizer};
pub use pdf_viewer_scheduler::WorkerConfig;
