//! Cache-to-outside plumbing
//!
//! The cache talks to the rest of the viewer in two directions: it asks for
//! renders through a [`RenderRequester`], and it reports finished renders as
//! [`CacheEvent`]s on a channel the UI side drains.

/// Opaque handle identifying whoever asked for a page (typically one page
/// view). Returned unchanged in [`CacheEvent::PageUpdated`] so the caller
/// knows what to repaint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequesterId(pub u64);

/// Sink for render jobs triggered by cache reads
///
/// Called without the cache lock held. Implementations must not block on
/// rendering.
pub trait RenderRequester: Send + Sync {
    /// Queue an exact render of a full page at `scale`
    fn request_page(&self, page_index: usize, scale: f64);

    /// Queue a thumbnail render at `scale`
    fn request_thumbnail(&self, page_index: usize, scale: f64);
}

/// Notification sent after the cache has committed a new bitmap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEvent {
    /// A full-page render landed; `requester` asked for it and should repaint
    PageUpdated {
        page_index: usize,
        requester: RequesterId,
    },

    /// A thumbnail render landed
    ThumbnailLoaded { page_index: usize },
}

impl CacheEvent {
    /// Page the event refers to
    pub fn page_index(&self) -> usize {
        match *self {
            CacheEvent::PageUpdated { page_index, .. } => page_index,
            CacheEvent::ThumbnailLoaded { page_index } => page_index,
        }
    }
}
