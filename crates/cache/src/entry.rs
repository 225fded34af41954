//! Per-page cache entries

use crate::events::RequesterId;
use pdf_viewer_render::PageBitmap;

/// Observable render state of one page
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PageState {
    /// No image and nothing queued
    Empty,

    /// A render job is queued or running
    Rendering,

    /// Holds an exact render at `scale`
    Exact { scale: f64 },

    /// Holds a rescaled stand-in for `scale`
    Approximated { scale: f64 },
}

/// Snapshot of one entry's bookkeeping, for inspection and tests
#[derive(Debug, Clone, PartialEq)]
pub struct EntryInfo {
    pub has_image: bool,
    pub image_dimensions: Option<(u32, u32)>,
    pub scale: Option<f64>,
    pub approximated: bool,
    pub rendering: bool,
    pub recency: u64,
    pub requester: Option<RequesterId>,
    pub has_thumbnail: bool,
    pub thumbnail_rendering: bool,
}

/// Cache slot for one page
#[derive(Debug, Default)]
pub(crate) struct CacheEntry {
    /// Current full-page bitmap
    pub image: Option<PageBitmap>,

    /// Scale `image` corresponds to
    pub scale: Option<f64>,

    /// True if `image` was produced by rescaling an exact render
    pub approximated: bool,

    /// A page job is queued or running
    pub rendering: bool,

    /// Stamp from the cache-wide recency counter; 0 means never touched
    pub recency: u64,

    /// Who to notify when the pending page render lands
    pub requester: Option<RequesterId>,

    /// Has ever received a non-empty image
    pub populated: bool,

    pub thumbnail: Option<PageBitmap>,
    pub thumbnail_rendering: bool,
}

impl CacheEntry {
    /// Pixels this entry counts against the budget
    pub fn image_size(&self) -> u64 {
        self.image.as_ref().map_or(0, PageBitmap::pixel_count)
    }

    /// Replace the image with an exact render
    pub fn store_exact(&mut self, image: PageBitmap, scale: f64) {
        self.image = Some(image);
        self.scale = Some(scale);
        self.approximated = false;
        self.rendering = false;
    }

    /// Replace the image with a rescaled stand-in
    pub fn store_approximation(&mut self, image: PageBitmap, scale: f64) {
        self.image = Some(image);
        self.scale = Some(scale);
        self.approximated = true;
    }

    /// Drop the image; returns the pixels released
    pub fn clear_image(&mut self) -> u64 {
        let released = self.image_size();
        self.image = None;
        self.scale = None;
        self.approximated = false;
        released
    }

    pub fn state(&self) -> PageState {
        if self.rendering {
            return PageState::Rendering;
        }

        match (self.image.is_some(), self.scale) {
            (true, Some(scale)) if self.approximated => PageState::Approximated { scale },
            (true, Some(scale)) => PageState::Exact { scale },
            _ => PageState::Empty,
        }
    }

    pub fn info(&self) -> EntryInfo {
        EntryInfo {
            has_image: self.image.is_some(),
            image_dimensions: self.image.as_ref().map(PageBitmap::dimensions),
            scale: self.scale,
            approximated: self.approximated,
            rendering: self.rendering,
            recency: self.recency,
            requester: self.requester,
            has_thumbnail: self.thumbnail.is_some(),
            thumbnail_rendering: self.thumbnail_rendering,
        }
    }
}
