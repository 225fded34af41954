//! Rasterizer abstraction
//!
//! The page cache never talks to a document backend directly. Everything it
//! needs from one is expressed by [`Rasterizer`], which the render worker owns
//! and calls from its own thread.

use crate::bitmap::PageSize;
use image::DynamicImage;
use thiserror::Error;

/// Errors that can occur while opening or rasterizing a document
#[derive(Debug, Error)]
pub enum RenderError {
    /// The rendering backend could not be initialized
    #[error("rasterizer initialization error: {0}")]
    Initialization(String),

    /// The document could not be loaded
    #[error("document load error: {0}")]
    Load(String),

    /// Page index outside the document
    #[error("invalid page index {page_index} (document has {page_count} pages)")]
    InvalidPageIndex { page_index: usize, page_count: usize },

    /// A single page failed to render
    #[error("failed to rasterize page {page_index}: {message}")]
    Rasterize { page_index: usize, message: String },
}

/// Result type for rasterizer operations
pub type RenderResult<T> = Result<T, RenderError>;

/// Produces page bitmaps for one open document.
///
/// `scale` is DPI-equivalent: a page renders `points * scale / 72` pixels
/// in each dimension. Calls are synchronous and may take tens to hundreds
/// of milliseconds, so they only ever happen on the render worker thread.
pub trait Rasterizer: Send {
    /// Number of pages in the document
    fn page_count(&self) -> usize;

    /// Native size of a page in points
    fn page_size(&self, page_index: usize) -> RenderResult<PageSize>;

    /// Render a full page at `scale`
    fn render_page(&self, page_index: usize, scale: f64) -> RenderResult<DynamicImage>;

    /// Render a small preview of a page at `scale`
    fn render_thumbnail(&self, page_index: usize, scale: f64) -> RenderResult<DynamicImage> {
        self.render_page(page_index, scale)
    }
}

impl<R: Rasterizer + ?Sized> Rasterizer for Box<R> {
    fn page_count(&self) -> usize {
        (**self).page_count()
    }

    fn page_size(&self, page_index: usize) -> RenderResult<PageSize> {
        (**self).page_size(page_index)
    }

    fn render_page(&self, page_index: usize, scale: f64) -> RenderResult<DynamicImage> {
        (**self).render_page(page_index, scale)
    }

    fn render_thumbnail(&self, page_index: usize, scale: f64) -> RenderResult<DynamicImage> {
        (**self).render_thumbnail(page_index, scale)
    }
}

/// Check that `page_index` addresses a page of a `page_count`-page document
pub fn check_page_index(page_index: usize, page_count: usize) -> RenderResult<()> {
    if page_index < page_count {
        Ok(())
    } else {
        Err(RenderError::InvalidPageIndex {
            page_index,
            page_count,
        })
    }
}
