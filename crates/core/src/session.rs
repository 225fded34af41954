//! Open-document session
//!
//! A [`DocumentSession`] ties together one rasterizer, one render worker and
//! one page cache. UI code asks it for page images and thumbnails, which
//! never block, and drains [`CacheEvent`]s to learn when to repaint.

use crate::config::SessionConfig;
use pdf_viewer_cache::{CacheEvent, CacheStats, ConfigError, ImageCache, RequesterId};
use pdf_viewer_render::{PageBitmap, PageSize, Rasterizer, RenderError};
use pdf_viewer_scheduler::{RenderQueues, RenderWorker, WorkerError};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Session errors
#[derive(Debug, Error)]
pub enum SessionError {
    /// The rasterizer could not open the document or read its pages
    #[error(transparent)]
    Render(#[from] RenderError),

    /// The document has no pages to show
    #[error("document has no pages")]
    EmptyDocument,

    /// The render worker could not be started or stopped
    #[error(transparent)]
    Worker(#[from] WorkerError),

    /// Configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Reported when the current page changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageChanged {
    /// Pages in the document
    pub total: usize,

    /// New current page, 1-based
    pub current: usize,
}

/// One open document with its cache and background renderer
pub struct DocumentSession {
    cache: Arc<ImageCache>,
    worker: Option<RenderWorker>,
    events: Receiver<CacheEvent>,
    page_sizes: Vec<PageSize>,
    current_page: Option<usize>,
}

impl DocumentSession {
    /// Start a session over an opened rasterizer
    ///
    /// Reads every page size up front, then starts the render worker, which
    /// takes ownership of the rasterizer.
    pub fn open<R>(rasterizer: R, config: SessionConfig) -> SessionResult<Self>
    where
        R: Rasterizer + 'static,
    {
        config.cache.validate()?;

        let page_count = rasterizer.page_count();
        if page_count == 0 {
            return Err(SessionError::EmptyDocument);
        }

        let page_sizes = (0..page_count)
            .map(|page| rasterizer.page_size(page))
            .collect::<Result<Vec<_>, _>>()?;

        let (queues, signals) = RenderQueues::new();
        let (events_tx, events) = mpsc::channel();
        let cache = Arc::new(ImageCache::new(
            page_count,
            config.cache,
            queues.clone(),
            events_tx,
        ));
        let worker = RenderWorker::spawn(rasterizer, queues, signals, cache.clone(), config.worker)?;

        info!(page_count, "document session opened");

        Ok(Self {
            cache,
            worker: Some(worker),
            events,
            page_sizes,
            current_page: None,
        })
    }

    /// Open a PDF file with PDFium and start a session over it
    #[cfg(feature = "pdfium")]
    pub fn open_pdf<P: AsRef<std::path::Path>>(
        path: P,
        config: SessionConfig,
    ) -> SessionResult<Self> {
        let rasterizer = pdf_viewer_render::PdfiumRasterizer::open(path)?;
        Self::open(rasterizer, config)
    }

    pub fn page_count(&self) -> usize {
        self.page_sizes.len()
    }

    /// Native size of a page in points
    pub fn page_size(&self, page_index: usize) -> Option<PageSize> {
        self.page_sizes.get(page_index).copied()
    }

    /// Page image at `scale`; see [`ImageCache::get_image`]
    ///
    /// # Panics
    /// Panics if `page_index` is not a page of the document.
    pub fn get_image(
        &self,
        page_index: usize,
        scale: f64,
        requester: RequesterId,
    ) -> Option<PageBitmap> {
        self.cache.get_image(page_index, scale, requester)
    }

    /// Thumbnail at `scale`; see [`ImageCache::get_thumbnail`]
    ///
    /// # Panics
    /// Panics if `page_index` is not a page of the document.
    pub fn get_thumbnail(&self, page_index: usize, scale: f64) -> Option<PageBitmap> {
        self.cache.get_thumbnail(page_index, scale)
    }

    /// Scale at which a page renders `width` pixels wide
    pub fn thumbnail_scale(&self, page_index: usize, width: f32) -> Option<f64> {
        self.page_size(page_index).map(|size| size.scale_for_width(width))
    }

    /// Pixel size of a thumbnail fitted to `max_width`
    pub fn thumbnail_size(&self, page_index: usize, max_width: f32) -> Option<(u32, u32)> {
        let size = self.page_size(page_index)?;
        Some(size.pixel_dimensions(size.scale_for_width(max_width)))
    }

    /// Next pending notification, if any
    pub fn try_next_event(&self) -> Option<CacheEvent> {
        self.events.try_recv().ok()
    }

    /// Wait up to `timeout` for the next notification
    pub fn wait_event(&self, timeout: Duration) -> Option<CacheEvent> {
        self.events.recv_timeout(timeout).ok()
    }

    /// All pending notifications
    pub fn drain_events(&self) -> Vec<CacheEvent> {
        self.events.try_iter().collect()
    }

    /// Record the page the user is looking at
    ///
    /// Returns the change to report, or `None` if `page_index` already was
    /// the current page.
    ///
    /// # Panics
    /// Panics if `page_index` is not a page of the document.
    pub fn set_current_page(&mut self, page_index: usize) -> Option<PageChanged> {
        assert!(
            page_index < self.page_count(),
            "page index {} out of range for document with {} pages",
            page_index,
            self.page_count()
        );

        if self.current_page == Some(page_index) {
            return None;
        }

        self.current_page = Some(page_index);
        debug!(page_index, "current page changed");
        Some(PageChanged {
            total: self.page_count(),
            current: page_index + 1,
        })
    }

    pub fn current_page(&self) -> Option<usize> {
        self.current_page
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// True once every page has been rendered at least once
    pub fn is_fully_loaded(&self) -> bool {
        self.cache.stats().fully_populated()
    }

    pub fn cache(&self) -> &Arc<ImageCache> {
        &self.cache
    }

    /// Stop background loading without waiting for the worker
    pub fn stop_loading(&self) {
        if let Some(worker) = &self.worker {
            worker.stop_loading();
        }
    }

    /// Stop background loading and wait for the worker thread to exit
    pub fn close(mut self) -> SessionResult<()> {
        match self.worker.take() {
            Some(worker) => {
                worker.shutdown()?;
                info!("document session closed");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for DocumentSession {
    fn drop(&mut self) {
        if self.worker.take().is_some() {
            // the worker's own drop stops and joins it
            info!("document session closed");
        }
    }
}
