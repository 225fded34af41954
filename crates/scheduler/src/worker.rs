//! Background render worker
//!
//! A single thread owns the [`Rasterizer`] for a document. It sleeps on the
//! queue wakeup channel, takes one job at a time from the queue named by the
//! wakeup, renders it synchronously and writes the result into the
//! [`ImageCache`]. The cache then notifies the UI side.

use crate::queue::{JobKind, QueueSignal, RenderJob, RenderQueues};
use pdf_viewer_cache::ImageCache;
use pdf_viewer_render::{PageBitmap, Rasterizer};
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Configuration for the render worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Name given to the worker thread.
    /// Default: "pdf-render-worker".
    pub thread_name: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            thread_name: "pdf-render-worker".to_string(),
        }
    }
}

impl WorkerConfig {
    /// Set the worker thread name.
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

/// Errors from starting or stopping the worker
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The OS refused to create the thread
    #[error("failed to spawn render worker thread: {0}")]
    Spawn(#[from] io::Error),

    /// The worker thread panicked before it could be joined
    #[error("render worker thread panicked")]
    Panicked,
}

/// Result type for worker operations
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Handle to the running render worker thread.
///
/// Dropping the handle stops loading and joins the thread.
///
/// # Example
///
/// ```
/// use pdf_viewer_cache::{CacheConfig, CacheEvent, ImageCache, RequesterId};
/// use pdf_viewer_render::{PageSize, SolidRasterizer};
/// use pdf_viewer_scheduler::{RenderQueues, RenderWorker, WorkerConfig};
/// use std::sync::{mpsc, Arc};
/// use std::time::Duration;
///
/// let (queues, signals) = RenderQueues::new();
/// let (events_tx, events) = mpsc::channel();
/// let cache = Arc::new(ImageCache::new(2, CacheConfig::default(), queues.clone(), events_tx));
///
/// let rasterizer = SolidRasterizer::uniform(2, PageSize::letter());
/// let worker = RenderWorker::spawn(rasterizer, queues, signals, cache.clone(), WorkerConfig::default())
///     .unwrap();
///
/// // First read queues a render; the event says when to read again
/// assert!(cache.get_image(0, 72.0, RequesterId(1)).is_none());
/// let event = events.recv_timeout(Duration::from_secs(5)).unwrap();
/// assert!(matches!(event, CacheEvent::PageUpdated { page_index: 0, .. }));
/// assert!(cache.get_image(0, 72.0, RequesterId(1)).is_some());
///
/// worker.shutdown().unwrap();
/// ```
pub struct RenderWorker {
    queues: Arc<RenderQueues>,
    thread: Option<JoinHandle<()>>,
}

impl RenderWorker {
    /// Start the worker thread.
    ///
    /// # Arguments
    ///
    /// * `rasterizer` - Backend that renders pages; moved onto the worker thread
    /// * `queues` - Job queues the cache enqueues into
    /// * `signals` - Receiving end of the queues' wakeup channel
    /// * `cache` - Cache that receives finished bitmaps
    /// * `config` - Worker configuration
    pub fn spawn<R>(
        rasterizer: R,
        queues: Arc<RenderQueues>,
        signals: Receiver<QueueSignal>,
        cache: Arc<ImageCache>,
        config: WorkerConfig,
    ) -> WorkerResult<Self>
    where
        R: Rasterizer + 'static,
    {
        let worker_queues = Arc::clone(&queues);
        let thread = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || Self::run(rasterizer, worker_queues, signals, cache))?;

        debug!(thread_name = %config.thread_name, "render worker spawned");

        Ok(Self {
            queues,
            thread: Some(thread),
        })
    }

    /// Main worker loop.
    ///
    /// Each wakeup accounts for one queued job. The stop flag is checked
    /// through `dequeue` before every job is taken.
    fn run<R: Rasterizer>(
        rasterizer: R,
        queues: Arc<RenderQueues>,
        signals: Receiver<QueueSignal>,
        cache: Arc<ImageCache>,
    ) {
        while let Ok(signal) = signals.recv() {
            let kind = match signal {
                QueueSignal::Queued(kind) => kind,
                QueueSignal::Stop => break,
            };

            let Some(job) = queues.dequeue(kind) else {
                if queues.is_stopped() {
                    break;
                }
                continue;
            };

            match kind {
                JobKind::Page => render_page(&rasterizer, &cache, job),
                JobKind::Thumbnail => render_thumbnail(&rasterizer, &cache, job),
            }
        }

        let discarded = queues.discard_pending();
        debug!(discarded, "render worker stopped");
    }

    /// Ask the worker to stop after the job it is currently rendering.
    pub fn stop_loading(&self) {
        self.queues.stop_loading();
    }

    /// Check if the worker thread is still running.
    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .is_some_and(|thread| !thread.is_finished())
    }

    /// Stop loading and wait for the worker thread to exit.
    pub fn shutdown(mut self) -> WorkerResult<()> {
        self.stop_and_join()
    }

    fn stop_and_join(&mut self) -> WorkerResult<()> {
        self.queues.stop_loading();
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| WorkerError::Panicked),
            None => Ok(()),
        }
    }
}

impl Drop for RenderWorker {
    fn drop(&mut self) {
        if let Err(error) = self.stop_and_join() {
            warn!(%error, "render worker did not shut down cleanly");
        }
    }
}

fn render_page<R: Rasterizer>(rasterizer: &R, cache: &ImageCache, job: RenderJob) {
    trace!(page_index = job.page_index, scale = job.scale, "rendering page");
    match rasterizer.render_page(job.page_index, job.scale) {
        Ok(image) => {
            let bitmap = PageBitmap::from_dynamic(image);
            trace!(page_index = job.page_index, dimensions = ?bitmap.dimensions(), "page rendered");
            cache.set_image(job.page_index, job.scale, bitmap);
        }
        Err(error) => {
            warn!(page_index = job.page_index, scale = job.scale, %error, "page render failed");
            cache.render_failed(job.page_index);
        }
    }
}

fn render_thumbnail<R: Rasterizer>(rasterizer: &R, cache: &ImageCache, job: RenderJob) {
    trace!(page_index = job.page_index, scale = job.scale, "rendering thumbnail");
    match rasterizer.render_thumbnail(job.page_index, job.scale) {
        Ok(image) => {
            cache.set_thumbnail(job.page_index, PageBitmap::from_dynamic(image));
        }
        Err(error) => {
            warn!(page_index = job.page_index, scale = job.scale, %error, "thumbnail render failed");
            cache.thumbnail_failed(job.page_index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::DynamicImage;
    use pdf_viewer_cache::{CacheConfig, CacheEvent, PageState, RequesterId};
    use pdf_viewer_render::{PageSize, RenderError, RenderResult, SolidRasterizer};
    use std::sync::{mpsc, Mutex};
    use std::time::{Duration, Instant};

    const TIMEOUT: Duration = Duration::from_secs(5);
    const VIEW: RequesterId = RequesterId(1);

    /// Records which pages were rendered and on which thread
    struct RecordingRasterizer {
        inner: SolidRasterizer,
        rendered: Arc<Mutex<Vec<(usize, Option<String>)>>>,
    }

    impl Rasterizer for RecordingRasterizer {
        fn page_count(&self) -> usize {
            self.inner.page_count()
        }

        fn page_size(&self, page_index: usize) -> RenderResult<PageSize> {
            self.inner.page_size(page_index)
        }

        fn render_page(&self, page_index: usize, scale: f64) -> RenderResult<DynamicImage> {
            let name = thread::current().name().map(str::to_string);
            self.rendered.lock().unwrap().push((page_index, name));
            self.inner.render_page(page_index, scale)
        }
    }

    struct FailingRasterizer;

    impl Rasterizer for FailingRasterizer {
        fn page_count(&self) -> usize {
            4
        }

        fn page_size(&self, _page_index: usize) -> RenderResult<PageSize> {
            Ok(PageSize::letter())
        }

        fn render_page(&self, page_index: usize, _scale: f64) -> RenderResult<DynamicImage> {
            Err(RenderError::Rasterize {
                page_index,
                message: "corrupt content stream".to_string(),
            })
        }
    }

    struct Fixture {
        cache: Arc<ImageCache>,
        queues: Arc<RenderQueues>,
        signals: Receiver<QueueSignal>,
        events: Receiver<CacheEvent>,
    }

    fn fixture(page_count: usize) -> Fixture {
        let (queues, signals) = RenderQueues::new();
        let (events_tx, events) = mpsc::channel();
        let cache = Arc::new(ImageCache::new(
            page_count,
            CacheConfig::default(),
            queues.clone(),
            events_tx,
        ));
        Fixture {
            cache,
            queues,
            signals,
            events,
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + TIMEOUT;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_worker_config_default() {
        let config = WorkerConfig::default();
        assert_eq!(config.thread_name, "pdf-render-worker");
        assert_eq!(config.with_thread_name("other").thread_name, "other");
    }

    #[test]
    fn test_worker_renders_requested_page() {
        let f = fixture(3);
        let rasterizer = SolidRasterizer::uniform(3, PageSize::letter());
        let worker =
            RenderWorker::spawn(rasterizer, f.queues, f.signals, f.cache.clone(), WorkerConfig::default())
                .unwrap();

        assert!(f.cache.get_image(1, 72.0, VIEW).is_none());

        let event = f.events.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(
            event,
            CacheEvent::PageUpdated {
                page_index: 1,
                requester: VIEW
            }
        );

        let image = f.cache.get_image(1, 72.0, VIEW).unwrap();
        assert_eq!(image.dimensions(), (612, 792));
        assert_eq!(f.cache.page_state(1), PageState::Exact { scale: 72.0 });

        worker.shutdown().unwrap();
    }

    #[test]
    fn test_worker_renders_thumbnails() {
        let f = fixture(2);
        let rasterizer = SolidRasterizer::uniform(2, PageSize::new(720.0, 720.0));
        let worker =
            RenderWorker::spawn(rasterizer, f.queues, f.signals, f.cache.clone(), WorkerConfig::default())
                .unwrap();

        assert!(f.cache.get_thumbnail(0, 7.2).is_none());
        let event = f.events.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(event, CacheEvent::ThumbnailLoaded { page_index: 0 });

        let thumbnail = f.cache.get_thumbnail(0, 7.2).unwrap();
        assert_eq!(thumbnail.dimensions(), (72, 72));
        assert_eq!(f.cache.total_size(), 0);

        worker.shutdown().unwrap();
    }

    #[test]
    fn test_worker_processes_jobs_in_order_on_named_thread() {
        let f = fixture(4);
        let rendered = Arc::new(Mutex::new(Vec::new()));
        let rasterizer = RecordingRasterizer {
            inner: SolidRasterizer::uniform(4, PageSize::new(72.0, 72.0)),
            rendered: rendered.clone(),
        };

        // queued before the worker exists; the wakeups are buffered
        for page in [2, 0, 3] {
            f.cache.get_image(page, 72.0, VIEW);
        }

        let config = WorkerConfig::default().with_thread_name("test-render-thread");
        let worker = RenderWorker::spawn(rasterizer, f.queues, f.signals, f.cache.clone(), config)
            .unwrap();

        for _ in 0..3 {
            f.events.recv_timeout(TIMEOUT).unwrap();
        }

        let rendered = rendered.lock().unwrap().clone();
        let pages: Vec<usize> = rendered.iter().map(|(page, _)| *page).collect();
        assert_eq!(pages, vec![2, 0, 3]);
        assert!(rendered
            .iter()
            .all(|(_, name)| name.as_deref() == Some("test-render-thread")));

        worker.shutdown().unwrap();
    }

    #[test]
    fn test_render_failure_clears_rendering_flag() {
        let f = fixture(4);
        let worker = RenderWorker::spawn(
            FailingRasterizer,
            f.queues,
            f.signals,
            f.cache.clone(),
            WorkerConfig::default(),
        )
        .unwrap();

        f.cache.get_image(2, 72.0, VIEW);
        assert!(wait_until(|| f.cache.page_state(2) == PageState::Empty));
        assert!(f.events.try_recv().is_err());

        worker.shutdown().unwrap();
    }

    #[test]
    fn test_stop_before_start_discards_pending_jobs() {
        let f = fixture(3);
        for page in 0..3 {
            f.cache.get_image(page, 72.0, VIEW);
        }
        f.queues.stop_loading();

        let queues = f.queues.clone();
        let rasterizer = SolidRasterizer::uniform(3, PageSize::letter());
        let worker =
            RenderWorker::spawn(rasterizer, f.queues, f.signals, f.cache.clone(), WorkerConfig::default())
                .unwrap();
        worker.shutdown().unwrap();

        assert_eq!(queues.pending(JobKind::Page), 0);
        assert!(f.events.try_recv().is_err());
        assert_eq!(f.cache.stats().populated_pages, 0);
    }

    #[test]
    fn test_requests_after_stop_are_dropped() {
        let f = fixture(2);
        let queues = f.queues.clone();
        let rasterizer = SolidRasterizer::uniform(2, PageSize::letter());
        let worker =
            RenderWorker::spawn(rasterizer, f.queues, f.signals, f.cache.clone(), WorkerConfig::default())
                .unwrap();

        worker.stop_loading();
        assert!(wait_until(|| !worker.is_running()));

        f.cache.get_image(0, 72.0, VIEW);
        assert_eq!(queues.pending(JobKind::Page), 0);
        assert!(f.events.try_recv().is_err());
    }

    #[test]
    fn test_drop_joins_worker() {
        let f = fixture(1);
        let queues = f.queues.clone();
        let rasterizer = SolidRasterizer::uniform(1, PageSize::letter());
        let worker =
            RenderWorker::spawn(rasterizer, f.queues, f.signals, f.cache.clone(), WorkerConfig::default())
                .unwrap();

        drop(worker);
        assert!(queues.is_stopped());
    }
}
