//! Scale-aware page image cache with a pixel budget
//!
//! One entry per page, all behind a single mutex. Reads never block on
//! rendering: a read returns whatever the entry holds right now (an exact
//! render, a rescaled stand-in, a stale image or nothing) and, if needed,
//! asks the [`RenderRequester`] for an exact render. The render worker
//! writes results back with [`ImageCache::set_image`], which also enforces
//! the budget by evicting older pages round-robin.
//!
//! The lock is never held while calling the requester or sending events.

use crate::config::CacheConfig;
use crate::entry::{CacheEntry, EntryInfo, PageState};
use crate::events::{CacheEvent, RenderRequester, RequesterId};
use pdf_viewer_render::PageBitmap;
use std::fmt;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStats {
    /// Reads answered with an image already at the requested scale
    pub hits: u64,

    /// Reads answered by rescaling an exact render
    pub approximations: u64,

    /// Reads that needed a new render
    pub misses: u64,

    /// Page render jobs handed to the requester
    pub render_requests: u64,

    /// Thumbnail render jobs handed to the requester
    pub thumbnail_requests: u64,

    /// Images dropped to get back under budget
    pub evictions: u64,

    /// Pixels currently held by page images
    pub total_size: u64,

    /// Pixel budget
    pub budget: u64,

    /// Pages that have received at least one image
    pub populated_pages: usize,

    /// Pages in the document
    pub page_count: usize,
}

impl CacheStats {
    /// Fraction of reads served without waiting for a render (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let served = self.hits + self.approximations;
        let total = served + self.misses;
        if total == 0 {
            0.0
        } else {
            served as f64 / total as f64
        }
    }

    /// Budget utilization (can exceed 1.0 when eviction cannot make progress)
    pub fn budget_utilization(&self) -> f64 {
        if self.budget == 0 {
            0.0
        } else {
            self.total_size as f64 / self.budget as f64
        }
    }

    /// True once every page has received an image
    pub fn fully_populated(&self) -> bool {
        self.populated_pages == self.page_count
    }
}

/// Internal cache state
struct CacheState {
    entries: Vec<CacheEntry>,

    /// Sum of pixel counts of all page images
    total_size: u64,

    /// Last recency stamp handed out
    recency_counter: u64,

    /// Where the next eviction pass starts
    eviction_cursor: usize,

    populated_pages: usize,

    /// Counters only; sizes are filled in by `ImageCache::stats`
    stats: CacheStats,
}

impl CacheState {
    fn new(page_count: usize) -> Self {
        let mut entries = Vec::with_capacity(page_count);
        entries.resize_with(page_count, CacheEntry::default);

        Self {
            entries,
            total_size: 0,
            recency_counter: 0,
            eviction_cursor: 0,
            populated_pages: 0,
            stats: CacheStats::default(),
        }
    }

    fn check_index(&self, page_index: usize) {
        assert!(
            page_index < self.entries.len(),
            "page index {} out of range for document with {} pages",
            page_index,
            self.entries.len()
        );
    }

    /// Stamp an entry as most recently used
    ///
    /// An entry that already holds the newest stamp keeps it, so repeated
    /// reads of one page do not age every other page.
    fn touch(&mut self, page_index: usize) {
        let recency = self.entries[page_index].recency;
        if recency == 0 || recency < self.recency_counter {
            self.recency_counter += 1;
            self.entries[page_index].recency = self.recency_counter;
        }
    }

    fn is_protected(&self, recency: u64, protected_recent: u64) -> bool {
        recency.saturating_add(protected_recent) > self.recency_counter
    }

    fn is_evictable(&self, page_index: usize, protected_recent: u64) -> bool {
        let entry = &self.entries[page_index];
        entry.image.is_some()
            && !entry.rendering
            && !self.is_protected(entry.recency, protected_recent)
    }

    /// One round-robin eviction pass
    ///
    /// Scans at most once over all entries starting at the cursor and stops
    /// as soon as the total is within `budget`. Returns the number of images
    /// dropped.
    fn evict(&mut self, budget: u64, protected_recent: u64) -> u64 {
        let len = self.entries.len();
        if len == 0 {
            return 0;
        }

        let start = self.eviction_cursor % len;
        let mut evicted = 0;
        let mut last_evicted = None;

        for offset in 0..len {
            let index = (start + offset) % len;
            if !self.is_evictable(index, protected_recent) {
                continue;
            }

            let released = self.entries[index].clear_image();
            self.total_size = self.total_size.saturating_sub(released);
            evicted += 1;
            last_evicted = Some(index);
            trace!(page_index = index, released, "evicted page image");

            if self.total_size <= budget {
                break;
            }
        }

        if let Some(index) = last_evicted {
            self.eviction_cursor = (index + 1) % len;
        }
        self.stats.evictions += evicted;
        evicted
    }
}

/// Outcome of a read, decided under the lock and acted on after it
struct ReadOutcome {
    image: Option<PageBitmap>,
    enqueue: bool,
}

/// First step of a read, taken under the lock
enum Lookup {
    Done(ReadOutcome),

    /// An exact render within tolerance; resampled with the lock released
    Rescale {
        source: PageBitmap,
        cached_scale: f64,
    },
}

/// Shared page image cache for one open document
pub struct ImageCache {
    state: Mutex<CacheState>,
    config: CacheConfig,
    requester: Arc<dyn RenderRequester>,
    events: Sender<CacheEvent>,
}

impl ImageCache {
    /// Create a cache with one empty entry per page
    ///
    /// `requester` receives render jobs; `events` receives a [`CacheEvent`]
    /// whenever a render lands.
    pub fn new(
        page_count: usize,
        config: CacheConfig,
        requester: Arc<dyn RenderRequester>,
        events: Sender<CacheEvent>,
    ) -> Self {
        debug!(
            page_count,
            budget_pixels = config.budget_pixels,
            "creating page image cache"
        );

        Self {
            state: Mutex::new(CacheState::new(page_count)),
            config,
            requester,
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Image for `page_index` at `scale`, without blocking on rendering
    ///
    /// Returns the cached image if it was rendered at exactly `scale`, a
    /// rescaled copy if an exact render within the approximation tolerance
    /// exists, and otherwise whatever the entry holds (possibly nothing)
    /// while an exact render is queued. `requester` is notified through a
    /// [`CacheEvent::PageUpdated`] when that render lands.
    ///
    /// The rescale runs outside the cache lock, so other pages can be read
    /// and stored meanwhile. If the entry changes before the stand-in is
    /// committed, the read is answered as a hit or a miss instead.
    ///
    /// # Panics
    /// Panics if `page_index` is not a page of the document.
    pub fn get_image(
        &self,
        page_index: usize,
        scale: f64,
        requester: RequesterId,
    ) -> Option<PageBitmap> {
        let lookup = {
            let mut guard = self.lock();
            let state = &mut *guard;
            state.check_index(page_index);

            if let Some(outcome) = Self::hit(state, page_index, scale) {
                Lookup::Done(outcome)
            } else if let Some((source, cached_scale)) =
                self.approximation_source(&state.entries[page_index], scale)
            {
                Lookup::Rescale {
                    source,
                    cached_scale,
                }
            } else {
                Lookup::Done(Self::miss(state, page_index, scale, requester))
            }
        };

        let outcome = match lookup {
            Lookup::Done(outcome) => outcome,
            Lookup::Rescale {
                source,
                cached_scale,
            } => {
                let image = source.rescaled(scale / cached_scale);
                self.finish_approximation(
                    page_index,
                    scale,
                    requester,
                    &source,
                    cached_scale,
                    image,
                )
            }
        };

        if outcome.enqueue {
            self.requester.request_page(page_index, scale);
        }
        outcome.image
    }

    fn hit(state: &mut CacheState, page_index: usize, scale: f64) -> Option<ReadOutcome> {
        let entry = &state.entries[page_index];
        if entry.scale != Some(scale) {
            return None;
        }
        let image = entry.image.clone()?;

        state.touch(page_index);
        state.stats.hits += 1;
        trace!(page_index, scale, "page cache hit");
        Some(ReadOutcome {
            image: Some(image),
            enqueue: false,
        })
    }

    /// Exact render to derive a stand-in from, with the scale it was made at
    fn approximation_source(&self, entry: &CacheEntry, scale: f64) -> Option<(PageBitmap, f64)> {
        match (&entry.image, entry.scale) {
            (Some(image), Some(cached))
                if !entry.approximated
                    && cached > 0.0
                    && (cached - scale).abs() < self.config.approximation_tolerance =>
            {
                Some((image.clone(), cached))
            }
            _ => None,
        }
    }

    /// Commit a resampled stand-in if the entry still holds `source`
    fn finish_approximation(
        &self,
        page_index: usize,
        scale: f64,
        requester: RequesterId,
        source: &PageBitmap,
        cached_scale: f64,
        image: PageBitmap,
    ) -> ReadOutcome {
        let mut guard = self.lock();
        let state = &mut *guard;

        let entry = &state.entries[page_index];
        let unchanged = !entry.approximated
            && entry.scale == Some(cached_scale)
            && entry
                .image
                .as_ref()
                .is_some_and(|current| current.same_bitmap(source));

        if unchanged {
            return self.commit_approximation(
                state,
                page_index,
                scale,
                cached_scale,
                image,
                requester,
            );
        }

        trace!(page_index, scale, "page changed while rescaling");
        match Self::hit(state, page_index, scale) {
            Some(outcome) => outcome,
            None => Self::miss(state, page_index, scale, requester),
        }
    }

    fn commit_approximation(
        &self,
        state: &mut CacheState,
        page_index: usize,
        scale: f64,
        cached_scale: f64,
        image: PageBitmap,
        requester: RequesterId,
    ) -> ReadOutcome {
        let entry = &mut state.entries[page_index];
        let old_size = entry.image_size();
        let new_size = image.pixel_count();
        entry.store_approximation(image.clone(), scale);

        let mut enqueue = false;
        if self.config.refine_approximations {
            entry.requester = Some(requester);
            if !entry.rendering {
                entry.rendering = true;
                enqueue = true;
            }
        }

        state.total_size = state.total_size + new_size - old_size;
        state.touch(page_index);
        state.stats.approximations += 1;
        if enqueue {
            state.stats.render_requests += 1;
        }

        debug!(
            page_index,
            from = cached_scale,
            to = scale,
            refine = enqueue,
            "approximated page image"
        );

        ReadOutcome {
            image: Some(image),
            enqueue,
        }
    }

    fn miss(
        state: &mut CacheState,
        page_index: usize,
        scale: f64,
        requester: RequesterId,
    ) -> ReadOutcome {
        let entry = &mut state.entries[page_index];
        let image = entry.image.clone();
        entry.requester = Some(requester);

        let enqueue = !entry.rendering;
        if enqueue {
            entry.rendering = true;
            state.stats.render_requests += 1;
            debug!(page_index, scale, "queueing page render");
        }
        state.stats.misses += 1;

        ReadOutcome { image, enqueue }
    }

    /// Store an exact render; called by the render worker
    ///
    /// Runs an eviction pass if the budget is exceeded, then notifies the
    /// requester that was waiting for this page, if any.
    ///
    /// # Panics
    /// Panics if `page_index` is not a page of the document.
    pub fn set_image(&self, page_index: usize, scale: f64, image: PageBitmap) {
        let new_size = image.pixel_count();

        let requester = {
            let mut guard = self.lock();
            let state = &mut *guard;
            state.check_index(page_index);

            let entry = &mut state.entries[page_index];
            let old_size = entry.image_size();
            let first_population = !entry.populated && new_size > 0;
            if first_population {
                entry.populated = true;
            }
            entry.store_exact(image, scale);
            let requester = entry.requester.take();

            if first_population {
                state.populated_pages += 1;
            }
            state.total_size = state.total_size + new_size - old_size;
            state.touch(page_index);

            if state.total_size > self.config.budget_pixels {
                let evicted = state.evict(self.config.budget_pixels, self.config.protected_recent);
                debug!(
                    evicted,
                    total_size = state.total_size,
                    budget = self.config.budget_pixels,
                    cursor = state.eviction_cursor,
                    "eviction pass"
                );
            }

            trace!(page_index, scale, new_size, total_size = state.total_size, "stored page image");
            requester
        };

        if let Some(requester) = requester {
            self.send(CacheEvent::PageUpdated {
                page_index,
                requester,
            });
        }
    }

    /// Forget that a page render is in flight so a later read can retry
    ///
    /// # Panics
    /// Panics if `page_index` is not a page of the document.
    pub fn render_failed(&self, page_index: usize) {
        let mut state = self.lock();
        state.check_index(page_index);
        state.entries[page_index].rendering = false;
    }

    /// Thumbnail for `page_index`, queueing a render at `scale` if absent
    ///
    /// Thumbnails are independent of page images: they are not counted
    /// against the budget and never evicted.
    ///
    /// # Panics
    /// Panics if `page_index` is not a page of the document.
    pub fn get_thumbnail(&self, page_index: usize, scale: f64) -> Option<PageBitmap> {
        let enqueue = {
            let mut guard = self.lock();
            let state = &mut *guard;
            state.check_index(page_index);

            let entry = &mut state.entries[page_index];
            if let Some(thumbnail) = &entry.thumbnail {
                return Some(thumbnail.clone());
            }

            let enqueue = !entry.thumbnail_rendering;
            if enqueue {
                entry.thumbnail_rendering = true;
                state.stats.thumbnail_requests += 1;
            }
            enqueue
        };

        if enqueue {
            debug!(page_index, scale, "queueing thumbnail render");
            self.requester.request_thumbnail(page_index, scale);
        }
        None
    }

    /// Store a thumbnail; called by the render worker
    ///
    /// # Panics
    /// Panics if `page_index` is not a page of the document.
    pub fn set_thumbnail(&self, page_index: usize, image: PageBitmap) {
        {
            let mut state = self.lock();
            state.check_index(page_index);
            let entry = &mut state.entries[page_index];
            entry.thumbnail = Some(image);
            entry.thumbnail_rendering = false;
        }

        self.send(CacheEvent::ThumbnailLoaded { page_index });
    }

    /// Forget that a thumbnail render is in flight
    ///
    /// # Panics
    /// Panics if `page_index` is not a page of the document.
    pub fn thumbnail_failed(&self, page_index: usize) {
        let mut state = self.lock();
        state.check_index(page_index);
        state.entries[page_index].thumbnail_rendering = false;
    }

    fn send(&self, event: CacheEvent) {
        if self.events.send(event).is_err() {
            trace!(?event, "no event receiver");
        }
    }

    /// Current statistics
    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            total_size: state.total_size,
            budget: self.config.budget_pixels,
            populated_pages: state.populated_pages,
            page_count: state.entries.len(),
            ..state.stats
        }
    }

    /// Bookkeeping snapshot of one entry
    ///
    /// # Panics
    /// Panics if `page_index` is not a page of the document.
    pub fn entry_info(&self, page_index: usize) -> EntryInfo {
        let state = self.lock();
        state.check_index(page_index);
        state.entries[page_index].info()
    }

    /// Render state of one page
    ///
    /// # Panics
    /// Panics if `page_index` is not a page of the document.
    pub fn page_state(&self, page_index: usize) -> PageState {
        let state = self.lock();
        state.check_index(page_index);
        state.entries[page_index].state()
    }

    /// Pixels currently held by page images
    pub fn total_size(&self) -> u64 {
        self.lock().total_size
    }

    pub fn page_count(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn populated_pages(&self) -> usize {
        self.lock().populated_pages
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

impl fmt::Debug for ImageCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageCache")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
