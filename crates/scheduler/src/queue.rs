//! Render job queues
//!
//! Page jobs and thumbnail jobs live in separate FIFO queues, each behind
//! its own lock, so a burst of thumbnail requests never waits on the page
//! queue lock and vice versa. Every enqueue sends a [`QueueSignal`] naming
//! the queue; the worker blocks on those signals instead of polling.

use pdf_viewer_cache::RenderRequester;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

/// One render request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderJob {
    pub page_index: usize,
    pub scale: f64,
}

impl RenderJob {
    pub fn new(page_index: usize, scale: f64) -> Self {
        Self { page_index, scale }
    }
}

/// Which queue a job belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// Full page at display scale
    Page,
    /// Small preview
    Thumbnail,
}

/// Wakeup delivered to the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueSignal {
    /// One job was appended to the named queue
    Queued(JobKind),
    /// Loading was stopped; exit
    Stop,
}

/// The two job queues plus the stop flag shared with the worker
pub struct RenderQueues {
    pages: Mutex<VecDeque<RenderJob>>,
    thumbnails: Mutex<VecDeque<RenderJob>>,
    stopped: AtomicBool,
    signals: Sender<QueueSignal>,
}

impl RenderQueues {
    /// Create empty queues and the receiving end of their wakeup channel
    pub fn new() -> (Arc<Self>, Receiver<QueueSignal>) {
        let (signals, receiver) = mpsc::channel();
        let queues = Arc::new(Self {
            pages: Mutex::new(VecDeque::new()),
            thumbnails: Mutex::new(VecDeque::new()),
            stopped: AtomicBool::new(false),
            signals,
        });
        (queues, receiver)
    }

    fn queue(&self, kind: JobKind) -> MutexGuard<'_, VecDeque<RenderJob>> {
        let queue = match kind {
            JobKind::Page => &self.pages,
            JobKind::Thumbnail => &self.thumbnails,
        };
        queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a job and wake the worker
    ///
    /// Returns false (and drops the job) once loading has been stopped.
    pub fn enqueue(&self, kind: JobKind, job: RenderJob) -> bool {
        if self.is_stopped() {
            trace!(?kind, page_index = job.page_index, "dropping job after stop");
            return false;
        }

        self.queue(kind).push_back(job);
        // The worker may already be gone; the job then just stays queued
        let _ = self.signals.send(QueueSignal::Queued(kind));
        true
    }

    /// Take the oldest job of `kind`, or nothing once stopped
    pub fn dequeue(&self, kind: JobKind) -> Option<RenderJob> {
        if self.is_stopped() {
            return None;
        }
        self.queue(kind).pop_front()
    }

    /// Number of jobs waiting in one queue
    pub fn pending(&self, kind: JobKind) -> usize {
        self.queue(kind).len()
    }

    /// Stop loading: later enqueues are dropped and the worker exits
    pub fn stop_loading(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            let _ = self.signals.send(QueueSignal::Stop);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Drop every queued job; returns how many were dropped
    pub fn discard_pending(&self) -> usize {
        let mut discarded = 0;
        for kind in [JobKind::Page, JobKind::Thumbnail] {
            let mut queue = self.queue(kind);
            discarded += queue.len();
            queue.clear();
        }
        discarded
    }
}

impl RenderRequester for RenderQueues {
    fn request_page(&self, page_index: usize, scale: f64) {
        self.enqueue(JobKind::Page, RenderJob::new(page_index, scale));
    }

    fn request_thumbnail(&self, page_index: usize, scale: f64) {
        self.enqueue(JobKind::Thumbnail, RenderJob::new(page_index, scale));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let (queues, _signals) = RenderQueues::new();
        for page in [3, 1, 2] {
            assert!(queues.enqueue(JobKind::Page, RenderJob::new(page, 72.0)));
        }

        let order: Vec<usize> = std::iter::from_fn(|| queues.dequeue(JobKind::Page))
            .map(|job| job.page_index)
            .collect();
        assert_eq!(order, vec![3, 1, 2]);
    }

    #[test]
    fn test_queues_are_independent() {
        let (queues, _signals) = RenderQueues::new();
        queues.enqueue(JobKind::Page, RenderJob::new(0, 72.0));
        queues.enqueue(JobKind::Thumbnail, RenderJob::new(5, 10.0));

        assert_eq!(queues.pending(JobKind::Page), 1);
        assert_eq!(queues.pending(JobKind::Thumbnail), 1);
        assert_eq!(
            queues.dequeue(JobKind::Thumbnail),
            Some(RenderJob::new(5, 10.0))
        );
        assert_eq!(queues.pending(JobKind::Page), 1);
    }

    #[test]
    fn test_enqueue_signals_queue_kind() {
        let (queues, signals) = RenderQueues::new();
        queues.enqueue(JobKind::Thumbnail, RenderJob::new(0, 10.0));
        queues.enqueue(JobKind::Page, RenderJob::new(0, 72.0));

        assert_eq!(signals.try_recv(), Ok(QueueSignal::Queued(JobKind::Thumbnail)));
        assert_eq!(signals.try_recv(), Ok(QueueSignal::Queued(JobKind::Page)));
        assert!(signals.try_recv().is_err());
    }

    #[test]
    fn test_stop_blocks_enqueue_and_dequeue() {
        let (queues, signals) = RenderQueues::new();
        queues.enqueue(JobKind::Page, RenderJob::new(0, 72.0));

        queues.stop_loading();
        queues.stop_loading();

        assert!(queues.is_stopped());
        assert!(!queues.enqueue(JobKind::Page, RenderJob::new(1, 72.0)));
        assert_eq!(queues.dequeue(JobKind::Page), None);
        assert_eq!(queues.pending(JobKind::Page), 1);

        let received: Vec<QueueSignal> = signals.try_iter().collect();
        assert_eq!(
            received,
            vec![QueueSignal::Queued(JobKind::Page), QueueSignal::Stop]
        );
    }

    #[test]
    fn test_discard_pending() {
        let (queues, _signals) = RenderQueues::new();
        queues.enqueue(JobKind::Page, RenderJob::new(0, 72.0));
        queues.enqueue(JobKind::Page, RenderJob::new(1, 72.0));
        queues.enqueue(JobKind::Thumbnail, RenderJob::new(0, 10.0));

        assert_eq!(queues.discard_pending(), 3);
        assert_eq!(queues.pending(JobKind::Page), 0);
        assert_eq!(queues.pending(JobKind::Thumbnail), 0);
    }

    #[test]
    fn test_requester_impl_routes_jobs() {
        let (queues, _signals) = RenderQueues::new();
        let requester: &dyn RenderRequester = &*queues;

        requester.request_page(2, 144.0);
        requester.request_thumbnail(4, 12.0);

        assert_eq!(queues.dequeue(JobKind::Page), Some(RenderJob::new(2, 144.0)));
        assert_eq!(
            queues.dequeue(JobKind::Thumbnail),
            Some(RenderJob::new(4, 12.0))
        );
    }
}
