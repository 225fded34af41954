//! PDF Viewer Scheduler Library
//!
//! The background side of the page cache: two FIFO job queues fed by cache
//! reads, and the single render worker thread that drains them.

pub mod queue;
pub mod worker;

pub use queue::{JobKind, QueueSignal, RenderJob, RenderQueues};
pub use worker::{RenderWorker, WorkerConfig, WorkerError, WorkerResult};
