//! Page rendering and encoding stages shared by the workflow nodes.
//!
//! 1. [`render`] — rasterise PDF pages to PNG files in the request temp
//!    directory; runs on `spawn_blocking` workers because pdfium is
//!    CPU-bound and not async-safe
//! 2. [`encode`] — rendered PNG file → base64 [`edgequake_llm::ImageData`]
//!    for the vision request body
//!
//! Every fan-out in the engine (init rendering, classify inference, enhance
//! re-rendering) obeys the same worker bound computed by [`worker_bound`].

pub mod encode;
pub mod render;

/// Worker-pool size for a fan-out over `item_count` items:
/// `max(1, min(logical_CPU_count, item_count))`.
pub fn worker_bound(item_count: usize) -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    cpus.min(item_count).max(1)
}
