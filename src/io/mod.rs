//! Driver abstraction, aligned output buffers, and the two-level byte-range
//! cache — the layer [`crate::h5::context::Context`] builds on.

pub mod aligned_buf;
pub mod cache;
pub mod driver;
pub mod instrumented;
pub mod mem;

pub use aligned_buf::{alloc_aligned, AlignedBuf, OUTPUT_ALIGN};
pub use cache::ByteRangeCache;
pub use driver::{IoDriver, LocalFileDriver};
pub use instrumented::{maybe_instrumented, InstrumentedDriver};
pub use mem::MemDriver;
