//! Public library surface: `Context`, synchronous `read`, asynchronous
//! `readp`, and the one-time `init`/`deinit` pair that owns the reader pool.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use tracing::{instrument, warn};

use crate::config::Config;
use crate::error::{H5CoroError, Result};
use crate::future::{Future, FutureData, WaitStatus};
use crate::h5::context::Context as IoContext;
use crate::h5::dataset::{DatasetMeta, MAX_NDIMS};
use crate::h5::materializer::SliceArg;
use crate::h5::metadata_repo::MetadataRepo;
use crate::h5::objheader::parse_dataset;
use crate::h5::superblock::{read_superblock, FileLayout};
use crate::io::driver::IoDriver;
use crate::io::instrumented::maybe_instrumented;
use crate::pool::{run_request, Pool};
use crate::ValueType;

static METADATA_REPO: OnceLock<MetadataRepo> = OnceLock::new();
static POOL: Mutex<Option<Pool>> = Mutex::new(None);
static TRACE_ID_GEN: AtomicU64 = AtomicU64::new(1);

fn metadata_repo() -> &'static MetadataRepo {
    METADATA_REPO.get_or_init(MetadataRepo::new)
}

/// Allocate a new process-wide trace id for correlating a request across
/// logs — a process-wide atomic counter, cheap and collision-free.
pub fn new_trace_id() -> u64 {
    TRACE_ID_GEN.fetch_add(1, Ordering::Relaxed)
}

/// One-time setup: spawns `num_threads` reader-pool workers. Calling this
/// more than once replaces the existing pool, joining its workers first.
pub fn init(num_threads: usize) {
    let mut guard = POOL.lock().unwrap();
    *guard = Some(Pool::new(num_threads));
}

/// Convenience entry point reading the worker-pool size from
/// `H5CORO_POOL_THREADS`, falling back to
/// [`crate::config::DEFAULT_POOL_THREADS`] when unset.
pub fn init_from_env() {
    init(Config::from_env().pool_threads);
}

/// Joins all workers and drops the queue. Safe to call even if `init` was
/// never called.
pub fn deinit() {
    let mut guard = POOL.lock().unwrap();
    *guard = None;
}

/// A result of materializing a dataset (or just its shape, for
/// `meta_only` requests).
pub struct ReadInfo {
    pub elements: usize,
    pub shape: [u64; MAX_NDIMS],
    pub data: Option<FutureData>,
}

/// An open resource: owns the I/O driver, the byte-range cache, and a
/// lazily-parsed superblock layout.
pub struct Context {
    resource_name: String,
    io: Arc<IoContext>,
    layout: OnceLock<FileLayout>,
}

impl Context {
    /// Open a resource through `driver`, transparently wrapped in an I/O
    /// trace logger when `H5CORO_IO_LOG` is set.
    /// Fails only if tracing is requested and the log file can't be created.
    pub fn open(resource_name: impl Into<String>, driver: Box<dyn IoDriver>) -> Result<Self> {
        let traced = maybe_instrumented(driver)?;
        Ok(Self {
            resource_name: resource_name.into(),
            io: Arc::new(IoContext::new(traced)),
            layout: OnceLock::new(),
        })
    }

    fn layout(&self) -> Result<FileLayout> {
        if let Some(layout) = self.layout.get() {
            return Ok(*layout);
        }
        let layout = read_superblock(&self.io)?;
        let _ = self.layout.set(layout);
        Ok(layout)
    }

    fn resolve_meta(&self, dataset: &str) -> Result<DatasetMeta> {
        let layout = self.layout()?;
        if let Some(meta) = metadata_repo().get(&self.resource_name, dataset)? {
            return Ok(meta);
        }
        let meta = parse_dataset(&self.io, layout, dataset)?;
        metadata_repo().insert(&self.resource_name, dataset, meta.clone())?;
        Ok(meta)
    }

    /// Synchronous read. `meta_only` skips materialization
    /// entirely, returning just the resolved shape.
    #[instrument(skip(self, slice))]
    pub fn read(
        &self,
        dataset: &str,
        value_type: ValueType,
        slice: &[SliceArg],
        meta_only: bool,
        trace_id: u64,
    ) -> Result<ReadInfo> {
        let meta = self.resolve_meta(dataset)?;
        if meta_only {
            let mut shape = [0u64; MAX_NDIMS];
            shape[..meta.ndims].copy_from_slice(&meta.dimensions[..meta.ndims]);
            let elements: u64 = if meta.ndims == 0 {
                1
            } else {
                shape[..meta.ndims].iter().product()
            };
            return Ok(ReadInfo {
                elements: elements as usize,
                shape,
                data: None,
            });
        }

        let layout = self.layout()?;
        let info = run_request(&self.io, layout, &meta, slice, value_type)?;
        Ok(ReadInfo {
            elements: info.elements,
            shape: info.shape,
            data: Some(info.data),
        })
    }

    /// Non-blocking submission. Returns `None` if the
    /// pool has no workers or its queue is closed — the caller then falls
    /// back to `read` if it still wants the data.
    pub fn readp(
        &self,
        dataset: &str,
        value_type: ValueType,
        slice: &[SliceArg],
    ) -> Result<Option<Arc<Future>>> {
        let meta = self.resolve_meta(dataset)?;
        let layout = self.layout()?;

        let guard = POOL.lock().unwrap();
        match guard.as_ref() {
            Some(pool) => Ok(pool.submit(self.io.clone(), layout, meta, slice.to_vec(), value_type)),
            None => {
                warn!("readp called with no reader pool initialized");
                Err(H5CoroError::QueueClosed)
            }
        }
    }
}

/// Convenience re-export of the wait outcome for callers holding a
/// `Future` returned by [`Context::readp`].
pub fn wait(future: &Future, timeout: Duration) -> WaitStatus {
    future.wait(timeout)
}
