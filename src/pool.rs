//! Request scheduler: a bounded queue of read requests drained by N worker
//! threads, each running the materializer synchronously and signaling its
//! request's [`Future`]. `readp` turns into a queued request a worker later
//! completes by calling the same code path as the synchronous `read`.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};

use crate::error::Result;
use crate::future::{Future, FutureData, FutureInfo};
use crate::h5::context::Context;
use crate::h5::coercion::{coerce, CoercedBuffer};
use crate::h5::dataset::DatasetMeta;
use crate::h5::materializer::{materialize, SliceArg};
use crate::h5::superblock::FileLayout;
use crate::ValueType;

const QUEUE_RECV_TIMEOUT: Duration = Duration::from_millis(100);

struct ReadRequest {
    ctx: Arc<Context>,
    layout: FileLayout,
    meta: DatasetMeta,
    slice: Vec<SliceArg>,
    value_type: ValueType,
    future: Arc<Future>,
}

/// Runs one request end to end: materialize, then apply C13 coercion —
/// the same tail every `read()` call (sync or pooled) goes through.
pub(crate) fn run_request(
    ctx: &Context,
    layout: FileLayout,
    meta: &DatasetMeta,
    slice: &[SliceArg],
    value_type: ValueType,
) -> Result<FutureInfo> {
    let materialized = materialize(ctx, layout, meta, slice)?;
    let elements = materialized.elements;
    let shape = materialized.shape;
    let coerced = coerce(
        value_type,
        materialized.buffer.to_vec(),
        meta.type_class,
        elements,
        meta.typesize,
        meta.signed_val,
    )?;

    let (data, elements) = match coerced {
        CoercedBuffer::Native(bytes) => (FutureData::Bytes(bytes), elements),
        CoercedBuffer::Integer(v) => {
            let n = v.len();
            (FutureData::Integer(v), n)
        }
        CoercedBuffer::Real(v) => {
            let n = v.len();
            (FutureData::Real(v), n)
        }
    };
    Ok(FutureInfo {
        data,
        elements,
        shape,
        value_type,
    })
}

/// A fixed-size worker pool draining a bounded `flume` queue. `N = 0`
/// disables async submission entirely.
pub struct Pool {
    sender: Option<flume::Sender<ReadRequest>>,
    workers: Vec<std::thread::JoinHandle<()>>,
    active: Arc<std::sync::atomic::AtomicBool>,
}

impl Pool {
    /// Spawn `num_threads` workers backed by a bounded queue (capacity
    /// chosen generously relative to worker count; back-pressure comes
    /// from `readp` observing a full queue, not from blocking here).
    pub fn new(num_threads: usize) -> Self {
        if num_threads == 0 {
            return Self {
                sender: None,
                workers: Vec::new(),
                active: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            };
        }

        let (tx, rx) = flume::bounded::<ReadRequest>(num_threads * 16);
        let active = Arc::new(std::sync::atomic::AtomicBool::new(true));
        let mut workers = Vec::with_capacity(num_threads);

        for _ in 0..num_threads {
            let rx = rx.clone();
            let active = active.clone();
            workers.push(std::thread::spawn(move || {
                while active.load(std::sync::atomic::Ordering::Acquire) {
                    match rx.recv_timeout(QUEUE_RECV_TIMEOUT) {
                        Ok(req) => {
                            match run_request(&req.ctx, req.layout, &req.meta, &req.slice, req.value_type) {
                                Ok(info) => req.future.finish_valid(info),
                                Err(e) => {
                                    error!(error = %e, "dataset read failed");
                                    req.future.finish_invalid();
                                }
                            }
                        }
                        Err(flume::RecvTimeoutError::Timeout) => continue,
                        Err(flume::RecvTimeoutError::Disconnected) => break,
                    }
                }
                // drain whatever is left so queued requests don't hang forever
                while let Ok(req) = rx.try_recv() {
                    match run_request(&req.ctx, req.layout, &req.meta, &req.slice, req.value_type) {
                        Ok(info) => req.future.finish_valid(info),
                        Err(_) => req.future.finish_invalid(),
                    }
                }
            }));
        }

        Self {
            sender: Some(tx),
            workers,
            active,
        }
    }

    /// Enqueue a request, returning its [`Future`] immediately. Returns
    /// `None` if the pool has no workers or the queue is disconnected.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn submit(
        &self,
        ctx: Arc<Context>,
        layout: FileLayout,
        meta: DatasetMeta,
        slice: Vec<SliceArg>,
        value_type: ValueType,
    ) -> Option<Arc<Future>> {
        let sender = self.sender.as_ref()?;
        let future = Arc::new(Future::new());
        let req = ReadRequest {
            ctx,
            layout,
            meta,
            slice,
            value_type,
            future: future.clone(),
        };
        if sender.send(req).is_err() {
            warn!("reader pool queue closed, dropping request");
            return None;
        }
        Some(future)
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.active.store(false, std::sync::atomic::Ordering::Release);
        self.sender = None;
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::h5::dataset::DatasetMeta;
    use crate::io::mem::MemDriver;
    use std::time::Duration;

    #[test]
    fn zero_thread_pool_refuses_every_submission() {
        let pool = Pool::new(0);
        let ctx = Arc::new(Context::new(Box::new(MemDriver::new(vec![0u8; 8]))));
        let layout = FileLayout {
            offset_size: 8,
            length_size: 8,
            root_group_address: 0,
            version: 2,
        };
        let got = pool.submit(ctx, layout, DatasetMeta::default(), Vec::new(), ValueType::Native);
        assert!(got.is_none());
    }

    #[test]
    fn submitted_request_completes_on_a_worker_thread() {
        let data = 7i32.to_le_bytes().to_vec();
        let meta = DatasetMeta {
            layout: crate::h5::dataset::Layout::Contiguous,
            type_class: crate::h5::dataset::TypeClass::FixedPoint,
            ndims: 0,
            elementsize: 4,
            typesize: 4,
            signed_val: true,
            address: 0,
            size: 4,
            ..Default::default()
        };
        let layout = FileLayout {
            offset_size: 8,
            length_size: 8,
            root_group_address: 0,
            version: 2,
        };
        let ctx = Arc::new(Context::new(Box::new(MemDriver::new(data))));
        let pool = Pool::new(1);

        let future = pool
            .submit(ctx, layout, meta, Vec::new(), ValueType::Native)
            .expect("pool with workers accepts the request");
        assert_eq!(future.wait(Duration::from_secs(5)), WaitStatus::Complete);
        let info = future.take().unwrap();
        assert_eq!(info.elements, 1);
    }
}
