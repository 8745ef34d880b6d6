//! CSV I/O-trace decorator: wraps any [`IoDriver`] and logs every read's
//! offset/length to a CSV file when `H5CORO_IO_LOG` is set, capped by an
//! optional operation-count limit.

use std::io::Write;
use std::sync::Mutex;

use crate::config::Config;
use crate::error::Result;
use crate::io::driver::IoDriver;

struct LogState {
    writer: std::io::BufWriter<std::fs::File>,
    remaining: usize,
}

/// Decorates `D` with a CSV trace of every `read` call.
pub struct InstrumentedDriver<D> {
    inner: D,
    log: Mutex<LogState>,
}

impl<D> InstrumentedDriver<D> {
    pub fn new(inner: D, log_path: &str, limit: usize) -> Result<Self> {
        let f = std::fs::File::create(log_path)?;
        let mut writer = std::io::BufWriter::new(f);
        writeln!(writer, "offset,len")?;
        Ok(Self {
            inner,
            log: Mutex::new(LogState { writer, remaining: limit }),
        })
    }

    fn log_read(&self, offset: u64, len: usize) {
        let mut state = self.log.lock().unwrap();
        if state.remaining == 0 {
            return;
        }
        let _ = writeln!(state.writer, "{offset},{len}");
        state.remaining -= 1;
    }
}

impl<D: IoDriver> IoDriver for InstrumentedDriver<D> {
    fn read(&self, dst: &mut [u8], offset: u64) -> Result<usize> {
        self.log_read(offset, dst.len());
        self.inner.read(dst, offset)
    }
}

/// Wrap `driver` in [`InstrumentedDriver`] iff `H5CORO_IO_LOG` is set.
/// Returns the driver untouched (boxed) when tracing is off.
pub fn maybe_instrumented<D: IoDriver + 'static>(driver: D) -> Result<Box<dyn IoDriver>> {
    let cfg = Config::from_env();
    match cfg.io_log {
        Some(path) => Ok(Box::new(InstrumentedDriver::new(driver, &path, cfg.io_log_limit)?)),
        None => Ok(Box::new(driver)),
    }
}
