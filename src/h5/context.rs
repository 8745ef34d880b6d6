//! Per-open-file I/O context: owns a driver and the two-level byte-range
//! cache, and exposes the single `io_request` entry point every read goes
//! through. One mutex covers both cache levels and the running byte
//! counter; the driver read itself happens unlocked.

use std::sync::Mutex;

use crate::error::{H5CoroError, Result};
use crate::io::cache::{ByteRangeCache, CacheStats, L1_LINESIZE};
use crate::io::driver::IoDriver;

pub struct Context {
    driver: Box<dyn IoDriver>,
    cache: Mutex<ByteRangeCache>,
}

impl Context {
    pub fn new(driver: Box<dyn IoDriver>) -> Self {
        Self {
            driver,
            cache: Mutex::new(ByteRangeCache::new()),
        }
    }

    /// Read `size` bytes at `offset`.
    ///
    /// - `dst == Some(buf)` and `may_cache == false`: read straight into
    ///   `buf`, bypassing the cache entirely (used for the dataset's own
    ///   bulk data, which is rarely re-read).
    /// - `dst == Some(buf)` and `may_cache == true`: try the cache first;
    ///   on miss, read `max(size, hint)` bytes, cache them, then copy the
    ///   requested `size` bytes into `buf` (used for metadata reads, which
    ///   are small and often re-touched).
    /// - `dst == None`: a pure prefetch — read-ahead `hint` bytes and leave
    ///   them cached for a later request to find. Requires `may_cache`.
    pub fn io_request(
        &self,
        offset: u64,
        size: usize,
        dst: Option<&mut [u8]>,
        hint: usize,
        may_cache: bool,
    ) -> Result<()> {
        assert!(may_cache || dst.is_some(), "uncached prefetch is meaningless");

        if let Some(buf) = dst {
            if may_cache {
                let mut cache = self.cache.lock().unwrap();
                if cache.try_fulfill(offset, size, buf) {
                    return Ok(());
                }
                drop(cache);

                let read_size = size.max(hint);
                let mut tmp = vec![0u8; read_size];
                let got = self.driver.read(&mut tmp, offset)?;
                if got < size {
                    return Err(H5CoroError::ShortRead {
                        offset,
                        requested: size,
                        got,
                    });
                }
                buf.copy_from_slice(&tmp[..size]);
                tmp.truncate(got);

                let mut cache = self.cache.lock().unwrap();
                cache.insert(offset, tmp);
                Ok(())
            } else {
                let got = self.driver.read(buf, offset)?;
                if got < size {
                    return Err(H5CoroError::ShortRead {
                        offset,
                        requested: size,
                        got,
                    });
                }
                let mut cache = self.cache.lock().unwrap();
                cache.record_uncached_read(got);
                Ok(())
            }
        } else {
            // pure prefetch
            let read_size = hint.max(size);
            if read_size == 0 {
                return Ok(());
            }
            let mut tmp = vec![0u8; read_size];
            let got = self.driver.read(&mut tmp, offset)?;
            tmp.truncate(got);
            let mut cache = self.cache.lock().unwrap();
            cache.insert(offset, tmp);
            Ok(())
        }
    }

    /// Convenience wrapper matching `readByteArray`'s fixed read-ahead hint.
    pub fn read_bytes(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.io_request(offset, buf.len(), Some(buf), L1_LINESIZE, true)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.lock().unwrap().stats
    }
}
