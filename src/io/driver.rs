use crate::error::{H5CoroError, Result};

/// One operation: read a byte range from an opaque resource.
///
/// Implementations are synchronous and blocking, thread-safe across
/// concurrent calls on the same instance (one instance is shared by every
/// worker thread operating on a [`crate::h5::context::Context`]), and expose
/// no seek state — every read carries its own absolute offset.
///
/// A short read (fewer bytes returned than requested) is not itself an
/// error at this layer; [`crate::io::cache::ByteRangeCache::request`]
/// surfaces it as [`H5CoroError::ShortRead`].
pub trait IoDriver: Send + Sync {
    /// Read up to `dst.len()` bytes starting at `offset`, returning the
    /// number of bytes actually read.
    fn read(&self, dst: &mut [u8], offset: u64) -> Result<usize>;
}

/// Lets a boxed, type-erased driver be wrapped by another `IoDriver` (e.g.
/// [`crate::io::instrumented::InstrumentedDriver`]) without callers needing
/// to know the concrete type behind the box.
impl IoDriver for Box<dyn IoDriver> {
    fn read(&self, dst: &mut [u8], offset: u64) -> Result<usize> {
        (**self).read(dst, offset)
    }
}

/// Default driver: a local file opened read-only, read through platform
/// positional-read APIs so no seek state needs to be tracked and the file
/// handle can be shared across threads without a lock.
pub struct LocalFileDriver {
    file: std::fs::File,
}

impl LocalFileDriver {
    pub fn open(path: &str) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Ok(Self { file })
    }
}

#[cfg(unix)]
impl IoDriver for LocalFileDriver {
    fn read(&self, dst: &mut [u8], offset: u64) -> Result<usize> {
        use std::os::unix::fs::FileExt;
        // read_at returns Ok(0) at EOF rather than an error; short reads are
        // valid responses the caller (the cache) interprets itself.
        let mut total = 0usize;
        loop {
            match self.file.read_at(&mut dst[total..], offset + total as u64) {
                Ok(0) => return Ok(total),
                Ok(n) => {
                    total += n;
                    if total == dst.len() {
                        return Ok(total);
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(H5CoroError::Io(e)),
            }
        }
    }
}

#[cfg(windows)]
impl IoDriver for LocalFileDriver {
    fn read(&self, dst: &mut [u8], offset: u64) -> Result<usize> {
        use std::os::windows::fs::FileExt;
        let mut total = 0usize;
        loop {
            match self.file.seek_read(&mut dst[total..], offset + total as u64) {
                Ok(0) => return Ok(total),
                Ok(n) => {
                    total += n;
                    if total == dst.len() {
                        return Ok(total);
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(H5CoroError::Io(e)),
            }
        }
    }
}
