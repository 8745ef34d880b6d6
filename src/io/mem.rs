use crate::error::Result;
use crate::io::driver::IoDriver;

/// In-memory resource, useful for tests and for embedding small HDF5 blobs
/// without touching a filesystem. Alongside the POSIX-equivalent
/// ([`crate::io::driver::LocalFileDriver`]), this is the other driver shape
/// that ships in the core; an S3 driver is an external collaborator.
pub struct MemDriver {
    bytes: Vec<u8>,
}

impl MemDriver {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

impl IoDriver for MemDriver {
    fn read(&self, dst: &mut [u8], offset: u64) -> Result<usize> {
        let offset = offset as usize;
        if offset >= self.bytes.len() {
            return Ok(0);
        }
        let available = &self.bytes[offset..];
        let n = dst.len().min(available.len());
        dst[..n].copy_from_slice(&available[..n]);
        Ok(n)
    }
}
