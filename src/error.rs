use thiserror::Error;

/// Error taxonomy for the engine: format, resource, pipeline, and
/// concurrency/state errors all unwind to the nearest `read`/`readp` entry
/// point through this single type.
#[derive(Error, Debug)]
pub enum H5CoroError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad magic number in {0}")]
    BadMagic(&'static str),

    #[error("unsupported version {version} for {what}")]
    UnsupportedVersion { what: &'static str, version: u32 },

    #[error("unsupported {0}")]
    Unsupported(&'static str),

    #[error("parse error: {0}")]
    Parse(&'static str),

    #[error("short read: requested {requested} bytes at offset {offset}, driver returned {got}")]
    ShortRead {
        offset: u64,
        requested: usize,
        got: usize,
    },

    #[error("invalid hyperslice: {0}")]
    InvalidHyperslice(&'static str),

    #[error("dataset not found: {0}")]
    NotFound(String),

    #[error("metadata URL too long for {0}")]
    UrlTooLong(String),

    #[error("inflate failed: {0}")]
    Inflate(String),

    #[error("shuffle element size {0} out of range [1, 8]")]
    BadShuffleSize(usize),

    #[error("unsupported coercion from datatype {0:?} to {1:?}")]
    UnsupportedCoercion(crate::h5::dataset::TypeClass, crate::ValueType),

    #[error("request queue closed")]
    QueueClosed,

    #[error("operation stopped")]
    Stopped,
}

pub type Result<T> = std::result::Result<T, H5CoroError>;
