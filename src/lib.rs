//! Cloud-native HDF5 reader: parses the HDF5 binary format on demand
//! against remote or local storage, without ever reading the whole file.
//!
//! The public surface is [`api::Context`] plus the free functions
//! [`api::init`]/[`api::deinit`]/[`api::wait`]. Everything under [`h5`]
//! understands the on-disk byte layout; everything under [`io`] is the
//! storage/caching substrate that layer reads through.

pub mod api;
pub mod config;
pub mod error;
pub mod future;
pub mod h5;
pub mod io;
pub mod pool;
pub mod value_type;

pub use api::{init, init_from_env, deinit, new_trace_id, wait, Context, ReadInfo};
pub use config::Config;
pub use error::{H5CoroError, Result};
pub use future::{Future, FutureData, FutureInfo, WaitStatus};
pub use h5::materializer::SliceArg;
pub use io::driver::{IoDriver, LocalFileDriver};
pub use io::mem::MemDriver;
pub use value_type::ValueType;
