//! HDF5 format parsing and dataset materialization: everything that
//! understands the on-disk byte layout, built on top of [`crate::io`].

pub mod btree1;
pub mod btree2;
pub mod codec;
pub mod coercion;
pub mod context;
pub mod dataset;
pub mod filters;
pub mod heap;
pub mod materializer;
pub mod metadata_repo;
pub mod objheader;
pub mod slicecopy;
pub mod superblock;
