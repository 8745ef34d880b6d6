//! Process-wide metadata repository: a `(resource, dataset) → DatasetMeta`
//! cache shared across every open [`crate::h5::context::Context`]. Keys on
//! a fixed-width `"<basename>/<dataset>"` string and evicts the oldest
//! entry once full.

use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use crate::error::{H5CoroError, Result};
use crate::h5::dataset::DatasetMeta;

/// Fixed-width name buffer size, a multiple of 8.
pub const MAX_META_NAME_SIZE: usize = 104;
pub const MAX_META_STORE: usize = 150_000;

fn build_key(resource: &str, dataset: &str) -> Result<(String, u64)> {
    let url = format!("{resource}/{dataset}");
    if url.len() > MAX_META_NAME_SIZE {
        return Err(H5CoroError::UrlTooLong(url));
    }
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    url.hash(&mut hasher);
    Ok((url, hasher.finish()))
}

struct Inner {
    entries: HashMap<u64, DatasetMeta>,
    insertion_order: VecDeque<u64>,
}

/// Shared cache of parsed dataset metadata, keyed by `hash("<resource>/<dataset>")`.
pub struct MetadataRepo {
    inner: Mutex<Inner>,
}

impl Default for MetadataRepo {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataRepo {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                insertion_order: VecDeque::new(),
            }),
        }
    }

    /// Return a clone of the cached entry for `(resource, dataset)`, if any.
    pub fn get(&self, resource: &str, dataset: &str) -> Result<Option<DatasetMeta>> {
        let (_, key) = build_key(resource, dataset)?;
        let inner = self.inner.lock().unwrap();
        Ok(inner.entries.get(&key).cloned())
    }

    /// Insert (or overwrite) the entry for `(resource, dataset)`, evicting
    /// the oldest entry first if the table is at capacity.
    pub fn insert(&self, resource: &str, dataset: &str, meta: DatasetMeta) -> Result<()> {
        let (_, key) = build_key(resource, dataset)?;
        let mut inner = self.inner.lock().unwrap();
        if !inner.entries.contains_key(&key) && inner.entries.len() >= MAX_META_STORE {
            if let Some(oldest) = inner.insertion_order.pop_front() {
                inner.entries.remove(&oldest);
            }
        }
        if inner.entries.insert(key, meta).is_none() {
            inner.insertion_order.push_back(key);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::h5::dataset::DatasetMeta;

    #[test]
    fn insert_then_get_round_trips() {
        let repo = MetadataRepo::new();
        let meta = DatasetMeta {
            url: "file.h5/group/dset".into(),
            ..Default::default()
        };
        repo.insert("file.h5", "group/dset", meta.clone()).unwrap();
        let got = repo.get("file.h5", "group/dset").unwrap().unwrap();
        assert_eq!(got.url, meta.url);
    }

    #[test]
    fn rejects_url_longer_than_max_name_size() {
        let repo = MetadataRepo::new();
        let long_dataset = "d".repeat(MAX_META_NAME_SIZE);
        let result = repo.insert("file.h5", &long_dataset, DatasetMeta::default());
        assert!(result.is_err());
    }

    #[test]
    fn miss_returns_none() {
        let repo = MetadataRepo::new();
        assert!(repo.get("nope.h5", "nope").unwrap().is_none());
    }
}
