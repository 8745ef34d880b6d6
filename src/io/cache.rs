use std::collections::{BTreeMap, VecDeque};

/// L1 cache line size: 1 MiB.
pub const L1_LINESIZE: usize = 0x0010_0000;
/// Inverse mask used to align a file offset down to its L1 line.
pub const L1_MASK: u64 = 0x000F_FFFF;
/// L1 cache line count per context.
pub const L1_ENTRIES: usize = 157;

/// L2 cache line size: 128 MiB.
pub const L2_MASK: u64 = 0x07FF_FFFF;
/// L2 cache line count per context.
pub const L2_ENTRIES: usize = 17;

/// A cached byte range: `[pos, pos + data.len())` of the resource.
struct CacheEntry {
    pos: u64,
    data: Vec<u8>,
}

/// One level of the two-level cache: a FIFO-evicted map keyed by
/// cache-line-aligned file offset, supporting "nearest entry at or before a
/// given key" lookups so an unaligned request can be satisfied by the line
/// that contains it.
struct CacheLevel {
    entries: BTreeMap<u64, CacheEntry>,
    insertion_order: VecDeque<u64>,
    capacity: usize,
}

impl CacheLevel {
    fn new(capacity: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            insertion_order: VecDeque::new(),
            capacity,
        }
    }

    fn nearest_under(&self, key: u64) -> Option<&CacheEntry> {
        self.entries.range(..=key).next_back().map(|(_, e)| e)
    }

    fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Evict the oldest entry (FIFO), returning whether one was removed.
    fn evict_oldest(&mut self) -> bool {
        while let Some(key) = self.insertion_order.pop_front() {
            if self.entries.remove(&key).is_some() {
                return true;
            }
            // key was already removed (shouldn't happen, but stay robust)
        }
        false
    }

    /// Insert a freshly read entry at `pos`. Returns `false` (and drops the
    /// entry) if another thread already inserted the same key first — the
    /// caller simply discards the buffer it just read.
    fn insert(&mut self, pos: u64, data: Vec<u8>) -> bool {
        if self.entries.contains_key(&pos) {
            return false;
        }
        self.entries.insert(pos, CacheEntry { pos, data });
        self.insertion_order.push_back(pos);
        true
    }
}

/// Hit/miss/replacement/byte-count statistics, readable by callers.
#[derive(Debug, Default, Clone, Copy)]
pub struct CacheStats {
    pub cache_miss: u64,
    pub l1_cache_replace: u64,
    pub l2_cache_replace: u64,
    pub bytes_read: u64,
}

/// Two-level per-file byte-range cache. Holds no driver reference and
/// performs no I/O itself — [`crate::h5::context::Context`] owns the mutex
/// around an instance of this and performs the driver read outside the lock.
pub struct ByteRangeCache {
    l1: CacheLevel,
    l2: CacheLevel,
    pub stats: CacheStats,
}

impl Default for ByteRangeCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteRangeCache {
    pub fn new() -> Self {
        Self {
            l1: CacheLevel::new(L1_ENTRIES),
            l2: CacheLevel::new(L2_ENTRIES),
            stats: CacheStats::default(),
        }
    }

    fn line_aligned(pos: u64, mask: u64) -> u64 {
        pos & !mask
    }

    /// Check one level for an entry covering `[pos, pos+size)`, probing both
    /// the line at or before `pos` and the line before that (to tolerate a
    /// request that straddles a line boundary).
    fn check_level(level: &CacheLevel, pos: u64, size: usize, mask: u64) -> Option<(u64, usize)> {
        let aligned = Self::line_aligned(pos, mask);
        // `aligned - 1` can wrap at pos==0; the rollover guard below skips
        // the probe in that case.
        let prev_line_pos = aligned.wrapping_sub(1);
        let check_prev = pos > prev_line_pos;

        for candidate in [Some(pos), check_prev.then_some(prev_line_pos)]
            .into_iter()
            .flatten()
        {
            if let Some(entry) = level.nearest_under(candidate) {
                if pos >= entry.pos && (pos + size as u64) <= (entry.pos + entry.data.len() as u64)
                {
                    let offset_in_entry = (pos - entry.pos) as usize;
                    return Some((entry.pos, offset_in_entry));
                }
            }
        }
        None
    }

    /// Search L1 then L2 for an entry covering `[offset, offset+size)`.
    /// On hit, copies the covered bytes into `dst` and returns `true`.
    pub fn try_fulfill(&mut self, offset: u64, size: usize, dst: &mut [u8]) -> bool {
        if let Some((pos, within)) = Self::check_level(&self.l1, offset, size, L1_MASK) {
            let entry = &self.l1.entries[&pos];
            dst[..size].copy_from_slice(&entry.data[within..within + size]);
            return true;
        }
        if let Some((pos, within)) = Self::check_level(&self.l2, offset, size, L2_MASK) {
            let entry = &self.l2.entries[&pos];
            dst[..size].copy_from_slice(&entry.data[within..within + size]);
            return true;
        }
        self.stats.cache_miss += 1;
        false
    }

    /// Insert a just-read buffer. Selects L1 if it fits the L1 line size,
    /// else L2; evicts the oldest entry in the chosen level if full.
    pub fn insert(&mut self, pos: u64, data: Vec<u8>) {
        let len = data.len();
        self.stats.bytes_read += len as u64;
        let (level, replace_count) = if len <= L1_LINESIZE {
            (&mut self.l1, &mut self.stats.l1_cache_replace)
        } else {
            (&mut self.l2, &mut self.stats.l2_cache_replace)
        };
        if level.is_full() && level.evict_oldest() {
            *replace_count += 1;
        }
        level.insert(pos, data);
    }

    /// Record bytes read for an uncached (direct-to-caller-buffer) read.
    pub fn record_uncached_read(&mut self, len: usize) {
        self.stats.bytes_read += len as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_on_empty_cache_increments_stat() {
        let mut cache = ByteRangeCache::new();
        let mut dst = [0u8; 4];
        assert!(!cache.try_fulfill(0, 4, &mut dst));
        assert_eq!(cache.stats.cache_miss, 1);
    }

    #[test]
    fn hit_within_a_single_line_returns_cached_bytes() {
        let mut cache = ByteRangeCache::new();
        cache.insert(0, (0u8..16).collect());

        let mut dst = [0u8; 4];
        assert!(cache.try_fulfill(8, 4, &mut dst));
        assert_eq!(dst, [8, 9, 10, 11]);
    }

    #[test]
    fn request_straddling_a_line_boundary_is_satisfied_by_the_containing_line() {
        let mut cache = ByteRangeCache::new();
        cache.insert(0, (0u8..=255).cycle().take(L1_LINESIZE).collect());
        cache.insert(L1_LINESIZE as u64, vec![0xAAu8; 16]);

        let mut dst = [0u8; 4];
        let pos = L1_LINESIZE as u64 - 2;
        assert!(cache.try_fulfill(pos, 4, &mut dst));
    }

    #[test]
    fn small_entries_go_to_l1_and_large_entries_go_to_l2() {
        let mut cache = ByteRangeCache::new();
        cache.insert(0, vec![0u8; 16]);
        assert_eq!(cache.l1.entries.len(), 1);
        assert_eq!(cache.l2.entries.len(), 0);

        cache.insert(L1_LINESIZE as u64 * 4, vec![0u8; L1_LINESIZE + 1]);
        assert_eq!(cache.l1.entries.len(), 1);
        assert_eq!(cache.l2.entries.len(), 1);
    }

    #[test]
    fn l1_evicts_oldest_entry_once_full() {
        let mut cache = ByteRangeCache::new();
        for i in 0..L1_ENTRIES {
            cache.insert(i as u64 * L1_LINESIZE as u64, vec![0u8; 8]);
        }
        assert_eq!(cache.stats.l1_cache_replace, 0);

        cache.insert(L1_ENTRIES as u64 * L1_LINESIZE as u64, vec![0u8; 8]);
        assert_eq!(cache.stats.l1_cache_replace, 1);
        assert_eq!(cache.l1.entries.len(), L1_ENTRIES);

        let mut dst = [0u8; 8];
        assert!(!cache.try_fulfill(0, 8, &mut dst), "oldest line should have been evicted");
    }
}
