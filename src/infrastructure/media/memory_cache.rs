//! Cost-bounded in-memory media store.

use std::time::{Duration, Instant};

use image::DynamicImage;
use lru::LruCache;
use tracing::{debug, trace};

use crate::domain::entities::{Fingerprint, MediaBitmap, MediaCategory};

/// Default budget: 200 MB of decoded pixels.
pub const DEFAULT_BUDGET_KB: u64 = 200 * 1024;

/// Estimated resident size of a decoded image in KB, never below 1.
#[must_use]
pub fn estimate_cost_kb(image: &DynamicImage) -> u64 {
    let bits = u64::from(image.color().bits_per_pixel());
    let bytes = u64::from(image.width()) * u64::from(image.height()) * bits / 8;
    (bytes / 1024).max(1)
}

/// A resident bitmap with its bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    bitmap: MediaBitmap,
    category: MediaCategory,
    cost_kb: u64,
    last_access: Instant,
    access_count: u64,
}

impl CacheEntry {
    fn new(bitmap: MediaBitmap, category: MediaCategory) -> Self {
        let cost_kb = estimate_cost_kb(bitmap.image());
        Self {
            bitmap,
            category,
            cost_kb,
            last_access: Instant::now(),
            access_count: 0,
        }
    }

    fn touch(&mut self) {
        self.last_access = Instant::now();
        self.access_count += 1;
    }

    /// Cached bitmap.
    #[must_use]
    pub fn bitmap(&self) -> &MediaBitmap {
        &self.bitmap
    }

    /// Category the bitmap was rendered for.
    #[must_use]
    pub const fn category(&self) -> MediaCategory {
        self.category
    }

    /// Estimated cost in KB.
    #[must_use]
    pub const fn cost_kb(&self) -> u64 {
        self.cost_kb
    }

    /// Last time the entry was inserted or read.
    #[must_use]
    pub const fn last_access(&self) -> Instant {
        self.last_access
    }

    /// Number of hits since insertion.
    #[must_use]
    pub const fn access_count(&self) -> u64 {
        self.access_count
    }
}

/// Key to bitmap map bounded by the summed cost of its entries.
///
/// Not synchronized; the manager keeps it under the same lock as its
/// in-flight bookkeeping.
#[derive(Debug)]
pub struct MediaStore {
    entries: LruCache<Fingerprint, CacheEntry>,
    used_kb: u64,
    budget_kb: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl MediaStore {
    /// Creates an empty store with the given budget.
    #[must_use]
    pub fn new(budget_kb: u64) -> Self {
        Self {
            entries: LruCache::unbounded(),
            used_kb: 0,
            budget_kb: budget_kb.max(1),
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Looks up an entry, refreshing its recency and access count.
    pub fn get(&mut self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        if let Some(entry) = self.entries.get_mut(fingerprint) {
            entry.touch();
            self.hits += 1;
            trace!(fingerprint = %fingerprint, count = entry.access_count, "Cache hit");
            Some(entry.clone())
        } else {
            self.misses += 1;
            trace!(fingerprint = %fingerprint, "Cache miss");
            None
        }
    }

    /// Looks up an entry without touching recency or statistics.
    #[must_use]
    pub fn peek(&self, fingerprint: &Fingerprint) -> Option<&CacheEntry> {
        self.entries.peek(fingerprint)
    }

    /// Returns true if the fingerprint is resident.
    #[must_use]
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.entries.contains(fingerprint)
    }

    /// Inserts a bitmap, evicting least recently used entries to fit the budget.
    ///
    /// Returns the number of evicted entries.
    pub fn put(
        &mut self,
        fingerprint: Fingerprint,
        bitmap: MediaBitmap,
        category: MediaCategory,
    ) -> usize {
        let entry = CacheEntry::new(bitmap, category);
        debug!(
            fingerprint = %fingerprint,
            category = %category,
            cost_kb = entry.cost_kb,
            "Storing media in cache"
        );
        self.used_kb += entry.cost_kb;
        if let Some(old) = self.entries.put(fingerprint, entry) {
            self.used_kb -= old.cost_kb;
        }
        self.evict_to_budget()
    }

    /// Removes an entry, returning it if present.
    pub fn remove(&mut self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        let entry = self.entries.pop(fingerprint)?;
        self.used_kb -= entry.cost_kb;
        debug!(fingerprint = %fingerprint, "Removed media from cache");
        Some(entry)
    }

    /// Drops every entry. Statistics are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.used_kb = 0;
    }

    /// Changes the budget, evicting immediately if usage now exceeds it.
    ///
    /// Returns the number of evicted entries.
    pub fn set_budget(&mut self, budget_kb: u64) -> usize {
        self.budget_kb = budget_kb.max(1);
        self.evict_to_budget()
    }

    /// Removes entries idle for longer than `max_age`.
    pub fn sweep_expired(&mut self, max_age: Duration) -> usize {
        match Instant::now().checked_sub(max_age) {
            Some(cutoff) => self.sweep_expired_before(cutoff),
            None => 0,
        }
    }

    /// Removes entries whose last access is strictly older than `cutoff`.
    pub fn sweep_expired_before(&mut self, cutoff: Instant) -> usize {
        let stale: Vec<Fingerprint> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.last_access < cutoff)
            .map(|(fingerprint, _)| fingerprint.clone())
            .collect();

        for fingerprint in &stale {
            if let Some(entry) = self.entries.pop(fingerprint) {
                self.used_kb -= entry.cost_kb;
            }
        }
        if !stale.is_empty() {
            debug!(removed = stale.len(), remaining = self.entries.len(), "Swept idle media");
        }
        stale.len()
    }

    fn evict_to_budget(&mut self) -> usize {
        let mut evicted = 0;
        while self.used_kb > self.budget_kb && self.entries.len() > 1 {
            let Some((fingerprint, entry)) = self.entries.pop_lru() else {
                break;
            };
            self.used_kb -= entry.cost_kb;
            evicted += 1;
            trace!(fingerprint = %fingerprint, cost_kb = entry.cost_kb, "Evicted media");
        }
        if evicted > 0 {
            self.evictions += evicted as u64;
            debug!(evicted, used_kb = self.used_kb, budget_kb = self.budget_kb, "Cache over budget");
        }
        evicted
    }

    /// Number of resident entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is resident.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Summed cost of resident entries.
    #[must_use]
    pub const fn used_kb(&self) -> u64 {
        self.used_kb
    }

    /// Current budget.
    #[must_use]
    pub const fn budget_kb(&self) -> u64 {
        self.budget_kb
    }

    /// Returns cache statistics.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStats {
        let total = self.hits + self.misses;
        let hit_rate = if total > 0 {
            (self.hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            hit_rate,
            entries: self.entries.len(),
            used_kb: self.used_kb,
            budget_kb: self.budget_kb,
            evictions: self.evictions,
        }
    }
}

impl Default for MediaStore {
    fn default() -> Self {
        Self::new(DEFAULT_BUDGET_KB)
    }
}

/// Statistics about cache performance.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Hit rate as a percentage.
    pub hit_rate: f64,
    /// Current number of resident entries.
    pub entries: usize,
    /// Summed cost of resident entries in KB.
    pub used_kb: u64,
    /// Configured budget in KB.
    pub budget_kb: u64,
    /// Entries evicted for budget since creation.
    pub evictions: u64,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache: {} entries, {}/{} KB, {:.1}% hit rate ({} hits, {} misses, {} evictions)",
            self.entries,
            self.used_kb,
            self.budget_kb,
            self.hit_rate,
            self.hits,
            self.misses,
            self.evictions
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use crate::domain::entities::MediaSize;
    use image::{GrayImage, RgbImage};
    use test_case::test_case;

    fn fp(name: &str) -> Fingerprint {
        Fingerprint::build(
            Path::new(name),
            MediaSize::square(64),
            MediaCategory::Avatar,
            0,
            None,
        )
    }

    /// RGBA bitmap costing exactly `kb` KB.
    fn bitmap_kb(kb: u32) -> MediaBitmap {
        MediaBitmap::new(DynamicImage::new_rgba8(256, kb))
    }

    #[test_case(DynamicImage::new_rgba8(1024, 1024), 4096 ; "rgba8_1024")]
    #[test_case(DynamicImage::ImageRgb8(RgbImage::new(1024, 1024)), 3072 ; "rgb8_1024")]
    #[test_case(DynamicImage::ImageLuma8(GrayImage::new(2048, 512)), 1024 ; "luma8")]
    #[test_case(DynamicImage::new_rgba8(10, 10), 1 ; "tiny_floor")]
    fn test_cost_estimate(image: DynamicImage, expected: u64) {
        assert_eq!(estimate_cost_kb(&image), expected);
    }

    #[test]
    fn test_get_refreshes_access() {
        let mut store = MediaStore::new(1024);
        store.put(fp("a"), bitmap_kb(4), MediaCategory::Avatar);

        let first = store.get(&fp("a")).unwrap();
        let second = store.get(&fp("a")).unwrap();
        assert_eq!(first.access_count(), 1);
        assert_eq!(second.access_count(), 2);
        assert!(second.last_access() >= first.last_access());
        assert!(store.get(&fp("b")).is_none());

        let stats = store.stats();
        assert_eq!((stats.hits, stats.misses), (2, 1));
    }

    #[test]
    fn test_peek_does_not_count() {
        let mut store = MediaStore::new(1024);
        store.put(fp("a"), bitmap_kb(4), MediaCategory::Avatar);
        assert_eq!(store.peek(&fp("a")).unwrap().access_count(), 0);
        assert_eq!(store.stats().hits, 0);
    }

    #[test]
    fn test_budget_evicts_least_recently_used() {
        let mut store = MediaStore::new(100);
        store.put(fp("a"), bitmap_kb(40), MediaCategory::Avatar);
        store.put(fp("b"), bitmap_kb(40), MediaCategory::Avatar);
        store.get(&fp("a"));

        let evicted = store.put(fp("c"), bitmap_kb(40), MediaCategory::Avatar);
        assert_eq!(evicted, 1);
        assert!(store.contains(&fp("a")));
        assert!(!store.contains(&fp("b")));
        assert!(store.contains(&fp("c")));
        assert_eq!(store.used_kb(), 80);
        assert!(store.used_kb() <= store.budget_kb());
    }

    #[test]
    fn test_oversized_entry_is_kept_alone() {
        let mut store = MediaStore::new(10);
        store.put(fp("a"), bitmap_kb(8), MediaCategory::Avatar);
        store.put(fp("big"), bitmap_kb(40), MediaCategory::OriginalImage);
        assert_eq!(store.len(), 1);
        assert!(store.contains(&fp("big")));
    }

    #[test]
    fn test_replacing_entry_adjusts_usage() {
        let mut store = MediaStore::new(1024);
        store.put(fp("a"), bitmap_kb(40), MediaCategory::Avatar);
        store.put(fp("a"), bitmap_kb(8), MediaCategory::Avatar);
        assert_eq!(store.len(), 1);
        assert_eq!(store.used_kb(), 8);
    }

    #[test]
    fn test_set_budget_shrinks() {
        let mut store = MediaStore::new(1024);
        for name in ["a", "b", "c", "d"] {
            store.put(fp(name), bitmap_kb(40), MediaCategory::Avatar);
        }
        assert_eq!(store.set_budget(80), 2);
        assert_eq!(store.len(), 2);
        assert!(store.contains(&fp("d")));
        assert_eq!(store.stats().evictions, 2);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut store = MediaStore::new(1024);
        store.put(fp("a"), bitmap_kb(40), MediaCategory::Avatar);
        store.put(fp("b"), bitmap_kb(40), MediaCategory::Avatar);

        assert!(store.remove(&fp("a")).is_some());
        assert!(store.remove(&fp("a")).is_none());
        assert_eq!(store.used_kb(), 40);

        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.used_kb(), 0);
    }

    #[test]
    fn test_sweep_removes_only_idle_entries() {
        let mut store = MediaStore::new(1024);
        store.put(fp("old"), bitmap_kb(4), MediaCategory::Avatar);
        let cutoff = Instant::now() + Duration::from_millis(1);
        std::thread::sleep(Duration::from_millis(5));
        store.put(fp("fresh"), bitmap_kb(4), MediaCategory::Avatar);

        assert_eq!(store.sweep_expired_before(cutoff), 1);
        assert!(!store.contains(&fp("old")));
        assert!(store.contains(&fp("fresh")));
        assert_eq!(store.used_kb(), 4);
    }

    #[test]
    fn test_sweep_with_long_max_age_keeps_everything() {
        let mut store = MediaStore::new(1024);
        store.put(fp("a"), bitmap_kb(4), MediaCategory::Avatar);
        assert_eq!(store.sweep_expired(Duration::from_secs(3600)), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_stats_display() {
        let store = MediaStore::new(2048);
        assert_eq!(
            store.stats().to_string(),
            "Cache: 0 entries, 0/2048 KB, 0.0% hit rate (0 hits, 0 misses, 0 evictions)"
        );
    }
}
