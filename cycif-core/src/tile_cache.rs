//! Bounded tile cache with insertion-order eviction.
//!
//! The cache is purely reactive: the deep-zoom viewer tells us when a tile has
//! been decoded (`tile_loaded`) and when it has dropped one (`tile_unloaded`).
//! Nothing here prefetches.
//!
//! Eviction is FIFO over insertion order, not LRU. Reads never refresh an
//! entry's position, so a tile that is read every frame is still evicted once
//! `capacity` newer tiles have arrived after it.
//!
//! Readers get an `Rc` snapshot of the bitmap. An entry can disappear between
//! a presence check and a later read, so callers must treat `None` as normal.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::rc::Rc;
use crate::error::Result;
use crate::tile::{TileAddress, TileBitmap};

/// Default entry cap, matching the viewer's own image cache size.
pub const DEFAULT_CAPACITY: usize = 150;

pub struct FifoCache<K, V> {
    entries: HashMap<K, V>,
    /// Insertion order: front = oldest.
    order: VecDeque<K>,
    capacity: usize,
}

impl<K: Eq + Hash + Clone, V: Clone> FifoCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: HashMap::with_capacity(capacity + 1),
            order: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Store `value`, evicting the oldest entries once over capacity.
    ///
    /// Re-inserting a key replaces its value and counts as a fresh insertion.
    /// Returns the keys evicted to make room.
    pub fn put(&mut self, key: K, value: V) -> Vec<K> {
        if self.entries.insert(key.clone(), value).is_some() {
            self.order.retain(|k| k != &key);
        }
        self.order.push_back(key);

        let mut evicted = Vec::new();
        while self.order.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else { break };
            self.entries.remove(&oldest);
            evicted.push(oldest);
        }
        evicted
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).cloned()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Drop an entry. Absent keys are ignored.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.order.retain(|k| k != key);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

pub type TileCache = FifoCache<TileAddress, Rc<TileBitmap>>;

impl FifoCache<TileAddress, Rc<TileBitmap>> {
    /// Viewer notification: a tile finished downloading. Decodes the PNG
    /// payload and stores it.
    pub fn tile_loaded(&mut self, address: TileAddress, payload: &[u8]) -> Result<()> {
        let bitmap = TileBitmap::decode_png(payload)?;
        let evicted = self.put(address, Rc::new(bitmap));
        for key in evicted {
            log::debug!("tile cache evicted {key}");
        }
        Ok(())
    }

    /// Viewer notification: the viewer dropped a tile.
    pub fn tile_unloaded(&mut self, address: &TileAddress) {
        self.remove(address);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(i: usize) -> TileAddress {
        TileAddress::parse(&format!("/t/DNA_files/0/{i}_0.png")).unwrap()
    }

    fn bitmap(v: u8) -> Rc<TileBitmap> {
        Rc::new(TileBitmap::new(1, 1, vec![v, v, v, 255]).unwrap())
    }

    #[test]
    fn test_k_plus_one_evicts_first() {
        let k = 5;
        let mut cache = TileCache::new(k);
        for i in 0..=k {
            cache.put(addr(i), bitmap(i as u8));
        }
        assert!(cache.get(&addr(0)).is_none());
        for i in 1..=k {
            assert_eq!(cache.get(&addr(i)).unwrap().pixels[0], i as u8);
        }
        assert_eq!(cache.len(), k);
    }

    #[test]
    fn test_reads_do_not_refresh_order() {
        let mut cache = FifoCache::new(2);
        cache.put("a", 1);
        cache.put("b", 2);
        // LRU would now keep "a"; FIFO must not.
        assert_eq!(cache.get(&"a"), Some(1));
        let evicted = cache.put("c", 3);
        assert_eq!(evicted, vec!["a"]);
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.get(&"b"), Some(2));
    }

    #[test]
    fn test_reinsert_counts_as_new() {
        let mut cache = FifoCache::new(2);
        cache.put("a", 1);
        cache.put("b", 2);
        cache.put("a", 10);
        assert_eq!(cache.len(), 2);
        let evicted = cache.put("c", 3);
        assert_eq!(evicted, vec!["b"]);
        assert_eq!(cache.get(&"a"), Some(10));
    }

    #[test]
    fn test_remove_frees_a_slot() {
        let mut cache = FifoCache::new(2);
        cache.put("a", 1);
        cache.put("b", 2);
        assert_eq!(cache.remove(&"a"), Some(1));
        assert_eq!(cache.remove(&"a"), None);
        assert!(cache.put("c", 3).is_empty());
        assert_eq!(cache.get(&"b"), Some(2));
        assert_eq!(cache.get(&"c"), Some(3));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut cache = FifoCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.put(1, 1);
        cache.put(2, 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&2));
    }

    #[test]
    fn test_snapshot_survives_eviction() {
        let mut cache = TileCache::new(1);
        cache.put(addr(0), bitmap(42));
        let snapshot = cache.get(&addr(0)).unwrap();
        cache.put(addr(1), bitmap(1));
        assert!(!cache.contains(&addr(0)));
        assert_eq!(snapshot.pixels[0], 42);
    }

    #[test]
    fn test_tile_events() {
        let mut payload = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut payload, 1, 1);
            encoder.set_color(png::ColorType::Rgba);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header().unwrap();
            writer.write_image_data(&[0, 1, 2, 255]).unwrap();
        }
        let mut cache = TileCache::new(4);
        cache.tile_loaded(addr(3), &payload).unwrap();
        assert_eq!(cache.get(&addr(3)).unwrap().pixels, vec![0, 1, 2, 255]);
        assert!(cache.tile_loaded(addr(4), b"junk").is_err());
        assert!(!cache.contains(&addr(4)));
        cache.tile_unloaded(&addr(3));
        assert!(cache.is_empty());
    }
}
