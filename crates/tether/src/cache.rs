use ahash::AHashMap;

use crate::{
    host::NodeKey,
    registry::{LiveRegistry, ProxyId},
};

/// Non-owning association from a node to its proxy.
///
/// The generation is captured when the entry is installed; a later lookup
/// that finds the slot dead or reused proves the proxy was destroyed without
/// erasing its entry.
#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    id: ProxyId,
    generation: u32,
}

/// Guarantees at most one proxy per live node.
///
/// The cache never owns proxies: ownership lives with the embedding
/// runtime's reference counts, and the destruction path erases the entry
/// synchronously before the proxy's slot can be reused. Reference equality
/// of proxies therefore coincides with node identity for every node wrapped
/// while its entry is live.
#[derive(Debug, Default)]
pub(crate) struct WrapperCache {
    entries: AHashMap<NodeKey, CacheEntry>,
}

impl WrapperCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the live proxy for `key`, if one exists.
    ///
    /// # Panics
    /// Panics when the entry points at a destroyed or recycled proxy slot.
    /// A stale entry is a dangling-wrapper bug, not a cache-efficiency
    /// issue: returning it would hand out freed memory.
    pub(crate) fn lookup(&self, key: NodeKey, registry: &LiveRegistry) -> Option<ProxyId> {
        let entry = self.entries.get(&key)?;
        assert!(
            registry.is_live(entry.id) && registry.generation(entry.id) == entry.generation,
            "WrapperCache::lookup: stale entry for a destroyed proxy"
        );
        Some(entry.id)
    }

    /// Installs the entry for a freshly constructed proxy.
    ///
    /// # Panics
    /// Panics if an entry for `key` already exists; `lookup` must have
    /// missed before construction.
    pub(crate) fn insert(&mut self, key: NodeKey, id: ProxyId, generation: u32) {
        let previous = self.entries.insert(key, CacheEntry { id, generation });
        assert!(previous.is_none(), "WrapperCache::insert: entry already present for node");
    }

    /// Erases the entry for a dying proxy.
    ///
    /// # Panics
    /// Panics if no entry exists or the entry names a different proxy; either
    /// means the destruction path and the cache disagree about who wraps the
    /// node.
    pub(crate) fn remove(&mut self, key: NodeKey, id: ProxyId) {
        let entry = self
            .entries
            .remove(&key)
            .expect("WrapperCache::remove: no entry for dying proxy");
        assert_eq!(entry.id, id, "WrapperCache::remove: entry names a different proxy");
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
