use std::cell::Cell;

use crate::{host::NodeKey, typemeta::ProxyTypeId};

/// Identifier of a live proxy slot in the registry.
///
/// Slot 0 is the permanent sentinel, so real proxies always have a nonzero
/// index. Identity is only meaningful while the proxy is tracked; the slot's
/// generation counter distinguishes reuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct ProxyId(u32);

impl ProxyId {
    /// Returns the raw slot index.
    #[must_use]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// The data a proxy carries: which node it wraps and which proxy type
/// selects its mark behavior.
///
/// Both fields are fixed at construction; a payload is always complete
/// before its slot is linked into the live list, so a mark walk can run at
/// any point after `track` returns.
#[derive(Debug, Clone, Copy)]
pub struct ProxyPayload {
    pub node: NodeKey,
    pub type_id: ProxyTypeId,
}

/// Sentinel slot index anchoring the circular list.
const SENTINEL: u32 = 0;

/// Link value installed by `untrack` to catch use-after-untrack.
const POISONED: u32 = u32::MAX;

#[derive(Debug)]
struct Slot {
    prev: u32,
    next: u32,
    /// External references held by the embedding runtime. Interior
    /// mutability so `inc_ref` works under a shared borrow.
    refcount: Cell<usize>,
    payload: Option<ProxyPayload>,
}

/// The set of all currently live proxies, in insertion order.
///
/// An array-backed rendition of the classic intrusive doubly linked list:
/// slots live in a free-listed vector, the `prev`/`next` links are slot
/// indices, and slot 0 is a permanent sentinel whose links are never
/// poisoned. Every live proxy is reachable by walking `next` links from the
/// sentinel back to itself exactly once.
///
/// `track` and `untrack` are the only mutators. Both take `&mut self` while
/// a [`Self::for_each_live`] walk holds `&self`, so mutating the registry
/// from inside the host collector's mark phase does not compile.
#[derive(Debug)]
pub struct LiveRegistry {
    slots: Vec<Slot>,
    /// Per-slot reuse counters; bumped when a freed slot is reallocated.
    generations: Vec<u32>,
    free_list: Vec<ProxyId>,
    live: usize,
}

impl Default for LiveRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveRegistry {
    /// Creates a registry containing only the sentinel.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: vec![Slot {
                prev: SENTINEL,
                next: SENTINEL,
                refcount: Cell::new(0),
                payload: None,
            }],
            generations: vec![0],
            free_list: Vec::new(),
            live: 0,
        }
    }

    /// Tracks a fully initialized proxy, linking it at the tail of the live
    /// list (immediately before the sentinel). The new proxy starts with one
    /// external reference.
    pub fn track(&mut self, payload: ProxyPayload) -> ProxyId {
        let id = if let Some(id) = self.free_list.pop() {
            let index = id.index();
            self.generations[index] = self.generations[index].wrapping_add(1);
            let slot = &mut self.slots[index];
            debug_assert!(slot.payload.is_none(), "LiveRegistry::track: free slot still occupied");
            slot.refcount.set(1);
            slot.payload = Some(payload);
            id
        } else {
            let id = ProxyId(u32::try_from(self.slots.len()).expect("LiveRegistry::track: slot index overflow"));
            self.slots.push(Slot {
                prev: POISONED,
                next: POISONED,
                refcount: Cell::new(1),
                payload: Some(payload),
            });
            self.generations.push(0);
            id
        };

        // Link at the end of the list, immediately before the sentinel.
        let tail = self.slots[SENTINEL as usize].prev;
        self.slots[tail as usize].next = id.0;
        self.slots[id.index()].prev = tail;
        self.slots[id.index()].next = SENTINEL;
        self.slots[SENTINEL as usize].prev = id.0;

        self.live += 1;
        id
    }

    /// Unlinks a proxy whose last external reference is gone, poisoning its
    /// links and recycling its slot.
    ///
    /// Returns the payload the proxy carried.
    ///
    /// # Panics
    /// Panics if the proxy still has external references (marking a
    /// half-destroyed proxy is undefined, so this fails fast) or if it was
    /// already untracked.
    pub fn untrack(&mut self, id: ProxyId) -> ProxyPayload {
        let slot = self.slots.get(id.index()).expect("LiveRegistry::untrack: slot missing");
        assert!(slot.payload.is_some(), "LiveRegistry::untrack: proxy already untracked");
        assert_eq!(
            slot.refcount.get(),
            0,
            "LiveRegistry::untrack: proxy still has external references"
        );
        assert!(
            slot.prev != POISONED && slot.next != POISONED,
            "LiveRegistry::untrack: proxy links already poisoned"
        );

        let (prev, next) = (slot.prev, slot.next);
        self.slots[prev as usize].next = next;
        self.slots[next as usize].prev = prev;

        let slot = &mut self.slots[id.index()];
        slot.prev = POISONED;
        slot.next = POISONED;
        let payload = slot.payload.take().expect("LiveRegistry::untrack: proxy already untracked");

        self.free_list.push(id);
        self.live -= 1;
        payload
    }

    /// Bumps a live proxy's external reference count.
    ///
    /// # Panics
    /// Panics if the proxy is not live.
    pub fn inc_ref(&self, id: ProxyId) {
        let slot = self.slots.get(id.index()).expect("LiveRegistry::inc_ref: slot missing");
        assert!(slot.payload.is_some(), "LiveRegistry::inc_ref: proxy already freed");
        slot.refcount.set(slot.refcount.get() + 1);
    }

    /// Drops one external reference and returns the remaining count.
    ///
    /// Hitting zero does not untrack: the caller must erase its cache entry
    /// first, then call [`Self::untrack`], so no observer can see a cache
    /// entry for an unlinked proxy.
    ///
    /// # Panics
    /// Panics if the proxy is not live or its count is already zero.
    pub fn dec_ref(&mut self, id: ProxyId) -> usize {
        let slot = self.slots.get(id.index()).expect("LiveRegistry::dec_ref: slot missing");
        assert!(slot.payload.is_some(), "LiveRegistry::dec_ref: proxy already freed");
        let count = slot.refcount.get();
        assert!(count > 0, "LiveRegistry::dec_ref: refcount already zero");
        slot.refcount.set(count - 1);
        count - 1
    }

    /// Returns a live proxy's external reference count.
    ///
    /// # Panics
    /// Panics if the proxy is not live.
    #[must_use]
    pub fn refcount(&self, id: ProxyId) -> usize {
        let slot = self.slots.get(id.index()).expect("LiveRegistry::refcount: slot missing");
        assert!(slot.payload.is_some(), "LiveRegistry::refcount: proxy already freed");
        slot.refcount.get()
    }

    /// Returns the payload of a live proxy.
    ///
    /// # Panics
    /// Panics if the proxy is not live.
    #[must_use]
    pub fn get(&self, id: ProxyId) -> &ProxyPayload {
        self.slots
            .get(id.index())
            .expect("LiveRegistry::get: slot missing")
            .payload
            .as_ref()
            .expect("LiveRegistry::get: proxy already freed")
    }

    /// Returns `true` if `id` names a currently tracked proxy.
    #[must_use]
    pub fn is_live(&self, id: ProxyId) -> bool {
        self.slots.get(id.index()).is_some_and(|slot| slot.payload.is_some())
    }

    /// Returns the reuse generation of `id`'s slot.
    #[must_use]
    pub fn generation(&self, id: ProxyId) -> u32 {
        self.generations.get(id.index()).copied().unwrap_or(0)
    }

    /// Visits every live proxy once, in insertion order.
    ///
    /// This is the walk the host collector's root hook runs during its mark
    /// phase. The walk borrows the registry shared, so it is read-only by
    /// construction.
    pub fn for_each_live(&self, mut visit: impl FnMut(ProxyId, &ProxyPayload)) {
        let mut index = self.slots[SENTINEL as usize].next;
        while index != SENTINEL {
            let slot = &self.slots[index as usize];
            let payload = slot
                .payload
                .as_ref()
                .expect("LiveRegistry::for_each_live: freed proxy still linked");
            visit(ProxyId(index), payload);
            index = slot.next;
        }
    }

    /// Number of currently tracked proxies.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Number of recycled slots available for reuse.
    #[must_use]
    pub fn free_slot_count(&self) -> usize {
        self.free_list.len()
    }

    /// Total slot count, excluding the sentinel.
    #[must_use]
    pub fn total_slot_count(&self) -> usize {
        self.slots.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        host::NodeKey,
        typemeta::{BuiltinTypes, TypeTable},
    };

    use super::*;

    fn payload(raw: u32) -> ProxyPayload {
        let mut table = TypeTable::new();
        let builtins = BuiltinTypes::register_into(&mut table);
        ProxyPayload {
            node: NodeKey::new(raw),
            type_id: builtins.node,
        }
    }

    fn visit_order(registry: &LiveRegistry) -> Vec<ProxyId> {
        let mut seen = Vec::new();
        registry.for_each_live(|id, _| seen.push(id));
        seen
    }

    #[test]
    fn walk_visits_in_insertion_order() {
        let mut registry = LiveRegistry::new();
        let a = registry.track(payload(10));
        let b = registry.track(payload(11));
        let c = registry.track(payload(12));
        assert_eq!(visit_order(&registry), vec![a, b, c]);

        // Removing from the middle preserves the order of the rest.
        registry.dec_ref(b);
        registry.untrack(b);
        assert_eq!(visit_order(&registry), vec![a, c]);

        // A reused slot re-enters at the tail, not at its old position.
        let d = registry.track(payload(13));
        assert_eq!(d.raw(), b.raw());
        assert_eq!(visit_order(&registry), vec![a, c, d]);
    }

    #[test]
    fn slot_reuse_bumps_generation() {
        let mut registry = LiveRegistry::new();
        let a = registry.track(payload(10));
        let gen_before = registry.generation(a);
        registry.dec_ref(a);
        registry.untrack(a);

        let b = registry.track(payload(11));
        assert_eq!(b.raw(), a.raw());
        assert_eq!(registry.generation(b), gen_before + 1);
    }

    #[test]
    fn empty_registry_walk_visits_nothing() {
        let registry = LiveRegistry::new();
        assert!(visit_order(&registry).is_empty());
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    #[should_panic(expected = "proxy still has external references")]
    fn untrack_with_live_references_is_fatal() {
        let mut registry = LiveRegistry::new();
        let a = registry.track(payload(10));
        registry.untrack(a);
    }

    #[test]
    #[should_panic(expected = "proxy already untracked")]
    fn double_untrack_is_fatal() {
        let mut registry = LiveRegistry::new();
        let a = registry.track(payload(10));
        registry.dec_ref(a);
        registry.untrack(a);
        registry.untrack(a);
    }
}
