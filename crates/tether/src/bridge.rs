use std::{collections::BTreeMap, fmt};

use crate::{
    cache::WrapperCache,
    error::BridgeError,
    host::{HostHeap, NodeData, NodeKey, NodeRef},
    registry::{LiveRegistry, ProxyId, ProxyPayload},
    typemeta::{BuiltinTypes, MarkFn, ProxyTypeId, TypeTable},
};

/// A scripting-visible handle to a wrapped node, or the canonical "no node"
/// value.
///
/// Handles are explicitly reference counted through the bridge:
/// [`Wrapped::clone_with_bridge`] takes a new reference and
/// [`Wrapped::drop_with_bridge`] releases one. Dropping the last reference
/// erases the proxy's cache entry and unlinks it from the live registry
/// synchronously, before the slot can be reused.
#[derive(Debug, PartialEq, Eq)]
pub enum Wrapped {
    /// The canonical empty value, returned when wrapping the null reference.
    None,
    /// A counted reference to a live proxy.
    Proxy(ProxyId),
}

impl Wrapped {
    /// Returns the proxy id, or `None` for the empty value.
    #[must_use]
    pub fn proxy_id(&self) -> Option<ProxyId> {
        match self {
            Self::None => None,
            Self::Proxy(id) => Some(*id),
        }
    }

    /// Takes an additional reference to the same proxy.
    #[must_use]
    pub fn clone_with_bridge(&self, bridge: &Bridge) -> Self {
        match self {
            Self::None => Self::None,
            Self::Proxy(id) => {
                bridge.registry.inc_ref(*id);
                Self::Proxy(*id)
            }
        }
    }

    /// Releases this reference. On the last release the proxy's cache entry
    /// is erased and the proxy is untracked, in that order.
    #[cfg(not(feature = "handle-leak-panic"))]
    pub fn drop_with_bridge(self, bridge: &mut Bridge) {
        if let Self::Proxy(id) = self {
            bridge.release(id);
        }
    }

    /// Releases this reference. On the last release the proxy's cache entry
    /// is erased and the proxy is untracked, in that order.
    #[cfg(feature = "handle-leak-panic")]
    pub fn drop_with_bridge(self, bridge: &mut Bridge) {
        if let Self::Proxy(id) = &self {
            bridge.release(*id);
        }
        // The leak check must not fire for a handle released properly.
        std::mem::forget(self);
    }
}

#[cfg(feature = "handle-leak-panic")]
impl Drop for Wrapped {
    fn drop(&mut self) {
        if let Self::Proxy(id) = self {
            panic!("proxy handle for slot {} dropped without drop_with_bridge", id.raw());
        }
    }
}

/// Tuning knobs for a bridge instance.
#[derive(Debug, Clone, Copy)]
pub struct BridgeConfig {
    /// Maximum live nodes in the host arena, if limited.
    pub node_limit: Option<usize>,
    /// Maximum live proxies, if limited.
    pub proxy_limit: Option<usize>,
    /// Host allocations between automatic collections; 0 disables them.
    pub collect_every: u32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            node_limit: None,
            proxy_limit: None,
            collect_every: 64,
        }
    }
}

/// The cross-runtime wrapping and cooperative-GC bridge.
///
/// Owns the four cooperating parts: the host arena (with its collector), the
/// live-proxy registry the collector scans as roots, the wrapper cache that
/// keeps proxies unique per node, and the proxy type table that resolves
/// each proxy's mark callback. One bridge exists per embedded plugin; it
/// registers the host root hook exactly once, at construction.
#[derive(Debug)]
pub struct Bridge {
    host: HostHeap,
    registry: LiveRegistry,
    cache: WrapperCache,
    types: TypeTable,
    builtins: BuiltinTypes,
    proxy_limit: Option<usize>,
    collect_every: u32,
    /// Proxy constructions performed on cache misses.
    constructions: u64,
    /// Completed collection cycles.
    collections: u64,
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new()
    }
}

impl Bridge {
    /// Creates a bridge over a fresh, unlimited host arena.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BridgeConfig::default())
    }

    /// Creates a bridge with explicit limits and collection pressure.
    #[must_use]
    pub fn with_config(config: BridgeConfig) -> Self {
        let host = match config.node_limit {
            Some(limit) => HostHeap::with_node_limit(limit),
            None => HostHeap::new(),
        };
        Self::with_host(host, config)
    }

    /// Creates a bridge over an existing host arena.
    ///
    /// # Panics
    /// Panics if the arena's root hook is already registered: the hook is
    /// registered exactly once per process lifetime, here.
    #[must_use]
    pub fn with_host(mut host: HostHeap, config: BridgeConfig) -> Self {
        host.register_root_hook();
        let mut types = TypeTable::new();
        let builtins = BuiltinTypes::register_into(&mut types);
        Self {
            host,
            registry: LiveRegistry::new(),
            cache: WrapperCache::new(),
            types,
            builtins,
            proxy_limit: config.proxy_limit,
            collect_every: config.collect_every,
            constructions: 0,
            collections: 0,
        }
    }

    /// Read access to the host arena.
    #[must_use]
    pub fn host(&self) -> &HostHeap {
        &self.host
    }

    /// Read access to the live registry.
    #[must_use]
    pub fn registry(&self) -> &LiveRegistry {
        &self.registry
    }

    /// Read access to the proxy type table.
    #[must_use]
    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    /// Ids of the statically registered proxy types.
    #[must_use]
    pub fn builtin_types(&self) -> &BuiltinTypes {
        &self.builtins
    }

    /// Allocates a node in the host arena.
    ///
    /// Like any host allocation point, this may trigger a collection first,
    /// so nodes not yet protected by a proxy may be swept here.
    pub fn alloc_node(&mut self, data: NodeData) -> Result<NodeKey, BridgeError> {
        self.maybe_collect();
        self.host.alloc(data)
    }

    /// Wraps a node, returning the unique proxy for it.
    ///
    /// The null reference wraps to [`Wrapped::None`] without allocating. For
    /// any other node, a cache hit returns the existing proxy with one more
    /// reference; a miss classifies the node, constructs and tracks a new
    /// proxy, and installs its cache entry. On failure nothing is installed
    /// and nothing is linked.
    pub fn wrap(&mut self, node: NodeRef) -> Result<Wrapped, BridgeError> {
        let Some(key) = node.key() else {
            return Ok(Wrapped::None);
        };

        if let Some(id) = self.cache.lookup(key, &self.registry) {
            self.registry.inc_ref(id);
            return Ok(Wrapped::Proxy(id));
        }

        let type_id = self.classify(key)?;
        self.construct(key, type_id)
    }

    /// Wraps a node as an explicit proxy type.
    ///
    /// The route taken when the embedding runtime instantiates a derived
    /// wrapper type: classification is skipped and `type_id` is used
    /// directly. A cache hit still wins: the existing proxy (and its type)
    /// is returned, preserving one-proxy-per-node.
    ///
    /// # Panics
    /// Panics on an unknown `type_id`.
    pub fn wrap_as(&mut self, node: NodeRef, type_id: ProxyTypeId) -> Result<Wrapped, BridgeError> {
        let Some(key) = node.key() else {
            return Ok(Wrapped::None);
        };

        if let Some(id) = self.cache.lookup(key, &self.registry) {
            self.registry.inc_ref(id);
            return Ok(Wrapped::Proxy(id));
        }

        // Validates the type id before any state changes.
        let _ = self.types.mark_fn(type_id);
        self.construct(key, type_id)
    }

    /// Constructs, tracks, and caches a new proxy for `key`.
    fn construct(&mut self, key: NodeKey, type_id: ProxyTypeId) -> Result<Wrapped, BridgeError> {
        if let Some(limit) = self.proxy_limit
            && self.registry.live_count() >= limit
        {
            return Err(BridgeError::Allocation {
                limit,
                count: self.registry.live_count(),
            });
        }

        // The payload is complete before track links the slot, so a mark
        // walk is safe from the moment the proxy becomes visible.
        let id = self.registry.track(ProxyPayload { node: key, type_id });
        self.cache.insert(key, id, self.registry.generation(id));
        self.constructions += 1;
        Ok(Wrapped::Proxy(id))
    }

    /// Resolves which proxy type wraps the node at `key`.
    fn classify(&self, key: NodeKey) -> Result<ProxyTypeId, BridgeError> {
        let data = self.host.get(key);
        match data {
            NodeData::IntCst(_) => Ok(self.builtins.int_cst),
            NodeData::StrCst(_) => Ok(self.builtins.str_cst),
            NodeData::VarDecl { .. } => Ok(self.builtins.var_decl),
            NodeData::FnDecl { .. } => Ok(self.builtins.fn_decl),
            NodeData::TreeList { .. } => Ok(self.builtins.tree_list),
            NodeData::Opaque => Err(BridgeError::UnclassifiableNode {
                kind: data.kind_name(),
            }),
        }
    }

    /// Drops one reference to `id`, destroying the proxy at zero.
    fn release(&mut self, id: ProxyId) {
        if self.registry.dec_ref(id) == 0 {
            // Erase the cache entry before unlinking so no lookup between
            // the two can observe a dead proxy.
            let node = self.registry.get(id).node;
            self.cache.remove(node, id);
            self.registry.untrack(id);
        }
    }

    /// Registers a new proxy type; `None` for `mark` inherits the base's
    /// resolved callback.
    pub fn register_proxy_type(&mut self, name: &str, base: Option<ProxyTypeId>, mark: Option<MarkFn>) -> ProxyTypeId {
        self.types.register(name, base, mark)
    }

    /// Derives a proxy subtype, inheriting the base's mark callback; the
    /// path taken when the embedding runtime subclasses a wrapper type.
    pub fn derive_proxy_type(&mut self, name: &str, base: ProxyTypeId) -> ProxyTypeId {
        self.types.derive(name, base)
    }

    /// Forces a full host collection cycle.
    ///
    /// Runs the root hook: walks every live proxy in the registry and
    /// invokes its type's resolved mark callback, then sweeps the arena.
    ///
    /// # Panics
    /// Panics if the root hook was never registered.
    pub fn force_collect(&mut self) {
        assert!(
            self.host.root_hook_registered(),
            "Bridge::force_collect: host root hook not registered"
        );
        let mut phase = self.host.begin_mark();
        self.registry.for_each_live(|_, payload| {
            let mark = self.types.mark_fn(payload.type_id);
            mark(&mut phase, payload.node);
        });
        drop(phase);
        self.host.sweep();
        self.collections += 1;
    }

    /// Collects when allocation pressure has built up.
    fn maybe_collect(&mut self) {
        if self.collect_every > 0 && self.host.allocations_since_collect() >= self.collect_every {
            self.force_collect();
        }
    }

    /// Number of proxies constructed on cache misses.
    #[must_use]
    pub fn construction_count(&self) -> u64 {
        self.constructions
    }

    /// Number of completed collection cycles.
    #[must_use]
    pub fn collection_count(&self) -> u64 {
        self.collections
    }

    /// Snapshot of the bridge's current state.
    #[must_use]
    pub fn stats(&self) -> BridgeStats {
        let mut proxies_by_type: BTreeMap<String, usize> = BTreeMap::new();
        self.registry.for_each_live(|_, payload| {
            *proxies_by_type.entry(self.types.name(payload.type_id).to_owned()).or_insert(0) += 1;
        });
        BridgeStats {
            live_proxies: self.registry.live_count(),
            free_slots: self.registry.free_slot_count(),
            total_slots: self.registry.total_slot_count(),
            cache_entries: self.cache.len(),
            live_nodes: self.host.live_node_count(),
            collections: self.collections,
            proxies_by_type,
        }
    }
}

/// Snapshot of bridge state at a point in time.
///
/// Captures proxy and node counts plus a per-type breakdown, suitable for
/// monitoring growth and comparing states via [`BridgeStats::diff`]. The
/// `proxies_by_type` map uses `BTreeMap` for deterministic iteration order.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BridgeStats {
    /// Number of currently tracked proxies.
    pub live_proxies: usize,
    /// Number of recycled registry slots available for reuse.
    pub free_slots: usize,
    /// Total registry capacity (live + free), excluding the sentinel.
    pub total_slots: usize,
    /// Entries in the wrapper cache; equals `live_proxies` when the bridge
    /// is healthy.
    pub cache_entries: usize,
    /// Live nodes in the host arena.
    pub live_nodes: usize,
    /// Collection cycles completed so far.
    pub collections: u64,
    /// Breakdown of live proxies by proxy type name.
    pub proxies_by_type: BTreeMap<String, usize>,
}

impl BridgeStats {
    /// Computes the difference between `self` ("before") and `other`
    /// ("after"). Positive deltas indicate growth.
    #[must_use]
    pub fn diff(&self, other: &Self) -> BridgeStatsDiff {
        let (proxies_by_type_delta, new_types, removed_types) =
            compute_type_deltas(&self.proxies_by_type, &other.proxies_by_type);
        BridgeStatsDiff {
            live_proxies_delta: isize_delta(self.live_proxies, other.live_proxies),
            free_slots_delta: isize_delta(self.free_slots, other.free_slots),
            total_slots_delta: isize_delta(self.total_slots, other.total_slots),
            cache_entries_delta: isize_delta(self.cache_entries, other.cache_entries),
            live_nodes_delta: isize_delta(self.live_nodes, other.live_nodes),
            proxies_by_type_delta,
            new_types,
            removed_types,
        }
    }
}

/// Difference between two bridge snapshots.
///
/// Only types present in at least one snapshot appear in
/// `proxies_by_type_delta`; types exclusive to the "after" snapshot are in
/// `new_types`, to the "before" snapshot in `removed_types`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BridgeStatsDiff {
    pub live_proxies_delta: isize,
    pub free_slots_delta: isize,
    pub total_slots_delta: isize,
    pub cache_entries_delta: isize,
    pub live_nodes_delta: isize,
    /// Per-type deltas; positive means more proxies of that type.
    pub proxies_by_type_delta: BTreeMap<String, isize>,
    pub new_types: Vec<String>,
    pub removed_types: Vec<String>,
}

impl BridgeStatsDiff {
    /// Returns `true` when nothing changed between the two snapshots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live_proxies_delta == 0
            && self.free_slots_delta == 0
            && self.total_slots_delta == 0
            && self.cache_entries_delta == 0
            && self.live_nodes_delta == 0
            && self.new_types.is_empty()
            && self.removed_types.is_empty()
            && self.proxies_by_type_delta.values().all(|&v| v == 0)
    }
}

impl fmt::Display for BridgeStatsDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "BridgeDiff: no changes");
        }

        write!(
            f,
            "BridgeDiff: {:+} live proxies, {:+} live nodes",
            self.live_proxies_delta, self.live_nodes_delta
        )?;

        for (type_name, &delta) in &self.proxies_by_type_delta {
            if delta != 0 {
                write!(f, "\n  {type_name}: {delta:+}")?;
            }
        }
        if !self.new_types.is_empty() {
            write!(f, "\n  New types: {}", self.new_types.join(", "))?;
        }
        if !self.removed_types.is_empty() {
            write!(f, "\n  Removed types: {}", self.removed_types.join(", "))?;
        }
        if self.cache_entries_delta != 0 {
            write!(f, "\n  Cache entries: {:+}", self.cache_entries_delta)?;
        }
        Ok(())
    }
}

/// Computes `after - before` as `isize`.
fn isize_delta(before: usize, after: usize) -> isize {
    (after as isize).wrapping_sub(before as isize)
}

/// Computes per-type deltas plus the lists of new and removed types.
fn compute_type_deltas(
    before: &BTreeMap<String, usize>,
    after: &BTreeMap<String, usize>,
) -> (BTreeMap<String, isize>, Vec<String>, Vec<String>) {
    let mut deltas = BTreeMap::new();
    let mut new_types = Vec::new();
    let mut removed_types = Vec::new();

    for (type_name, &count) in before {
        let after_count = after.get(type_name).copied().unwrap_or(0);
        deltas.insert(type_name.clone(), isize_delta(count, after_count));
        if !after.contains_key(type_name) {
            removed_types.push(type_name.clone());
        }
    }
    for (type_name, &count) in after {
        if !before.contains_key(type_name) {
            deltas.insert(type_name.clone(), count as isize);
            new_types.push(type_name.clone());
        }
    }

    (deltas, new_types, removed_types)
}
