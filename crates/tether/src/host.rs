use smallvec::SmallVec;

use crate::error::BridgeError;

/// Identity of a node inside the host arena.
///
/// The moral equivalent of the node's address: a slot index plus the slot's
/// generation at allocation time. A reclaimed and reallocated slot carries a
/// bumped generation, so the replacement node gets a different key and a
/// stale key can never alias it. Two keys are equal iff they denote the same
/// node at the same point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct NodeKey {
    index: u32,
    generation: u32,
}

impl NodeKey {
    /// Creates a first-generation key for a raw slot index.
    #[must_use]
    pub fn new(raw: u32) -> Self {
        Self { index: raw, generation: 0 }
    }

    /// Returns the raw slot index.
    #[must_use]
    pub fn raw(self) -> u32 {
        self.index
    }

    #[inline]
    fn index(self) -> usize {
        self.index as usize
    }
}

/// Possibly-null reference to a host node.
///
/// The null reference is a defined input to [`Bridge::wrap`](crate::Bridge::wrap)
/// and the designated terminator of next-pointer chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct NodeRef(Option<NodeKey>);

impl NodeRef {
    /// The null reference ("no node").
    pub const NULL: Self = Self(None);

    /// Wraps a key into a non-null reference.
    #[must_use]
    pub fn some(key: NodeKey) -> Self {
        Self(Some(key))
    }

    /// Returns the key, or `None` for the null reference.
    #[must_use]
    pub fn key(self) -> Option<NodeKey> {
        self.0
    }

    /// Returns `true` for the null reference.
    #[must_use]
    pub fn is_null(self) -> bool {
        self.0.is_none()
    }
}

/// IR node payloads owned by the host arena.
///
/// A deliberately small slice of a compiler's tree grammar: constants,
/// declarations chained through `chain`, and purpose/value list cells.
/// `Opaque` stands in for node kinds the bridge has no wrapper type for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    /// An integer constant node.
    IntCst(i64),
    /// A string literal node.
    StrCst(Box<str>),
    /// A variable declaration, chained to the next declaration in its scope.
    VarDecl { name: Box<str>, chain: NodeRef },
    /// A function declaration, chained like `VarDecl`.
    FnDecl { name: Box<str>, chain: NodeRef },
    /// A purpose/value list cell, the classic singly linked tree list.
    TreeList { purpose: NodeRef, value: NodeRef, chain: NodeRef },
    /// A node kind with no wrapper type; wrapping it is a typed failure.
    Opaque,
}

impl NodeData {
    /// Returns the node kind as a static string slice.
    ///
    /// Used by [`BridgeStats`](crate::BridgeStats) breakdowns and by
    /// classification error messages.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::IntCst(_) => "IntCst",
            Self::StrCst(_) => "StrCst",
            Self::VarDecl { .. } => "VarDecl",
            Self::FnDecl { .. } => "FnDecl",
            Self::TreeList { .. } => "TreeList",
            Self::Opaque => "Opaque",
        }
    }

    /// Returns this node's `chain` successor, or null for unchained kinds.
    #[must_use]
    pub fn chain(&self) -> NodeRef {
        match self {
            Self::VarDecl { chain, .. } | Self::FnDecl { chain, .. } | Self::TreeList { chain, .. } => *chain,
            Self::IntCst(_) | Self::StrCst(_) | Self::Opaque => NodeRef::NULL,
        }
    }

    /// Pushes the keys of every node this node references onto `work`.
    fn push_edges(&self, work: &mut SmallVec<[NodeKey; 8]>) {
        match self {
            Self::IntCst(_) | Self::StrCst(_) | Self::Opaque => {}
            Self::VarDecl { chain, .. } | Self::FnDecl { chain, .. } => {
                if let Some(key) = chain.key() {
                    work.push(key);
                }
            }
            Self::TreeList { purpose, value, chain } => {
                for edge in [purpose, value, chain] {
                    if let Some(key) = edge.key() {
                        work.push(key);
                    }
                }
            }
        }
    }
}

/// Mark-sweep arena standing in for the host compiler's own collector.
///
/// Nodes live in a free-listed slot vector; a collection cycle clears all
/// mark bits, asks the registered root hook to mark every node reachable
/// from a live proxy (transitively, via [`MarkPhase::mark_node`]), then
/// sweeps unmarked slots back onto the free list.
#[derive(Debug)]
pub struct HostHeap {
    entries: Vec<Option<NodeData>>,
    marks: Vec<bool>,
    /// Per-slot generation, bumped when a freed slot is reallocated.
    generations: Vec<u32>,
    /// Indices of freed slots available for reuse.
    free_list: Vec<u32>,
    /// Maximum number of live nodes, if limited.
    node_limit: Option<usize>,
    live_nodes: usize,
    /// Allocations since the last collection, for collection pressure.
    allocations_since_collect: u32,
    root_hook_registered: bool,
}

impl Default for HostHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl HostHeap {
    /// Creates an unlimited host arena.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            marks: Vec::new(),
            generations: Vec::new(),
            free_list: Vec::new(),
            node_limit: None,
            live_nodes: 0,
            allocations_since_collect: 0,
            root_hook_registered: false,
        }
    }

    /// Creates an arena that refuses to hold more than `limit` live nodes.
    #[must_use]
    pub fn with_node_limit(limit: usize) -> Self {
        Self {
            node_limit: Some(limit),
            ..Self::new()
        }
    }

    /// Registers the collector's root-scanning hook.
    ///
    /// Happens exactly once per arena lifetime; the bridge performs the call
    /// at construction time.
    ///
    /// # Panics
    /// Panics on a second registration.
    pub fn register_root_hook(&mut self) {
        assert!(
            !self.root_hook_registered,
            "HostHeap::register_root_hook: root hook already registered"
        );
        self.root_hook_registered = true;
    }

    /// Returns `true` once the root hook has been registered.
    #[must_use]
    pub fn root_hook_registered(&self) -> bool {
        self.root_hook_registered
    }

    /// Allocates a node, reusing a freed slot when one is available.
    ///
    /// Returns `Err(BridgeError::Allocation)` when a node limit is configured
    /// and reached.
    pub fn alloc(&mut self, data: NodeData) -> Result<NodeKey, BridgeError> {
        if let Some(limit) = self.node_limit
            && self.live_nodes >= limit
        {
            return Err(BridgeError::Allocation {
                limit,
                count: self.live_nodes,
            });
        }

        let key = if let Some(index) = self.free_list.pop() {
            let slot = index as usize;
            self.generations[slot] += 1;
            self.entries[slot] = Some(data);
            NodeKey {
                index,
                generation: self.generations[slot],
            }
        } else {
            let index = u32::try_from(self.entries.len()).expect("HostHeap::alloc: slot index overflow");
            self.entries.push(Some(data));
            self.marks.push(false);
            self.generations.push(0);
            NodeKey { index, generation: 0 }
        };
        self.live_nodes += 1;
        self.allocations_since_collect = self.allocations_since_collect.wrapping_add(1);
        Ok(key)
    }

    /// Returns `true` while `key`'s slot is on the generation the key was
    /// issued for.
    fn key_is_current(&self, key: NodeKey) -> bool {
        self.generations.get(key.index()).copied() == Some(key.generation)
    }

    /// Returns the node stored at `key`.
    ///
    /// # Panics
    /// Panics if the node has been swept, or if the key is stale because its
    /// slot was reallocated to a newer node.
    #[must_use]
    pub fn get(&self, key: NodeKey) -> &NodeData {
        assert!(self.key_is_current(key), "HostHeap::get: stale node key");
        self.entries[key.index()].as_ref().expect("HostHeap::get: node already swept")
    }

    /// Returns `true` if `key` still denotes a live node.
    #[must_use]
    pub fn is_live(&self, key: NodeKey) -> bool {
        self.key_is_current(key) && self.entries[key.index()].is_some()
    }

    /// Returns `true` if the node at `key` was marked by the last mark phase.
    #[must_use]
    pub fn is_marked(&self, key: NodeKey) -> bool {
        self.is_live(key) && self.marks[key.index()]
    }

    /// Number of live nodes in the arena.
    #[must_use]
    pub fn live_node_count(&self) -> usize {
        self.live_nodes
    }

    /// Number of allocations since the last collection.
    #[must_use]
    pub fn allocations_since_collect(&self) -> u32 {
        self.allocations_since_collect
    }

    /// Begins a collection cycle: clears every mark bit and hands out the
    /// mark phase through which roots are reported.
    pub fn begin_mark(&mut self) -> MarkPhase<'_> {
        for mark in &mut self.marks {
            *mark = false;
        }
        MarkPhase { heap: self }
    }

    /// Sweeps every unmarked node back onto the free list.
    ///
    /// Completes the cycle started by [`Self::begin_mark`]; mark bits of
    /// surviving nodes stay set until the next cycle so callers can observe
    /// which nodes the mark phase reached.
    pub fn sweep(&mut self) {
        for (index, entry) in self.entries.iter_mut().enumerate() {
            if self.marks[index] || entry.is_none() {
                continue;
            }
            *entry = None;
            self.free_list
                .push(u32::try_from(index).expect("HostHeap::sweep: slot index overflow"));
            self.live_nodes -= 1;
        }
        self.allocations_since_collect = 0;
    }
}

/// Write handle for the mark phase of a collection cycle.
///
/// Mark callbacks receive only this handle, so they can mark nodes but
/// cannot reach back into the registry or cache while a walk is in progress.
#[derive(Debug)]
pub struct MarkPhase<'a> {
    heap: &'a mut HostHeap,
}

impl MarkPhase<'_> {
    /// Marks `key` and everything transitively reachable from it.
    ///
    /// # Panics
    /// Panics when asked to mark a swept node or through a stale key: a
    /// proxy or edge holding a key to a reclaimed node means something
    /// failed to keep it alive.
    pub fn mark_node(&mut self, key: NodeKey) {
        let mut work: SmallVec<[NodeKey; 8]> = SmallVec::new();
        work.push(key);
        while let Some(key) = work.pop() {
            let index = key.index();
            assert_eq!(
                self.heap.generations.get(index).copied(),
                Some(key.generation),
                "MarkPhase::mark_node: stale node key"
            );
            if self.heap.marks[index] {
                continue;
            }
            let data = self.heap.entries[index]
                .as_ref()
                .expect("MarkPhase::mark_node: node already swept");
            self.heap.marks[index] = true;
            data.push_edges(&mut work);
        }
    }
}
