use std::fmt;

/// Error returned when a bridge operation cannot complete.
///
/// Only recoverable failures are surfaced here: allocation limits and nodes
/// the bridge cannot classify. Invariant violations (stale cache entries,
/// untracking a referenced proxy, mutating the registry during a mark walk)
/// panic instead, because continuing would let the host collector free
/// memory still reachable from the embedding runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// Maximum number of live nodes or proxies exceeded.
    Allocation { limit: usize, count: usize },
    /// The node's kind has no registered wrapper type.
    UnclassifiableNode { kind: &'static str },
    /// A chain traversal revisited a node, so the chain is cyclic.
    CyclicChain { raw: u32 },
    /// The shipped GC self-test observed a broken invariant.
    SelftestFailed(&'static str),
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allocation { limit, count } => {
                write!(f, "allocation limit exceeded: {count} >= {limit}")
            }
            Self::UnclassifiableNode { kind } => {
                write!(f, "no wrapper type registered for node kind {kind}")
            }
            Self::CyclicChain { raw } => {
                write!(f, "chain cycles back to node slot {raw}")
            }
            Self::SelftestFailed(msg) => {
                write!(f, "gc selftest failed: {msg}")
            }
        }
    }
}

impl std::error::Error for BridgeError {}
