use ahash::AHashSet;

use crate::{
    bridge::{Bridge, Wrapped},
    error::BridgeError,
    host::{NodeData, NodeKey, NodeRef},
};

/// Wraps every node of a next-pointer chain, in chain order.
///
/// Follows `chain` links from `head` to the null terminator, producing a
/// finite, non-lazy sequence; a chain that revisits a node is reported as
/// [`BridgeError::CyclicChain`] rather than followed forever. Each element
/// goes through the wrapper cache, so repeated traversal of the same chain
/// yields reference-identical proxies. On a mid-chain error the references
/// already taken are released and the error is returned.
pub fn list_from_chain(bridge: &mut Bridge, head: NodeRef) -> Result<Vec<Wrapped>, BridgeError> {
    let mut out = Vec::new();
    let mut seen: AHashSet<NodeKey> = AHashSet::new();
    let mut cursor = head;
    while let Some(key) = cursor.key() {
        if !seen.insert(key) {
            release_all(bridge, out);
            return Err(BridgeError::CyclicChain { raw: key.raw() });
        }
        let next = bridge.host().get(key).chain();
        match bridge.wrap(NodeRef::some(key)) {
            Ok(wrapped) => out.push(wrapped),
            Err(err) => {
                release_all(bridge, out);
                return Err(err);
            }
        }
        cursor = next;
    }
    Ok(out)
}

/// Wraps the purpose/value pairs of a tree-list chain.
///
/// Expects every chained node to be a `TreeList` cell; anything else is an
/// unclassifiable-node error, and a cyclic chain is a
/// [`BridgeError::CyclicChain`] error. Null purposes and values wrap to
/// [`Wrapped::None`].
pub fn pairs_from_tree_list(bridge: &mut Bridge, head: NodeRef) -> Result<Vec<(Wrapped, Wrapped)>, BridgeError> {
    let mut out = Vec::new();
    let mut seen: AHashSet<NodeKey> = AHashSet::new();
    let mut cursor = head;
    while let Some(key) = cursor.key() {
        if !seen.insert(key) {
            release_pairs(bridge, out);
            return Err(BridgeError::CyclicChain { raw: key.raw() });
        }
        let (purpose, value, next) = match bridge.host().get(key) {
            NodeData::TreeList { purpose, value, chain } => (*purpose, *value, *chain),
            other => {
                let err = BridgeError::UnclassifiableNode {
                    kind: other.kind_name(),
                };
                release_pairs(bridge, out);
                return Err(err);
            }
        };

        let purpose = match bridge.wrap(purpose) {
            Ok(wrapped) => wrapped,
            Err(err) => {
                release_pairs(bridge, out);
                return Err(err);
            }
        };
        let value = match bridge.wrap(value) {
            Ok(wrapped) => wrapped,
            Err(err) => {
                purpose.drop_with_bridge(bridge);
                release_pairs(bridge, out);
                return Err(err);
            }
        };
        out.push((purpose, value));
        cursor = next;
    }
    Ok(out)
}

fn release_all(bridge: &mut Bridge, wrapped: Vec<Wrapped>) {
    for item in wrapped {
        item.drop_with_bridge(bridge);
    }
}

fn release_pairs(bridge: &mut Bridge, pairs: Vec<(Wrapped, Wrapped)>) {
    for (purpose, value) in pairs {
        purpose.drop_with_bridge(bridge);
        value.drop_with_bridge(bridge);
    }
}
