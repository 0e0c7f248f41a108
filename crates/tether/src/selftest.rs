use crate::{
    bridge::Bridge,
    error::BridgeError,
    host::{NodeData, NodeRef},
};

/// Shipped end-to-end check of the collector cooperation.
///
/// Constructs host nodes referenced by nothing except freshly created
/// proxies, forces a collection cycle, and verifies the underlying nodes
/// were marked and survived the sweep. Then releases the proxies, collects
/// again, and verifies the nodes are reclaimed. A failure means proxies do
/// not keep their payloads alive, an accessing-freed-memory class of bug.
pub fn gc_selftest(bridge: &mut Bridge) -> Result<(), BridgeError> {
    let int_key = bridge.alloc_node(NodeData::IntCst(42))?;
    let wrapper_int = bridge.wrap(NodeRef::some(int_key))?;

    let str_key = bridge.alloc_node(NodeData::StrCst("only referenced via a wrapper".into()))?;
    let wrapper_str = bridge.wrap(NodeRef::some(str_key))?;

    bridge.force_collect();

    let int_marked = bridge.host().is_marked(int_key) && bridge.host().is_live(int_key);
    let str_marked = bridge.host().is_marked(str_key) && bridge.host().is_live(str_key);

    wrapper_int.drop_with_bridge(bridge);
    wrapper_str.drop_with_bridge(bridge);

    if !int_marked {
        return Err(BridgeError::SelftestFailed("integer constant node was not marked"));
    }
    if !str_marked {
        return Err(BridgeError::SelftestFailed("string literal node was not marked"));
    }

    // With the wrappers gone, nothing roots the nodes any more.
    bridge.force_collect();
    if bridge.host().is_live(int_key) {
        return Err(BridgeError::SelftestFailed("integer constant node was not reclaimed"));
    }
    if bridge.host().is_live(str_key) {
        return Err(BridgeError::SelftestFailed("string literal node was not reclaimed"));
    }

    Ok(())
}
