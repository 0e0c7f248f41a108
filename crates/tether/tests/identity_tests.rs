use tether::{Bridge, BridgeConfig, BridgeError, NodeData, NodeRef, Wrapped};

#[test]
fn wrapping_null_returns_canonical_none() {
    let mut bridge = Bridge::new();
    let wrapped = bridge.wrap(NodeRef::NULL).unwrap();
    assert_eq!(wrapped, Wrapped::None);
    assert_eq!(bridge.construction_count(), 0);
    assert_eq!(bridge.stats().live_proxies, 0);
    wrapped.drop_with_bridge(&mut bridge);
}

#[test]
fn wrap_twice_returns_same_proxy_without_reconstruction() {
    let mut bridge = Bridge::new();
    let key = bridge.alloc_node(NodeData::IntCst(42)).unwrap();

    let first = bridge.wrap(NodeRef::some(key)).unwrap();
    let second = bridge.wrap(NodeRef::some(key)).unwrap();

    let id = first.proxy_id().unwrap();
    assert_eq!(second.proxy_id().unwrap(), id);
    assert_eq!(bridge.construction_count(), 1);
    assert_eq!(bridge.registry().refcount(id), 2);

    first.drop_with_bridge(&mut bridge);
    assert_eq!(bridge.registry().refcount(id), 1);
    second.drop_with_bridge(&mut bridge);
    assert_eq!(bridge.stats().live_proxies, 0);
}

#[test]
fn distinct_nodes_get_distinct_proxies() {
    let mut bridge = Bridge::new();
    let a = bridge.alloc_node(NodeData::IntCst(1)).unwrap();
    let b = bridge.alloc_node(NodeData::IntCst(1)).unwrap();

    // Identity is per node, never structural: equal payloads still get
    // separate proxies.
    let wrapped_a = bridge.wrap(NodeRef::some(a)).unwrap();
    let wrapped_b = bridge.wrap(NodeRef::some(b)).unwrap();
    assert_ne!(wrapped_a.proxy_id(), wrapped_b.proxy_id());

    wrapped_a.drop_with_bridge(&mut bridge);
    wrapped_b.drop_with_bridge(&mut bridge);
}

#[test]
fn release_then_rewrap_constructs_a_fresh_proxy() {
    let mut bridge = Bridge::new();
    let key = bridge.alloc_node(NodeData::StrCst("s".into())).unwrap();

    let first = bridge.wrap(NodeRef::some(key)).unwrap();
    let first_id = first.proxy_id().unwrap();
    let first_generation = bridge.registry().generation(first_id);
    first.drop_with_bridge(&mut bridge);

    let second = bridge.wrap(NodeRef::some(key)).unwrap();
    let second_id = second.proxy_id().unwrap();
    assert_eq!(bridge.construction_count(), 2);
    // The slot may be recycled, but the generation proves this is a new
    // proxy, not the destroyed one.
    assert!(first_id != second_id || bridge.registry().generation(second_id) > first_generation);
    assert_eq!(bridge.registry().refcount(second_id), 1);
    second.drop_with_bridge(&mut bridge);
}

#[test]
fn unclassifiable_node_installs_nothing() {
    let mut bridge = Bridge::new();
    let key = bridge.alloc_node(NodeData::Opaque).unwrap();

    let err = bridge.wrap(NodeRef::some(key)).unwrap_err();
    assert_eq!(err, BridgeError::UnclassifiableNode { kind: "Opaque" });

    let stats = bridge.stats();
    assert_eq!(stats.live_proxies, 0);
    assert_eq!(stats.cache_entries, 0);

    // The failure leaves the bridge fully usable.
    let good = bridge.alloc_node(NodeData::IntCst(5)).unwrap();
    let wrapped = bridge.wrap(NodeRef::some(good)).unwrap();
    wrapped.drop_with_bridge(&mut bridge);
}

#[test]
fn proxy_limit_failure_leaves_no_partial_state() {
    let mut bridge = Bridge::with_config(BridgeConfig {
        proxy_limit: Some(1),
        ..BridgeConfig::default()
    });
    let a = bridge.alloc_node(NodeData::IntCst(1)).unwrap();
    let b = bridge.alloc_node(NodeData::IntCst(2)).unwrap();

    let wrapped_a = bridge.wrap(NodeRef::some(a)).unwrap();
    let err = bridge.wrap(NodeRef::some(b)).unwrap_err();
    assert_eq!(err, BridgeError::Allocation { limit: 1, count: 1 });

    let stats = bridge.stats();
    assert_eq!(stats.live_proxies, 1);
    assert_eq!(stats.cache_entries, 1);

    // The existing proxy is unaffected, and a cache hit still succeeds at
    // the limit because it constructs nothing.
    let again = bridge.wrap(NodeRef::some(a)).unwrap();
    assert_eq!(again.proxy_id(), wrapped_a.proxy_id());
    again.drop_with_bridge(&mut bridge);
    wrapped_a.drop_with_bridge(&mut bridge);
}

#[test]
fn cache_entries_match_live_proxies_through_lifecycle() {
    let mut bridge = Bridge::new();
    let mut handles = Vec::new();
    for i in 0..4 {
        let key = bridge.alloc_node(NodeData::IntCst(i)).unwrap();
        handles.push(bridge.wrap(NodeRef::some(key)).unwrap());
    }
    let stats = bridge.stats();
    assert_eq!(stats.live_proxies, 4);
    assert_eq!(stats.cache_entries, 4);

    for handle in handles {
        handle.drop_with_bridge(&mut bridge);
    }
    let stats = bridge.stats();
    assert_eq!(stats.live_proxies, 0);
    assert_eq!(stats.cache_entries, 0);
    assert_eq!(stats.free_slots, 4);
}

#[cfg(feature = "handle-leak-panic")]
#[test]
#[should_panic(expected = "dropped without drop_with_bridge")]
fn leaked_handle_panics_when_enabled() {
    let mut bridge = Bridge::new();
    let key = bridge.alloc_node(NodeData::IntCst(1)).unwrap();
    let wrapped = bridge.wrap(NodeRef::some(key)).unwrap();
    drop(wrapped);
}
