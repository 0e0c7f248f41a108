use std::ptr;

use tether::{Bridge, NodeData, NodeRef};

#[test]
fn derived_type_resolves_to_base_callback() {
    let mut bridge = Bridge::new();
    let base = bridge.builtin_types().var_decl;
    let derived = bridge.derive_proxy_type("my_decl", base);

    assert!(ptr::fn_addr_eq(
        bridge.types().mark_fn(derived),
        bridge.types().mark_fn(base)
    ));
    assert_eq!(bridge.types().base(derived), Some(base));
}

#[test]
fn derived_instances_are_marked_during_collection() {
    let mut bridge = Bridge::new();
    let derived = {
        let base = bridge.builtin_types().var_decl;
        bridge.derive_proxy_type("my_decl", base)
    };

    let key = bridge
        .alloc_node(NodeData::VarDecl {
            name: "x".into(),
            chain: NodeRef::NULL,
        })
        .unwrap();
    let wrapped = bridge.wrap_as(NodeRef::some(key), derived).unwrap();

    bridge.force_collect();
    assert!(bridge.host().is_marked(key));
    assert!(bridge.host().is_live(key));
    assert_eq!(bridge.stats().proxies_by_type.get("my_decl"), Some(&1));

    wrapped.drop_with_bridge(&mut bridge);
    bridge.force_collect();
    assert!(!bridge.host().is_live(key));
}

#[test]
fn wrap_as_respects_existing_cache_entry() {
    let mut bridge = Bridge::new();
    let derived = {
        let base = bridge.builtin_types().int_cst;
        bridge.derive_proxy_type("my_int", base)
    };

    let key = bridge.alloc_node(NodeData::IntCst(9)).unwrap();
    let first = bridge.wrap(NodeRef::some(key)).unwrap();
    let second = bridge.wrap_as(NodeRef::some(key), derived).unwrap();

    // One proxy per node wins over the requested type.
    assert_eq!(first.proxy_id(), second.proxy_id());
    assert_eq!(bridge.construction_count(), 1);
    let id = first.proxy_id().unwrap();
    assert_eq!(bridge.registry().get(id).type_id, bridge.builtin_types().int_cst);

    first.drop_with_bridge(&mut bridge);
    second.drop_with_bridge(&mut bridge);
}

#[test]
fn non_collected_payload_types_do_not_root_their_node() {
    let mut bridge = Bridge::new();
    let pass_type = bridge.builtin_types().pass;

    // pass wraps host objects outside the collector's arena; its explicit
    // no-op callback must win over the root type's transitive mark.
    let key = bridge.alloc_node(NodeData::IntCst(1)).unwrap();
    let wrapped = bridge.wrap_as(NodeRef::some(key), pass_type).unwrap();

    bridge.force_collect();
    assert!(!bridge.host().is_live(key));

    wrapped.drop_with_bridge(&mut bridge);
}

#[test]
fn node_slot_reuse_under_a_live_proxy_keeps_wrappers_distinct() {
    let mut bridge = Bridge::new();
    let pass_type = bridge.builtin_types().pass;

    let key = bridge.alloc_node(NodeData::IntCst(1)).unwrap();
    let wrapped = bridge.wrap_as(NodeRef::some(key), pass_type).unwrap();

    // The no-op callback does not root the node, so the sweep frees its
    // slot while the proxy and its cache entry stay live.
    bridge.force_collect();
    assert!(!bridge.host().is_live(key));

    // The replacement node reuses the slot but its key carries a bumped
    // generation, so it misses the cache and gets its own proxy of the
    // right type instead of the old one.
    let reused = bridge.alloc_node(NodeData::StrCst("fresh".into())).unwrap();
    assert_eq!(reused.raw(), key.raw());
    assert_ne!(reused, key);

    let fresh = bridge.wrap(NodeRef::some(reused)).unwrap();
    assert_ne!(fresh.proxy_id(), wrapped.proxy_id());
    let fresh_id = fresh.proxy_id().unwrap();
    assert_eq!(bridge.registry().get(fresh_id).type_id, bridge.builtin_types().str_cst);

    fresh.drop_with_bridge(&mut bridge);
    wrapped.drop_with_bridge(&mut bridge);
    assert_eq!(bridge.stats().live_proxies, 0);
}

#[test]
#[should_panic(expected = "no mark callback and no base")]
fn registering_type_without_callback_or_base_is_fatal() {
    let mut bridge = Bridge::new();
    bridge.register_proxy_type("orphan", None, None);
}

#[test]
#[should_panic(expected = "unknown type")]
fn wrap_as_with_foreign_type_id_is_fatal() {
    // An id minted by one bridge's table is meaningless in another's.
    let mut other = Bridge::new();
    let foreign = {
        let base = other.builtin_types().node;
        other.derive_proxy_type("foreign", base)
    };

    let mut bridge = Bridge::new();
    let key = bridge.alloc_node(NodeData::IntCst(1)).unwrap();
    let _ = bridge.wrap_as(NodeRef::some(key), foreign);
}
