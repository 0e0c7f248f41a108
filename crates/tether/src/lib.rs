//! Cooperative garbage-collection bridge for host-owned IR nodes.
//!
//! A scripting runtime embedded in a compiler needs live handles to nodes
//! the compiler's own collector owns, without those nodes being collected
//! under it and without duplicate or dangling wrappers. This crate keeps
//! track of all live wrapper proxies and marks each wrapped node during the
//! host collector's mark phase:
//!
//! - [`Bridge::wrap`] hands out at most one proxy per node, through a cache
//!   keyed by node identity; proxy reference equality coincides with node
//!   identity.
//! - every proxy is linked into a [`LiveRegistry`] while it has external
//!   references; the registry is scanned as a collector root.
//! - each proxy type carries a resolved mark callback in a [`TypeTable`];
//!   subtypes inherit the callback at registration time, so user-derived
//!   wrapper types mark their payloads correctly without doing anything.
//!
//! The host side is modeled by [`HostHeap`], a mark-sweep arena, so the
//! whole cooperation is exercisable in-process: see [`gc_selftest`].

mod bridge;
mod cache;
mod chain;
mod error;
mod host;
mod registry;
mod selftest;
mod typemeta;

pub use crate::{
    bridge::{Bridge, BridgeConfig, BridgeStats, BridgeStatsDiff, Wrapped},
    chain::{list_from_chain, pairs_from_tree_list},
    error::BridgeError,
    host::{HostHeap, MarkPhase, NodeData, NodeKey, NodeRef},
    registry::{LiveRegistry, ProxyId, ProxyPayload},
    selftest::gc_selftest,
    typemeta::{BuiltinTypes, MarkFn, ProxyTypeId, TypeTable},
};
