use crate::host::{MarkPhase, NodeKey};

/// Per-type callback that reports a proxy's payload to the host collector.
///
/// Resolved once when the proxy type is registered and stable thereafter;
/// the mark walk never re-resolves per instance.
pub type MarkFn = fn(&mut MarkPhase<'_>, NodeKey);

/// Identifier of a registered proxy type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ProxyTypeId(u32);

impl ProxyTypeId {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Metadata record for one proxy type.
#[derive(Debug)]
struct TypeMeta {
    name: Box<str>,
    base: Option<ProxyTypeId>,
    /// The resolved mark callback: either supplied at registration or copied
    /// from the base's already-resolved slot.
    mark: MarkFn,
}

/// Table of every registered proxy type.
///
/// Proxy types form a single-inheritance hierarchy mirroring the payload
/// hierarchy. The mark callback is a property of "what kind of payload does
/// an instance wrap", so registration defaults to inherit-from-base; only
/// types introducing a genuinely new payload category supply their own.
#[derive(Debug, Default)]
pub struct TypeTable {
    types: Vec<TypeMeta>,
}

impl TypeTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a proxy type, resolving its mark callback immediately.
    ///
    /// An explicit `mark` wins; otherwise the base's resolved callback is
    /// copied into the new type's slot.
    ///
    /// # Panics
    /// Panics when neither a callback nor a base is supplied: such a type
    /// would silently never mark its payload, which is a memory-corruption
    /// risk, so registration fails fast instead. Also panics on an invalid
    /// base id.
    pub fn register(&mut self, name: &str, base: Option<ProxyTypeId>, mark: Option<MarkFn>) -> ProxyTypeId {
        if let Some(base_id) = base {
            assert!(
                base_id.index() < self.types.len(),
                "TypeTable::register: unknown base type"
            );
        }
        let mark = match (mark, base) {
            (Some(mark), _) => mark,
            (None, Some(base_id)) => self.types[base_id.index()].mark,
            (None, None) => {
                panic!("TypeTable::register: type {name:?} has no mark callback and no base to inherit one from")
            }
        };

        let id = ProxyTypeId(u32::try_from(self.types.len()).expect("TypeTable::register: type id overflow"));
        self.types.push(TypeMeta {
            name: name.into(),
            base,
            mark,
        });
        id
    }

    /// Registers a subclass of `base`, inheriting its mark callback.
    ///
    /// This is the path taken when the embedding runtime derives a new type
    /// at script level.
    pub fn derive(&mut self, name: &str, base: ProxyTypeId) -> ProxyTypeId {
        self.register(name, Some(base), None)
    }

    /// Returns the resolved mark callback for `id`.
    ///
    /// # Panics
    /// Panics on an unknown type id.
    #[must_use]
    pub fn mark_fn(&self, id: ProxyTypeId) -> MarkFn {
        self.types.get(id.index()).expect("TypeTable::mark_fn: unknown type").mark
    }

    /// Returns the type's registered name.
    ///
    /// # Panics
    /// Panics on an unknown type id.
    #[must_use]
    pub fn name(&self, id: ProxyTypeId) -> &str {
        &self.types.get(id.index()).expect("TypeTable::name: unknown type").name
    }

    /// Returns the type's base, or `None` for a hierarchy root.
    ///
    /// # Panics
    /// Panics on an unknown type id.
    #[must_use]
    pub fn base(&self, id: ProxyTypeId) -> Option<ProxyTypeId> {
        self.types.get(id.index()).expect("TypeTable::base: unknown type").base
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns `true` when no types have been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Marks the wrapped node itself, transitively.
///
/// The callback for every proxy type whose payload lives in the host arena.
pub(crate) fn mark_payload_node(phase: &mut MarkPhase<'_>, key: NodeKey) {
    phase.mark_node(key);
}

/// Mark callback for payloads the host collector does not manage.
pub(crate) fn mark_payload_none(_phase: &mut MarkPhase<'_>, _key: NodeKey) {}

/// Ids of the statically registered proxy types.
///
/// A single-inheritance hierarchy mirroring the node grammar: `node` is the
/// root and supplies the transitive payload mark; the concrete kinds inherit
/// it. `pass` wraps host objects outside the collector's arena, so it is the
/// one leaf that supplies its own (no-op) callback.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinTypes {
    pub node: ProxyTypeId,
    pub constant: ProxyTypeId,
    pub int_cst: ProxyTypeId,
    pub str_cst: ProxyTypeId,
    pub decl: ProxyTypeId,
    pub var_decl: ProxyTypeId,
    pub fn_decl: ProxyTypeId,
    pub tree_list: ProxyTypeId,
    pub pass: ProxyTypeId,
}

impl BuiltinTypes {
    /// Registers the builtin hierarchy into `table`.
    pub fn register_into(table: &mut TypeTable) -> Self {
        let node = table.register("node", None, Some(mark_payload_node));
        let constant = table.derive("constant", node);
        let int_cst = table.derive("int_cst", constant);
        let str_cst = table.derive("str_cst", constant);
        let decl = table.derive("decl", node);
        let var_decl = table.derive("var_decl", decl);
        let fn_decl = table.derive("fn_decl", decl);
        let tree_list = table.derive("tree_list", node);
        let pass = table.register("pass", Some(node), Some(mark_payload_none));
        Self {
            node,
            constant,
            int_cst,
            str_cst,
            decl,
            var_decl,
            fn_decl,
            tree_list,
            pass,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::ptr;

    use super::*;

    #[test]
    fn derived_type_inherits_resolved_callback() {
        let mut table = TypeTable::new();
        let builtins = BuiltinTypes::register_into(&mut table);
        let custom = table.derive("my_decl", builtins.var_decl);

        assert!(ptr::fn_addr_eq(table.mark_fn(custom), table.mark_fn(builtins.node)));
        assert_eq!(table.base(custom), Some(builtins.var_decl));
        assert_eq!(table.name(custom), "my_decl");
    }

    #[test]
    fn explicit_callback_wins_over_inheritance() {
        let mut table = TypeTable::new();
        let builtins = BuiltinTypes::register_into(&mut table);

        assert!(!ptr::fn_addr_eq(
            table.mark_fn(builtins.pass),
            table.mark_fn(builtins.node)
        ));

        // Subclasses of pass inherit the no-op, not the root's callback.
        let custom_pass = table.derive("my_pass", builtins.pass);
        assert!(ptr::fn_addr_eq(
            table.mark_fn(custom_pass),
            table.mark_fn(builtins.pass)
        ));
    }

    #[test]
    #[should_panic(expected = "no mark callback and no base")]
    fn rootless_type_without_callback_is_fatal() {
        let mut table = TypeTable::new();
        table.register("orphan", None, None);
    }
}
