//! Extension registration: descriptors, per-owner tables, lookup.
//!
//! One [`ExtensionRegistry`] is built up front by each domain type's
//! `declare_extensions` and then shared read-only by every parse and
//! generation pass. Declaration is idempotent per owner type (guarded by a
//! `declared` flag), re-declaration is a no-op, and registering a descriptor
//! whose target is itself extensible recursively imports the target's own
//! registrations — a multi-level extension graph resolves without lazy work
//! at parse time.
//!
//! Subtyp-Vererbung ist explizite Komposition: ein Subtyp-Eintrag haelt den
//! `TypeId` seines Basistyps, Lookups laufen die Kette hoch. Registrierungen
//! am Basistyp wirken damit nach unten, nie nach oben.

use std::any::TypeId;
use std::fmt;

use crate::adapt::{AdaptFn, AdaptTable};
use crate::error::{Error, Result};
use crate::extension::Extension;
use crate::qname::{LocalKey, NameKey, Namespace};
use crate::FastHashMap;

/// Factory table entry: constructs a fresh instance of the target type.
pub type ExtensionFactory = fn() -> Box<dyn Extension>;

type DeclareFn = fn(&mut ExtensionRegistry);

/// Type identity plus a debug name for diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct TypeRef {
    pub id: TypeId,
    pub name: &'static str,
}

impl TypeRef {
    pub fn of<T: 'static>() -> Self {
        TypeRef { id: TypeId::of::<T>(), name: std::any::type_name::<T>() }
    }
}

impl PartialEq for TypeRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeRef {}

// ============================================================================
// ExtensionDescriptor
// ============================================================================

/// One registration: (namespace, local name or `*`) → target type, with
/// cardinality and requiredness. Immutable once registered.
#[derive(Clone)]
pub struct ExtensionDescriptor {
    namespace: Namespace,
    local: LocalKey,
    target: TypeRef,
    required: bool,
    repeatable: bool,
    aggregate: bool,
    factory: Option<ExtensionFactory>,
    declare: Option<DeclareFn>,
}

impl ExtensionDescriptor {
    /// Descriptor for a constructible target. A local name of `"*"` makes
    /// this the namespace catch-all.
    pub fn new<E: Extension + Default>(namespace: &Namespace, local_name: &str) -> Self {
        ExtensionDescriptor {
            namespace: namespace.clone(),
            local: LocalKey::name(local_name),
            target: TypeRef::of::<E>(),
            required: false,
            repeatable: false,
            aggregate: false,
            factory: Some(|| Box::<E>::default() as Box<dyn Extension>),
            declare: Some(|r: &mut ExtensionRegistry| r.declare::<E>()),
        }
    }

    /// Descriptor without a factory. Matching elements fail with
    /// [`Error::CannotCreateExtension`]; useful for targets that are only
    /// ever constructed by adaptation or set manually before generation.
    pub fn declared_only<E: Extension>(namespace: &Namespace, local_name: &str) -> Self {
        ExtensionDescriptor {
            namespace: namespace.clone(),
            local: LocalKey::name(local_name),
            target: TypeRef::of::<E>(),
            required: false,
            repeatable: false,
            aggregate: false,
            factory: None,
            declare: Some(|r: &mut ExtensionRegistry| r.declare::<E>()),
        }
    }

    /// Must be present by the time the owning element closes.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Repeated occurrences form an ordered sibling list.
    pub fn repeatable(mut self) -> Self {
        self.repeatable = true;
        self
    }

    /// Repeated occurrences merge into one shared instance.
    pub fn aggregate(mut self) -> Self {
        self.aggregate = true;
        self
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Concrete local name, or `None` for the catch-all.
    pub fn local_name(&self) -> Option<&str> {
        match &self.local {
            LocalKey::Name(n) => Some(n),
            LocalKey::Any => None,
        }
    }

    pub fn target(&self) -> TypeRef {
        self.target
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_repeatable(&self) -> bool {
        self.repeatable
    }

    pub fn is_aggregate(&self) -> bool {
        self.aggregate
    }

    /// Lookup key within the owner table.
    fn key(&self) -> NameKey {
        NameKey { uri: self.namespace.uri.clone(), local: self.local.clone() }
    }

    /// Constructs an instance from the factory table.
    pub(crate) fn create(&self) -> Result<Box<dyn Extension>> {
        match self.factory {
            Some(factory) => Ok(factory()),
            None => Err(Error::CannotCreateExtension { type_name: self.target.name.into() }),
        }
    }
}

impl fmt::Debug for ExtensionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionDescriptor")
            .field("namespace", &self.namespace.uri)
            .field("local", &self.local)
            .field("target", &self.target.name)
            .field("required", &self.required)
            .field("repeatable", &self.repeatable)
            .field("aggregate", &self.aggregate)
            .field("has_factory", &self.factory.is_some())
            .finish()
    }
}

// ============================================================================
// ExtensionRegistry
// ============================================================================

#[derive(Debug, Default)]
struct OwnerEntry {
    declared: bool,
    /// Registration order, for deterministic namespace pre-declaration.
    order: Vec<NameKey>,
    by_name: FastHashMap<NameKey, ExtensionDescriptor>,
    arbitrary_content: bool,
    mixed_content: bool,
    /// Base type whose registrations this entry composes over.
    parent: Option<TypeId>,
}

/// Process-wide registration table, keyed by owner type. Built once,
/// then shared read-only by all parses.
#[derive(Debug, Default)]
pub struct ExtensionRegistry {
    owners: FastHashMap<TypeId, OwnerEntry>,
    adapt: AdaptTable,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `T`'s declarations exactly once. Safe to call from every code
    /// path that is about to parse or generate a `T`; repeat calls are
    /// no-ops, which also breaks cycles in mutually-nested declarations.
    pub fn declare<T: Extension>(&mut self) {
        let entry = self.owners.entry(TypeId::of::<T>()).or_default();
        if entry.declared {
            return;
        }
        entry.declared = true;
        T::declare_extensions(self);
    }

    /// True once [`declare`](Self::declare) ran for the type.
    pub fn is_declared<T: Extension>(&self) -> bool {
        self.owners
            .get(&TypeId::of::<T>())
            .is_some_and(|e| e.declared)
    }

    /// Registers a descriptor on the owner type and recursively imports the
    /// target type's own declarations. Re-registering the same key replaces
    /// the descriptor without duplicating its order slot.
    pub fn register<Owner: Extension>(&mut self, descriptor: ExtensionDescriptor) {
        let declare = descriptor.declare;
        let key = descriptor.key();
        let entry = self.owners.entry(TypeId::of::<Owner>()).or_default();
        if !entry.by_name.contains_key(&key) {
            entry.order.push(key.clone());
        }
        entry.by_name.insert(key, descriptor);
        if let Some(declare) = declare {
            declare(self);
        }
    }

    /// Unrecognized children of `Owner` are buffered instead of rejected.
    pub fn allow_arbitrary_content<Owner: Extension>(&mut self, allow: bool) {
        self.owners.entry(TypeId::of::<Owner>()).or_default().arbitrary_content = allow;
    }

    /// Character data interleaved with children of `Owner` joins the
    /// fragment instead of being rejected.
    pub fn allow_mixed_content<Owner: Extension>(&mut self, allow: bool) {
        self.owners.entry(TypeId::of::<Owner>()).or_default().mixed_content = allow;
    }

    /// Declares `Sub` as a subtype of `Base`: lookups on `Sub` compose over
    /// `Base`'s registrations (and transitively over its parents).
    pub fn derive<Base: Extension, Sub: Extension>(&mut self) {
        let base = TypeId::of::<Base>();
        self.owners.entry(TypeId::of::<Sub>()).or_default().parent = Some(base);
    }

    /// Walks the composition chain starting at `owner`.
    fn chain(&self, owner: TypeId) -> impl Iterator<Item = &OwnerEntry> {
        let mut cursor = Some(owner);
        std::iter::from_fn(move || {
            let entry = self.owners.get(&cursor.take()?)?;
            cursor = entry.parent;
            Some(entry)
        })
    }

    /// Resolves (namespace, local name) for the owner type: exact match
    /// anywhere in the chain wins over a wildcard anywhere in the chain;
    /// within one tier the most-derived registration wins.
    pub fn lookup(&self, owner: TypeId, uri: &str, local_name: &str) -> Option<&ExtensionDescriptor> {
        let exact = NameKey::exact(uri, local_name);
        for entry in self.chain(owner) {
            if let Some(d) = entry.by_name.get(&exact) {
                return Some(d);
            }
        }
        let wildcard = NameKey::wildcard(uri);
        for entry in self.chain(owner) {
            if let Some(d) = entry.by_name.get(&wildcard) {
                return Some(d);
            }
        }
        None
    }

    /// Finds the descriptor whose target is the given type, for routing
    /// already-constructed instances into a container.
    pub fn descriptor_by_target(&self, owner: TypeId, target: TypeId) -> Option<&ExtensionDescriptor> {
        for entry in self.chain(owner) {
            for key in &entry.order {
                if let Some(d) = entry.by_name.get(key) {
                    if d.target.id == target {
                        return Some(d);
                    }
                }
            }
        }
        None
    }

    /// All descriptors visible on the owner, most-derived tier first, in
    /// registration order within each tier. A key re-registered on a subtype
    /// shadows the base registration.
    pub fn descriptors_for(&self, owner: TypeId) -> Vec<&ExtensionDescriptor> {
        let mut seen: Vec<&NameKey> = Vec::new();
        let mut out = Vec::new();
        for entry in self.chain(owner) {
            for key in &entry.order {
                if seen.contains(&key) {
                    continue;
                }
                if let Some(d) = entry.by_name.get(key) {
                    seen.push(key);
                    out.push(d);
                }
            }
        }
        out
    }

    /// True when any tier of the chain allows arbitrary content.
    pub fn allows_arbitrary_content(&self, owner: TypeId) -> bool {
        self.chain(owner).any(|e| e.arbitrary_content)
    }

    /// True when any tier of the chain allows mixed content.
    pub fn allows_mixed_content(&self, owner: TypeId) -> bool {
        self.chain(owner).any(|e| e.mixed_content)
    }

    /// Union of all namespaces reachable from the owner's declarations,
    /// including nested target types, deduplicated by URI in first-seen
    /// order. Used to pre-declare prefixes on the generated root element.
    pub fn namespaces_in_use(&self, owner: TypeId) -> Vec<Namespace> {
        let mut seen_types: Vec<TypeId> = Vec::new();
        let mut pending = vec![owner];
        let mut out: Vec<Namespace> = Vec::new();
        while let Some(tid) = pending.pop() {
            if seen_types.contains(&tid) {
                continue;
            }
            seen_types.push(tid);
            for descriptor in self.descriptors_for(tid) {
                let ns = descriptor.namespace();
                if !ns.uri.is_empty() && !out.iter().any(|n| n.uri == ns.uri) {
                    out.push(ns.clone());
                }
                pending.push(descriptor.target().id);
            }
        }
        out
    }

    // ------------------------------------------------------------------
    // Subtyp-Adaption (Zwei-Phasen-Aufbau, siehe adapt.rs)
    // ------------------------------------------------------------------

    /// Registers an adaptor from the generic `Base` to a specific variant,
    /// keyed by the category marker the generic instance reports.
    pub fn register_variant<Base: Extension>(&mut self, kind: &str, adaptor: AdaptFn) {
        self.adapt.register(TypeId::of::<Base>(), kind, adaptor);
    }

    /// Adapts a generic instance to its most specific registered variant
    /// based on its observed category marker; returns the instance unchanged
    /// when no marker is present or no variant matches.
    pub fn adapt(&self, generic: Box<dyn Extension>) -> Result<Box<dyn Extension>> {
        self.adapt.adapt(generic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ExtensionContainer;
    use crate::qname::QName;

    fn ns() -> Namespace {
        Namespace::new("t", "urn:test")
    }

    #[derive(Default)]
    struct Owner {
        container: ExtensionContainer,
    }

    impl Extension for Owner {
        fn element_name(&self) -> QName {
            QName::with_prefix("urn:test", "owner", "t")
        }
        fn declare_extensions(registry: &mut ExtensionRegistry)
        where
            Self: Sized,
        {
            registry.register::<Owner>(ExtensionDescriptor::new::<Child>(&ns(), "child"));
            registry.register::<Owner>(
                ExtensionDescriptor::new::<Nested>(&Namespace::new("n", "urn:nested"), "nested"),
            );
        }
        fn container(&self) -> Option<&ExtensionContainer> {
            Some(&self.container)
        }
        fn container_mut(&mut self) -> Option<&mut ExtensionContainer> {
            Some(&mut self.container)
        }
    }

    #[derive(Default)]
    struct Child;

    impl Extension for Child {
        fn element_name(&self) -> QName {
            QName::with_prefix("urn:test", "child", "t")
        }
    }

    /// Nested extensible type: declares its own child, which must become
    /// resolvable when `Owner` is declared.
    #[derive(Default)]
    struct Nested {
        container: ExtensionContainer,
    }

    impl Extension for Nested {
        fn element_name(&self) -> QName {
            QName::with_prefix("urn:nested", "nested", "n")
        }
        fn declare_extensions(registry: &mut ExtensionRegistry)
        where
            Self: Sized,
        {
            registry.register::<Nested>(
                ExtensionDescriptor::new::<Deep>(&Namespace::new("d", "urn:deep"), "deep"),
            );
        }
        fn container(&self) -> Option<&ExtensionContainer> {
            Some(&self.container)
        }
        fn container_mut(&mut self) -> Option<&mut ExtensionContainer> {
            Some(&mut self.container)
        }
    }

    #[derive(Default)]
    struct Deep;

    impl Extension for Deep {
        fn element_name(&self) -> QName {
            QName::with_prefix("urn:deep", "deep", "d")
        }
    }

    #[derive(Default)]
    struct SubOwner;

    impl Extension for SubOwner {
        fn element_name(&self) -> QName {
            QName::with_prefix("urn:test", "subowner", "t")
        }
    }

    #[test]
    fn exact_lookup() {
        let mut r = ExtensionRegistry::new();
        r.declare::<Owner>();
        let d = r.lookup(TypeId::of::<Owner>(), "urn:test", "child").unwrap();
        assert_eq!(d.target(), TypeRef::of::<Child>());
        assert!(r.lookup(TypeId::of::<Owner>(), "urn:test", "unknown").is_none());
    }

    /// Declaring the owner imports the nested type's registrations, so a
    /// three-level graph resolves in one pass.
    #[test]
    fn nested_declarations_imported() {
        let mut r = ExtensionRegistry::new();
        r.declare::<Owner>();
        assert!(r.is_declared::<Nested>());
        let d = r.lookup(TypeId::of::<Nested>(), "urn:deep", "deep").unwrap();
        assert_eq!(d.target(), TypeRef::of::<Deep>());
    }

    /// Re-declaration is a guarded no-op.
    #[test]
    fn declare_idempotent() {
        let mut r = ExtensionRegistry::new();
        r.declare::<Owner>();
        r.declare::<Owner>();
        assert_eq!(r.descriptors_for(TypeId::of::<Owner>()).len(), 2);
    }

    #[test]
    fn wildcard_fallback() {
        let mut r = ExtensionRegistry::new();
        r.register::<Owner>(ExtensionDescriptor::new::<Child>(&ns(), "*"));
        let d = r.lookup(TypeId::of::<Owner>(), "urn:test", "anything").unwrap();
        assert_eq!(d.local_name(), None);
        // Exact registration beats the wildcard.
        r.register::<Owner>(ExtensionDescriptor::new::<Deep>(&ns(), "specific"));
        let d = r.lookup(TypeId::of::<Owner>(), "urn:test", "specific").unwrap();
        assert_eq!(d.target(), TypeRef::of::<Deep>());
    }

    /// Base registrations are visible on the subtype, never the reverse.
    #[test]
    fn subtype_composition_is_downward() {
        let mut r = ExtensionRegistry::new();
        r.declare::<Owner>();
        r.derive::<Owner, SubOwner>();
        assert!(r.lookup(TypeId::of::<SubOwner>(), "urn:test", "child").is_some());

        r.register::<SubOwner>(ExtensionDescriptor::new::<Deep>(&ns(), "extra"));
        assert!(r.lookup(TypeId::of::<SubOwner>(), "urn:test", "extra").is_some());
        assert!(r.lookup(TypeId::of::<Owner>(), "urn:test", "extra").is_none());
    }

    #[test]
    fn arbitrary_content_inherited() {
        let mut r = ExtensionRegistry::new();
        r.allow_arbitrary_content::<Owner>(true);
        r.derive::<Owner, SubOwner>();
        assert!(r.allows_arbitrary_content(TypeId::of::<SubOwner>()));
        assert!(!r.allows_mixed_content(TypeId::of::<SubOwner>()));
    }

    /// Namespace union is transitive through nested targets and
    /// deduplicated by URI.
    #[test]
    fn namespaces_in_use_transitive() {
        let mut r = ExtensionRegistry::new();
        r.declare::<Owner>();
        let uris: Vec<String> = r
            .namespaces_in_use(TypeId::of::<Owner>())
            .iter()
            .map(|n| n.uri.to_string())
            .collect();
        assert!(uris.contains(&"urn:test".to_string()));
        assert!(uris.contains(&"urn:nested".to_string()));
        assert!(uris.contains(&"urn:deep".to_string()));
        assert_eq!(uris.len(), 3);
    }

    #[test]
    fn declared_only_has_no_factory() {
        let d = ExtensionDescriptor::declared_only::<Child>(&ns(), "child");
        assert!(matches!(
            d.create().err().unwrap(),
            Error::CannotCreateExtension { .. }
        ));
    }

    /// Required flag surfaces through the consumer-facing accessors.
    #[test]
    fn descriptor_flags() {
        let d = ExtensionDescriptor::new::<Child>(&ns(), "child")
            .required()
            .repeatable();
        assert!(d.is_required());
        assert!(d.is_repeatable());
        assert!(!d.is_aggregate());
    }
}
