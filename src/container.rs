//! The runtime extension container: recognized children plus the fragment.
//!
//! One [`ExtensionContainer`] per parsed or constructed object instance.
//! Non-repeating and repeating instances live in separate insertion-ordered
//! maps keyed by concrete type; a type is never in both at once. Everything
//! the parse could not recognize sits in the optional [`FragmentBuffer`].
//!
//! Validierung laeuft erst beim Schliessen des Eigentuemer-Elements —
//! Requiredness ist vorher nicht entscheidbar, weil noch Kinder kommen
//! koennen.

use std::any::{Any, TypeId};
use std::borrow::Cow;

use crate::error::{Error, Result};
use crate::extension::{downcast_ref, Extension, ExtensionVisitor, VisitFlow};
use crate::fragment::FragmentBuffer;
use crate::registry::ExtensionRegistry;
use crate::writer::ElementWriter;
use crate::FastIndexMap;

fn type_of(ext: &dyn Extension) -> TypeId {
    (ext as &dyn Any).type_id()
}

/// Identity of one stored instance, independent of any borrow.
///
/// Captured while inspecting the container (or during a
/// [`visit`](crate::container::visit) walk) and handed to
/// [`ExtensionContainer::remove_instance`] afterwards — the identity-based
/// twin of [`ExtensionContainer::remove_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceId(*const ());

impl InstanceId {
    pub fn of(ext: &dyn Extension) -> Self {
        InstanceId(ext as *const dyn Extension as *const ())
    }
}

/// Holder of one object's recognized and unrecognized children.
#[derive(Default)]
pub struct ExtensionContainer {
    single: FastIndexMap<TypeId, Box<dyn Extension>>,
    repeating: FastIndexMap<TypeId, Vec<Box<dyn Extension>>>,
    fragment: Option<FragmentBuffer>,
}

impl ExtensionContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.single.is_empty()
            && self.repeating.is_empty()
            && self.fragment.as_ref().is_none_or(FragmentBuffer::is_empty)
    }

    /// Routes an instance according to its descriptor: repeatable types join
    /// their ordered group, everything else is non-repeating with duplicate
    /// detection. An aggregate duplicate replaces the stored instance (the
    /// parse path never takes that branch — it reuses the instance instead,
    /// so both occurrences merge).
    pub fn add(
        &mut self,
        ext: Box<dyn Extension>,
        registry: &ExtensionRegistry,
        owner: TypeId,
    ) -> Result<()> {
        let tid = type_of(&*ext);
        let descriptor = registry.descriptor_by_target(owner, tid);
        if descriptor.is_some_and(|d| d.is_repeatable()) {
            self.append(ext);
            return Ok(());
        }
        let aggregate = descriptor.is_some_and(|d| d.is_aggregate());
        if self.single.contains_key(&tid) && !aggregate {
            return Err(Error::DuplicateExtension {
                name: Cow::Owned(ext.element_name().display_name()),
            });
        }
        self.set(ext);
        Ok(())
    }

    /// Stores a non-repeating instance, replacing any previous one of the
    /// same type. Keeps the one-map invariant by evicting the type from the
    /// repeating side first.
    pub fn set(&mut self, ext: Box<dyn Extension>) {
        let tid = type_of(&*ext);
        self.repeating.shift_remove(&tid);
        self.single.insert(tid, ext);
    }

    /// Appends to the type's ordered repeating group. A previously stored
    /// non-repeating instance of the same type moves to the head of the
    /// group so the one-map invariant holds.
    pub fn append(&mut self, ext: Box<dyn Extension>) {
        let tid = type_of(&*ext);
        let group = self.repeating.entry(tid).or_default();
        if let Some(prior) = self.single.shift_remove(&tid) {
            group.push(prior);
        }
        group.push(ext);
    }

    /// Typed access to the non-repeating instance.
    pub fn get<T: Extension>(&self) -> Option<&T> {
        self.single
            .get(&TypeId::of::<T>())
            .and_then(|b| downcast_ref::<T>(&**b))
    }

    pub fn get_mut<T: Extension>(&mut self) -> Option<&mut T> {
        self.single
            .get_mut(&TypeId::of::<T>())
            .and_then(|b| crate::extension::downcast_mut::<T>(&mut **b))
    }

    /// The type's repeating group in source order; empty when never added.
    /// Callers cannot distinguish "never added" from "added empty".
    pub fn get_repeating(&self, tid: TypeId) -> &[Box<dyn Extension>] {
        self.repeating.get(&tid).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Typed iteration over the repeating group in source order.
    pub fn repeating<T: Extension>(&self) -> impl Iterator<Item = &T> {
        self.get_repeating(TypeId::of::<T>())
            .iter()
            .filter_map(|b| downcast_ref::<T>(&**b))
    }

    /// True when the non-repeating map holds an instance of the type.
    pub fn contains(&self, tid: TypeId) -> bool {
        self.single.contains_key(&tid)
    }

    /// Removes and returns the non-repeating instance of the type. The
    /// engine uses this to rebind an aggregate occurrence; callers use it to
    /// hand an instance to [`ExtensionRegistry::adapt`].
    pub fn take(&mut self, tid: TypeId) -> Option<Box<dyn Extension>> {
        self.single.shift_remove(&tid)
    }

    /// Removes every instance of the type from both maps.
    pub fn remove_type<T: Extension>(&mut self) -> bool {
        let tid = TypeId::of::<T>();
        let a = self.single.shift_remove(&tid).is_some();
        let b = self.repeating.shift_remove(&tid).is_some();
        a || b
    }

    /// Removes one specific instance, located by identity.
    pub fn remove_instance(&mut self, target: InstanceId) -> bool {
        let single_hit = self
            .single
            .iter()
            .find(|(_, b)| InstanceId::of(&***b) == target)
            .map(|(tid, _)| *tid);
        if let Some(tid) = single_hit {
            self.single.shift_remove(&tid);
            return true;
        }
        let mut repeating_hit = None;
        for (tid, group) in &self.repeating {
            if let Some(pos) = group.iter().position(|b| InstanceId::of(&**b) == target) {
                repeating_hit = Some((*tid, pos));
                break;
            }
        }
        if let Some((tid, pos)) = repeating_hit {
            if let Some(group) = self.repeating.get_mut(&tid) {
                group.remove(pos);
                if group.is_empty() {
                    self.repeating.shift_remove(&tid);
                }
            }
            return true;
        }
        false
    }

    // ------------------------------------------------------------------
    // Fragment
    // ------------------------------------------------------------------

    pub fn fragment(&self) -> Option<&FragmentBuffer> {
        self.fragment.as_ref()
    }

    pub fn fragment_mut(&mut self) -> Option<&mut FragmentBuffer> {
        self.fragment.as_mut()
    }

    pub fn set_fragment(&mut self, fragment: FragmentBuffer) {
        self.fragment = Some(fragment);
    }

    /// The fragment, created on first use. `full_text_index` only applies to
    /// a newly created buffer.
    pub fn ensure_fragment(&mut self, full_text_index: bool) -> &mut FragmentBuffer {
        self.fragment.get_or_insert_with(|| {
            if full_text_index {
                FragmentBuffer::with_full_text_index()
            } else {
                FragmentBuffer::new()
            }
        })
    }

    // ------------------------------------------------------------------
    // Validate / Emit / Visit
    // ------------------------------------------------------------------

    /// Checks every `required` descriptor of the owner type for presence.
    /// Runs at element-close time; never earlier.
    pub fn validate(&self, registry: &ExtensionRegistry, owner: TypeId) -> Result<()> {
        for descriptor in registry.descriptors_for(owner) {
            if !descriptor.is_required() {
                continue;
            }
            let target = descriptor.target().id;
            let present = self.single.contains_key(&target)
                || self.repeating.get(&target).is_some_and(|g| !g.is_empty());
            if !present {
                return Err(Error::MissingRequiredExtension {
                    namespace: Cow::Owned(descriptor.namespace().uri.to_string()),
                    local_name: Cow::Owned(
                        descriptor.local_name().unwrap_or("*").to_string(),
                    ),
                });
            }
        }
        Ok(())
    }

    /// Serializes the container in its fixed order: non-repeating instances
    /// in insertion order, repeating groups in insertion order with each
    /// group kept contiguous between repeating markers, then the fragment
    /// verbatim.
    pub fn emit(&self, w: &mut ElementWriter<'_>, registry: &ExtensionRegistry) -> Result<()> {
        for ext in self.single.values() {
            ext.generate(w, registry)?;
        }
        for group in self.repeating.values() {
            w.start_repeating_element()?;
            for ext in group {
                ext.generate(w, registry)?;
            }
            w.end_repeating_element()?;
        }
        if let Some(fragment) = &self.fragment {
            if !fragment.is_empty() {
                w.raw_fragment(fragment.raw_xml())?;
            }
        }
        Ok(())
    }

    /// Depth-first traversal over all stored extensions. The visitor may
    /// skip a subtree; siblings are always visited.
    pub fn visit(&self, visitor: &mut dyn ExtensionVisitor) {
        for ext in self.single.values() {
            visit(&**ext, visitor);
        }
        for group in self.repeating.values() {
            for ext in group {
                visit(&**ext, visitor);
            }
        }
    }
}

impl std::fmt::Debug for ExtensionContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionContainer")
            .field("single", &self.single.len())
            .field("repeating", &self.repeating.len())
            .field("fragment", &self.fragment.as_ref().map(|b| b.raw_xml().len()))
            .finish()
    }
}

/// Visits one extension and, unless skipped, its synthetic children and its
/// container's children, depth first.
pub fn visit(extension: &dyn Extension, visitor: &mut dyn ExtensionVisitor) {
    if visitor.visit(extension) == VisitFlow::SkipSubtree {
        return;
    }
    for synthetic in extension.synthetic_children() {
        visit(synthetic, visitor);
    }
    if let Some(container) = extension.container() {
        container.visit(visitor);
    }
}
