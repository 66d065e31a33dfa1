//! The extension object model: the [`Extension`] trait and traversal.
//!
//! Every bindable element object implements [`Extension`]. The trait carries
//! both directions: the parse-side hooks the stream engine calls while the
//! element is open (attributes, text, child routing), and the generation
//! side that serializes the object back to XML. Most hooks have defaults, so
//! a leaf extension only implements `element_name` plus whatever state it
//! actually carries.
//!
//! Downcasting laeuft ueber `dyn Any`-Upcasting — kein eigener `as_any`-Hook
//! noetig. Typ-Identitaet ist damit immer die konkrete Struct-Identitaet.

use std::any::Any;
use std::borrow::Cow;

use crate::attr::{AttributeConsumer, AttributeMap};
use crate::container::ExtensionContainer;
use crate::error::{Error, Result};
use crate::qname::{QName, XML_URI};
use crate::registry::ExtensionRegistry;
use crate::writer::ElementWriter;

/// A bindable XML element object.
pub trait Extension: Any {
    /// The element name this object binds to, used on output and for root
    /// verification on input.
    fn element_name(&self) -> QName;

    /// Registrations for this type's own children. Invoked (idempotently)
    /// through [`ExtensionRegistry::declare`], including recursively when
    /// this type is registered as another type's extension.
    fn declare_extensions(registry: &mut ExtensionRegistry)
    where
        Self: Sized,
    {
        let _ = registry;
    }

    /// Catch-all types that bind any element name override this; the engine
    /// calls it when parsing with an open root name.
    fn set_element_name(&mut self, name: QName) {
        let _ = name;
    }

    /// Parse-side attribute intake. `xml:lang`/`xml:base`/`xmlns` are
    /// already stripped; the inherited context is readable on the consumer.
    /// Leftovers after this hook returns are flagged by the engine.
    fn consume_attributes(&mut self, attrs: &mut AttributeConsumer<'_>) -> Result<()> {
        let _ = attrs;
        Ok(())
    }

    /// Generation-side attribute production.
    fn put_attributes(&self, out: &mut AttributeMap) {
        let _ = out;
    }

    /// Called at element close with the accumulated character data, only
    /// when it is not pure whitespace. The default rejects text.
    fn consume_text(&mut self, text: &str) -> Result<()> {
        let _ = text;
        Err(Error::TextNotAllowed {
            element: Cow::Owned(self.element_name().display_name()),
        })
    }

    /// Generation-side text content.
    fn text(&self) -> Option<Cow<'_, str>> {
        None
    }

    /// The extension container, for types that accept registered or
    /// arbitrary children. Leaf types return `None`.
    fn container(&self) -> Option<&ExtensionContainer> {
        None
    }

    fn container_mut(&mut self) -> Option<&mut ExtensionContainer> {
        None
    }

    /// Statically-known structural children, consulted before the registry.
    /// Returns a fresh object for the engine to fill, or `None` to fall
    /// through to extension dispatch.
    fn structural_child(&mut self, name: &QName) -> Option<Box<dyn Extension>> {
        let _ = name;
        None
    }

    /// Receives a finished structural child back. Types overriding
    /// [`structural_child`](Self::structural_child) must override this too;
    /// the default refuses the child rather than dropping it silently.
    fn accept_structural_child(&mut self, child: Box<dyn Extension>) -> Result<()> {
        Err(Error::UnrecognizedElement {
            name: Cow::Owned(child.element_name().display_name()),
        })
    }

    /// Category marker used by two-phase subtype adaptation, if this type
    /// carries one (e.g. a `kind` attribute observed mid-parse).
    fn adaptation_kind(&self) -> Option<String> {
        None
    }

    /// Additional children for traversal that are not stored in the
    /// container — out-of-line references wrapped to look like ordinary
    /// children participate in [`visit`](crate::container::visit) this way.
    fn synthetic_children(&self) -> Vec<&dyn Extension> {
        Vec::new()
    }

    /// Serializes this object. The default writes the element with produced
    /// attributes, the fragment's namespace/`xml:lang`/`xml:base` context,
    /// text, and then the children.
    fn generate(&self, w: &mut ElementWriter<'_>, registry: &ExtensionRegistry) -> Result<()> {
        let mut attrs = AttributeMap::new();
        self.put_attributes(&mut attrs);
        let mut extra_ns = Vec::new();
        if let Some(fragment) = self.container().and_then(|c| c.fragment()) {
            // Fragment-Kontext gehoert auf das umschliessende Start-Tag,
            // damit der Raw-Inhalt im Output wieder gueltig aufloest.
            extra_ns.extend(fragment.namespace_decls());
            if let Some(lang) = fragment.lang() {
                attrs.set(QName::with_prefix(XML_URI, "lang", "xml"), lang);
            }
            if let Some(base) = fragment.base() {
                attrs.set(QName::with_prefix(XML_URI, "base", "xml"), base);
            }
        }
        w.start_element(&self.element_name(), &attrs, &extra_ns)?;
        if let Some(text) = self.text() {
            w.characters(&text)?;
        }
        self.generate_children(w, registry)?;
        w.end_element()
    }

    /// Serializes the children between start and end tag. The default emits
    /// the container in its fixed order; types with structural children
    /// prepend them here.
    fn generate_children(
        &self,
        w: &mut ElementWriter<'_>,
        registry: &ExtensionRegistry,
    ) -> Result<()> {
        match self.container() {
            Some(c) => c.emit(w, registry),
            None => Ok(()),
        }
    }
}

// ============================================================================
// Downcasting
// ============================================================================

/// Typed view of a dynamic extension.
pub fn downcast_ref<T: Extension>(ext: &dyn Extension) -> Option<&T> {
    (ext as &dyn Any).downcast_ref::<T>()
}

/// Mutable typed view of a dynamic extension.
pub fn downcast_mut<T: Extension>(ext: &mut dyn Extension) -> Option<&mut T> {
    (ext as &mut dyn Any).downcast_mut::<T>()
}

/// Consumes the box when the concrete type matches, returns it unchanged
/// otherwise.
pub fn downcast<T: Extension>(ext: Box<dyn Extension>) -> core::result::Result<Box<T>, Box<dyn Extension>> {
    if (&*ext as &dyn Any).is::<T>() {
        let any: Box<dyn Any> = ext;
        match any.downcast::<T>() {
            Ok(boxed) => Ok(boxed),
            Err(_) => unreachable!("type identity checked above"),
        }
    } else {
        Err(ext)
    }
}

/// Visitor control: continue into the subtree or skip it. Siblings are
/// visited either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitFlow {
    Descend,
    SkipSubtree,
}

/// Callback for depth-first traversal over directly and transitively owned
/// extensions.
pub trait ExtensionVisitor {
    fn visit(&mut self, extension: &dyn Extension) -> VisitFlow;
}
