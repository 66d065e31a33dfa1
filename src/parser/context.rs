//! Per-element parse state: the handler frame and the capture state.

use std::rc::Rc;

use crate::attr::Attribute;
use crate::extension::Extension;
use crate::fragment::{DeclOutcome, FragmentBuffer};
use crate::qname::{Namespace, QName, XML_URI};
use crate::writer::{escape_attr, escape_text};

/// Where a finished instance is handed when its element closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Route {
    /// The document root; becomes the parse result.
    Root,
    /// A statically-known structural child; returned to the parent object.
    Structural,
    /// A registered extension; recorded into the parent's container.
    Extension { repeatable: bool },
}

/// One frame per open element. Created on element open with inherited
/// context applied, finalized and popped on close.
pub(super) struct Frame {
    pub name: QName,
    pub instance: Box<dyn Extension>,
    pub route: Route,
    /// Accumulated character data, finalized into the instance on close.
    pub text: String,
    /// Effective `xml:lang` (inherited, overridable).
    pub lang: Option<Rc<str>>,
    /// Effective absolute `xml:base` (inherited, resolved per RFC 3986).
    pub base: Option<Rc<str>>,
}

// ============================================================================
// Verbatim-Capture
// ============================================================================

/// Capture state while inside an unrecognized sub-tree. All events are
/// appended verbatim to the owning container's [`FragmentBuffer`]; the
/// state tracks nesting depth and which bindings were declared inside the
/// buffer, so externally-declared aliases can be synthesized into the
/// fragment's declarations on first use.
pub(super) struct BufferState {
    depth: usize,
    /// One scope per open buffered element.
    inner_scopes: Vec<Vec<Namespace>>,
    /// Raw length right after the last open tag while a collapse to `<a/>`
    /// is still possible.
    open_tag_end: Option<usize>,
}

impl BufferState {
    pub fn new() -> Self {
        BufferState { depth: 0, inner_scopes: Vec::new(), open_tag_end: None }
    }

    fn qualified(name: &QName) -> String {
        name.qualified()
    }

    fn declared_inside(&self, scope: &[Namespace], alias: &str) -> bool {
        scope.iter().any(|ns| &*ns.alias == alias)
            || self
                .inner_scopes
                .iter()
                .flat_map(|s| s.iter())
                .any(|ns| &*ns.alias == alias)
    }

    /// Keeps the buffer self-contained: an alias resolved from outside the
    /// buffer is synthesized into the fragment's declarations on first use.
    /// An alias collision (same alias, different URI) is declared inline on
    /// the current tag instead, which shadows the fragment-level binding.
    fn ensure_binding(
        &self,
        frag: &mut FragmentBuffer,
        alias: &str,
        uri: &str,
        tag: &mut String,
        scope: &mut Vec<Namespace>,
    ) {
        if uri.is_empty() || (alias == "xml" && uri == XML_URI) {
            return;
        }
        if self.declared_inside(scope, alias) {
            return;
        }
        match frag.declare_namespace(alias, uri) {
            DeclOutcome::Added | DeclOutcome::Present => {}
            DeclOutcome::Collision => {
                if alias.is_empty() {
                    tag.push_str(&format!(" xmlns=\"{}\"", escape_attr(uri)));
                } else {
                    tag.push_str(&format!(" xmlns:{alias}=\"{}\"", escape_attr(uri)));
                }
                scope.push(Namespace::new(alias, uri));
            }
        }
    }

    /// Appends a buffered start tag. `ns_decls` are the bindings declared on
    /// this element itself and are replayed inline.
    pub fn open(
        &mut self,
        frag: &mut FragmentBuffer,
        name: &QName,
        attrs: &[Attribute],
        ns_decls: Vec<Namespace>,
    ) {
        let mut scope = ns_decls;
        let mut tag = String::with_capacity(32);
        tag.push('<');
        tag.push_str(&Self::qualified(name));
        for ns in &scope {
            if ns.alias.is_empty() {
                tag.push_str(&format!(" xmlns=\"{}\"", escape_attr(&ns.uri)));
            } else {
                tag.push_str(&format!(" xmlns:{}=\"{}\"", ns.alias, escape_attr(&ns.uri)));
            }
        }
        let element_alias = name.prefix.as_deref().unwrap_or("");
        self.ensure_binding(frag, element_alias, &name.uri, &mut tag, &mut scope);
        for attr in attrs {
            if attr.name.is_xml() {
                tag.push_str(&format!(
                    " xml:{}=\"{}\"",
                    attr.name.local_name,
                    escape_attr(&attr.value)
                ));
                continue;
            }
            if let Some(prefix) = attr.name.prefix.as_deref().filter(|p| !p.is_empty()) {
                self.ensure_binding(frag, prefix, &attr.name.uri, &mut tag, &mut scope);
            }
            tag.push_str(&format!(
                " {}=\"{}\"",
                Self::qualified(&attr.name),
                escape_attr(&attr.value)
            ));
        }
        tag.push('>');
        frag.append_raw(&tag);
        frag.mark_text_boundary();
        self.inner_scopes.push(scope);
        self.depth += 1;
        self.open_tag_end = Some(frag.raw_len());
    }

    /// Appends buffered character data (escaped) and feeds the full-text
    /// index with the unescaped form.
    pub fn text(&mut self, frag: &mut FragmentBuffer, text: &str) {
        self.open_tag_end = None;
        frag.append_raw(&escape_text(text));
        frag.index_text(text);
    }

    /// Closes the innermost buffered element. An element with no content
    /// since its open tag collapses to the empty-element form. Returns true
    /// once the buffered sub-tree is complete.
    pub fn close(&mut self, frag: &mut FragmentBuffer, name: &QName) -> bool {
        self.inner_scopes.pop();
        self.depth -= 1;
        if self.open_tag_end == Some(frag.raw_len()) && frag.raw_xml().ends_with('>') {
            frag.truncate_raw(frag.raw_len() - 1);
            frag.append_raw("/>");
        } else {
            frag.append_raw(&format!("</{}>", Self::qualified(name)));
        }
        self.open_tag_end = None;
        frag.mark_text_boundary();
        self.depth == 0
    }
}
