//! The stream engine: a push-event stack machine over typed objects.
//!
//! One [`BindingParser`] per parse call. Every open element owns a frame on
//! the handler stack; dispatch for a child element tries, in order, the
//! parent object's statically-known structural children, the extension
//! registry (exact match, then namespace wildcard), and finally the
//! arbitrary-content policy, which redirects the whole sub-tree verbatim
//! into the parent container's fragment. Anything else is
//! [`Error::UnrecognizedElement`].
//!
//! Attribute werden zweiphasig angewendet: erst `xml:lang`/`xml:base`
//! (Vererbung, Base-Aufloesung nach RFC 3986), dann der Rest ueber den
//! [`AttributeConsumer`] des Objekts. Requiredness wird erst beim
//! Schliessen des Eigentuemer-Elements geprueft.
//!
//! The engine is synchronous and single-threaded; a parse either runs to
//! completion or aborts with the first error. Feed it from
//! [`parse_str`]/[`parse_reader`](crate::parser::parse_reader), or push
//! events directly from any external tokenizer.

mod api;
mod context;

pub use api::{parse_reader, parse_str, parse_str_any};

use std::any::Any;
use std::borrow::Cow;
use std::rc::Rc;

use log::debug;

use crate::attr::{Attribute, AttributeConsumer};
use crate::config::BindConfig;
use crate::error::{Error, Result};
use crate::extension::Extension;
use crate::qname::{Namespace, QName};
use crate::registry::ExtensionRegistry;
use crate::uri;

use context::{BufferState, Frame, Route};

/// Root-element matching mode.
enum RootMatch {
    /// The root must carry the seeded instance's element name.
    Fixed,
    /// Any root name is accepted and handed to the instance.
    AnyName,
}

/// Push-event parser bound to one root instance and one registry.
pub struct BindingParser<'r> {
    registry: &'r ExtensionRegistry,
    config: BindConfig,
    frames: Vec<Frame>,
    buffer: Option<BufferState>,
    root: Option<Box<dyn Extension>>,
    root_match: RootMatch,
    finished: bool,
}

impl<'r> BindingParser<'r> {
    /// Parser expecting the root element to match `root.element_name()`.
    pub fn new(
        root: Box<dyn Extension>,
        registry: &'r ExtensionRegistry,
        config: BindConfig,
    ) -> Self {
        BindingParser {
            registry,
            config,
            frames: Vec::new(),
            buffer: None,
            root: Some(root),
            root_match: RootMatch::Fixed,
            finished: false,
        }
    }

    /// Parser accepting any root name; the observed name is handed to the
    /// instance via [`Extension::set_element_name`].
    pub fn with_any_root(
        root: Box<dyn Extension>,
        registry: &'r ExtensionRegistry,
        config: BindConfig,
    ) -> Self {
        BindingParser { root_match: RootMatch::AnyName, ..Self::new(root, registry, config) }
    }

    /// Qualified name of the innermost open element, for error context.
    pub fn innermost_open(&self) -> Option<String> {
        self.frames.last().map(|f| f.name.qualified())
    }

    fn top(&self) -> &Frame {
        match self.frames.last() {
            Some(frame) => frame,
            None => unreachable!("dispatch requires an open frame"),
        }
    }

    fn top_mut(&mut self) -> &mut Frame {
        match self.frames.last_mut() {
            Some(frame) => frame,
            None => unreachable!("dispatch requires an open frame"),
        }
    }

    fn owner_type(&self) -> std::any::TypeId {
        (&*self.top().instance as &dyn Any).type_id()
    }

    /// Two-pass attribute application: the caller has already extracted the
    /// `xml:` context; the rest goes through the object's consumer, and
    /// leftovers are schema errors.
    fn apply_attributes(
        instance: &mut dyn Extension,
        attrs: &[Attribute],
        lang: Option<&str>,
        base: Option<&str>,
    ) -> Result<()> {
        let mut consumer = AttributeConsumer::with_context(attrs, lang, base);
        instance.consume_attributes(&mut consumer)?;
        consumer.assert_all_consumed()
    }

    /// An explicit `xml:lang`/`xml:base` on a container element is recorded
    /// on its fragment (created empty if need be), so generation replays the
    /// context even when nothing was buffered. The stored base is the
    /// resolved absolute form.
    fn record_explicit_context(
        instance: &mut dyn Extension,
        full_text_index: bool,
        lang_explicit: bool,
        base_explicit: bool,
        lang: Option<&str>,
        base: Option<&str>,
    ) {
        if !lang_explicit && !base_explicit {
            return;
        }
        let Some(container) = instance.container_mut() else { return };
        let frag = container.ensure_fragment(full_text_index);
        if lang_explicit {
            frag.set_lang(lang);
        }
        if base_explicit {
            frag.set_base(base);
        }
    }

    /// Handles an element-open event. `ns_decls` lists the bindings declared
    /// on this element (needed verbatim for capture).
    pub fn start_element(
        &mut self,
        name: QName,
        attrs: Vec<Attribute>,
        ns_decls: Vec<Namespace>,
    ) -> Result<()> {
        if self.finished {
            return Err(Error::XmlSyntax("content after the root element closed".into()));
        }
        if self.buffer.is_some() {
            let Some(frag) = self
                .frames
                .last_mut()
                .and_then(|f| f.instance.container_mut())
                .and_then(|c| c.fragment_mut())
            else {
                unreachable!("buffering always owns a fragment")
            };
            let Some(buffer) = self.buffer.as_mut() else {
                unreachable!("checked above")
            };
            buffer.open(frag, &name, &attrs, ns_decls);
            return Ok(());
        }

        // Pass 1: xml:lang / xml:base with inheritance.
        let mut lang_override: Option<String> = None;
        let mut base_override: Option<String> = None;
        let mut rest: Vec<Attribute> = Vec::with_capacity(attrs.len());
        for attr in attrs {
            if attr.name.is_xml() {
                match &*attr.name.local_name {
                    "lang" => lang_override = Some(attr.value),
                    "base" => base_override = Some(attr.value),
                    _ => rest.push(attr),
                }
            } else {
                rest.push(attr);
            }
        }
        let (inherited_lang, inherited_base) = match self.frames.last() {
            Some(frame) => (frame.lang.clone(), frame.base.clone()),
            None => (None, None),
        };
        let lang: Option<Rc<str>> = match &lang_override {
            Some(l) => Some(Rc::from(l.as_str())),
            None => inherited_lang,
        };
        let base: Option<Rc<str>> = match &base_override {
            Some(b) => Some(Rc::from(uri::resolve(inherited_base.as_deref(), b)?.as_str())),
            None => inherited_base,
        };

        // Root element.
        if self.frames.is_empty() {
            let Some(mut instance) = self.root.take() else {
                return Err(Error::XmlSyntax("multiple root elements".into()));
            };
            match self.root_match {
                RootMatch::Fixed => {
                    let expected = instance.element_name();
                    if expected != name {
                        return Err(Error::UnrecognizedElement {
                            name: Cow::Owned(name.display_name()),
                        });
                    }
                }
                RootMatch::AnyName => instance.set_element_name(name.clone()),
            }
            Self::apply_attributes(&mut *instance, &rest, lang.as_deref(), base.as_deref())?;
            Self::record_explicit_context(
                &mut *instance,
                self.config.full_text_index(),
                lang_override.is_some(),
                base_override.is_some(),
                lang.as_deref(),
                base.as_deref(),
            );
            self.frames.push(Frame {
                name,
                instance,
                route: Route::Root,
                text: String::new(),
                lang,
                base,
            });
            return Ok(());
        }

        // (i) Statically-known structural child.
        if let Some(mut child) = self.top_mut().instance.structural_child(&name) {
            Self::apply_attributes(&mut *child, &rest, lang.as_deref(), base.as_deref())?;
            Self::record_explicit_context(
                &mut *child,
                self.config.full_text_index(),
                lang_override.is_some(),
                base_override.is_some(),
                lang.as_deref(),
                base.as_deref(),
            );
            self.frames.push(Frame {
                name,
                instance: child,
                route: Route::Structural,
                text: String::new(),
                lang,
                base,
            });
            return Ok(());
        }

        // (ii) Registered extension.
        let registry = self.registry;
        let owner = self.owner_type();
        let has_container = self.top().instance.container().is_some();
        if has_container {
            if let Some(descriptor) = registry.lookup(owner, &name.uri, &name.local_name) {
                let repeatable = descriptor.is_repeatable();
                let aggregate = descriptor.is_aggregate();
                let target = descriptor.target().id;
                // Aggregate occurrences rebind the existing instance so the
                // second occurrence merges instead of duplicating.
                let reused = if aggregate {
                    self.top_mut()
                        .instance
                        .container_mut()
                        .and_then(|c| c.take(target))
                } else {
                    None
                };
                let mut instance = match reused {
                    Some(existing) => existing,
                    None => {
                        if !repeatable && !aggregate {
                            let duplicate = self
                                .top()
                                .instance
                                .container()
                                .is_some_and(|c| c.contains(target));
                            if duplicate {
                                return Err(Error::DuplicateExtension {
                                    name: Cow::Owned(name.display_name()),
                                });
                            }
                        }
                        descriptor.create()?
                    }
                };
                Self::apply_attributes(&mut *instance, &rest, lang.as_deref(), base.as_deref())?;
                Self::record_explicit_context(
                    &mut *instance,
                    self.config.full_text_index(),
                    lang_override.is_some(),
                    base_override.is_some(),
                    lang.as_deref(),
                    base.as_deref(),
                );
                self.frames.push(Frame {
                    name,
                    instance,
                    route: Route::Extension { repeatable },
                    text: String::new(),
                    lang,
                    base,
                });
                return Ok(());
            }
        }

        // (iii) Arbitrary content → verbatim capture.
        if has_container && registry.allows_arbitrary_content(owner) {
            debug!("buffering unrecognized element '{}'", name.display_name());
            return self.begin_buffering(name, rest, lang_override, base_override, ns_decls);
        }
        Err(Error::UnrecognizedElement { name: Cow::Owned(name.display_name()) })
    }

    fn begin_buffering(
        &mut self,
        name: QName,
        mut attrs: Vec<Attribute>,
        lang_override: Option<String>,
        base_override: Option<String>,
        ns_decls: Vec<Namespace>,
    ) -> Result<()> {
        // Extracted xml: attributes belong to the capture verbatim.
        if let Some(lang) = lang_override {
            attrs.push(Attribute::new(
                QName::with_prefix(crate::qname::XML_URI, "lang", "xml"),
                lang,
            ));
        }
        if let Some(base) = base_override {
            attrs.push(Attribute::new(
                QName::with_prefix(crate::qname::XML_URI, "base", "xml"),
                base,
            ));
        }
        let full_text = self.config.full_text_index();
        let (owner_lang, owner_base) = {
            let frame = self.top();
            (frame.lang.clone(), frame.base.clone())
        };
        let Some(container) = self.top_mut().instance.container_mut() else {
            unreachable!("checked by the dispatch path")
        };
        let fresh = container.fragment().is_none();
        let frag = container.ensure_fragment(full_text);
        if fresh {
            frag.set_lang(owner_lang.as_deref());
            frag.set_base(owner_base.as_deref());
        }
        let mut buffer = BufferState::new();
        buffer.open(frag, &name, &attrs, ns_decls);
        self.buffer = Some(buffer);
        Ok(())
    }

    /// Handles a character-data event.
    pub fn characters(&mut self, text: &str) -> Result<()> {
        if self.buffer.is_some() {
            let Some(frag) = self
                .frames
                .last_mut()
                .and_then(|f| f.instance.container_mut())
                .and_then(|c| c.fragment_mut())
            else {
                unreachable!("buffering always owns a fragment")
            };
            let Some(buffer) = self.buffer.as_mut() else {
                unreachable!("checked above")
            };
            buffer.text(frag, text);
            return Ok(());
        }
        if self.frames.is_empty() {
            if text.trim().is_empty() {
                return Ok(());
            }
            return Err(Error::XmlSyntax("character data outside the root element".into()));
        }
        // Mixed content joins the fragment at event time, preserving its
        // position relative to buffered sibling elements.
        let owner = self.owner_type();
        if self.registry.allows_mixed_content(owner) && !text.is_empty() {
            let full_text = self.config.full_text_index();
            let (owner_lang, owner_base) = {
                let frame = self.top();
                (frame.lang.clone(), frame.base.clone())
            };
            if let Some(container) = self.top_mut().instance.container_mut() {
                let fresh = container.fragment().is_none();
                let frag = container.ensure_fragment(full_text);
                if fresh {
                    frag.set_lang(owner_lang.as_deref());
                    frag.set_base(owner_base.as_deref());
                }
                frag.append_raw(&crate::writer::escape_text(text));
                frag.index_text(text);
                return Ok(());
            }
        }
        self.top_mut().text.push_str(text);
        Ok(())
    }

    /// Handles an element-close event: finalize text, validate the
    /// container, route the instance to its parent, pop the frame.
    pub fn end_element(&mut self, name: &QName) -> Result<()> {
        if self.buffer.is_some() {
            let Some(frag) = self
                .frames
                .last_mut()
                .and_then(|f| f.instance.container_mut())
                .and_then(|c| c.fragment_mut())
            else {
                unreachable!("buffering always owns a fragment")
            };
            let Some(buffer) = self.buffer.as_mut() else {
                unreachable!("checked above")
            };
            if buffer.close(frag, name) {
                self.buffer = None;
            }
            return Ok(());
        }
        let Some(mut frame) = self.frames.pop() else {
            return Err(Error::XmlSyntax("unbalanced end of element".into()));
        };
        if frame.name.qualified() != name.qualified() {
            return Err(Error::XmlSyntax(format!(
                "mismatched end tag '</{}>', expected '</{}>'",
                name.qualified(),
                frame.name.qualified()
            )));
        }
        if !frame.text.trim().is_empty() {
            frame.instance.consume_text(&frame.text)?;
        }
        let owner = (&*frame.instance as &dyn Any).type_id();
        if let Some(container) = frame.instance.container() {
            container.validate(self.registry, owner)?;
        }
        match frame.route {
            Route::Root => {
                self.root = Some(frame.instance);
                self.finished = true;
            }
            Route::Structural => {
                self.top_mut().instance.accept_structural_child(frame.instance)?;
            }
            Route::Extension { repeatable } => {
                let Some(container) = self.top_mut().instance.container_mut() else {
                    unreachable!("extension dispatch verified the container")
                };
                if repeatable {
                    container.append(frame.instance);
                } else {
                    container.set(frame.instance);
                }
            }
        }
        Ok(())
    }

    /// Ends the parse and yields the bound root object.
    pub fn finish(mut self) -> Result<Box<dyn Extension>> {
        if self.buffer.is_some() || !self.frames.is_empty() {
            return Err(Error::XmlSyntax("document ended with elements still open".into()));
        }
        if !self.finished {
            return Err(Error::XmlSyntax("document contained no root element".into()));
        }
        match self.root.take() {
            Some(root) => Ok(root),
            None => unreachable!("finished parses always hold the root"),
        }
    }
}
