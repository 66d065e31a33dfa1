//! Verbatim capture of unrecognized XML sub-trees.
//!
//! A [`FragmentBuffer`] holds the raw serialized form of everything a
//! container buffered, together with the namespace declarations needed to
//! make that raw text self-contained, the inherited `xml:lang`/`xml:base`
//! context, and an optional full-text index over the buffered character
//! data.
//!
//! Selbstaendigkeit-Invariante: jeder im Raw-Text verwendete Prefix ist
//! entweder innerhalb des Fragments deklariert oder steht in
//! `namespace_decls` — das Fragment bleibt damit auch ausserhalb seines
//! Ursprungsdokuments parsebar.

use std::rc::Rc;

use crate::qname::Namespace;
use crate::FastIndexMap;

/// Separator between indexed text segments (one per element boundary).
pub const FULL_TEXT_SEPARATOR: char = '\n';

/// Outcome of registering a namespace alias on the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclOutcome {
    /// Alias was new and is now part of the fragment's declarations.
    Added,
    /// Alias already declared with the same URI.
    Present,
    /// Alias already declared with a different URI; the caller must declare
    /// the binding inline instead to keep the raw text unambiguous.
    Collision,
}

#[derive(Debug, Default, Clone)]
struct FullText {
    buf: String,
    pending_boundary: bool,
}

/// Captured raw XML plus the context needed to replay it.
#[derive(Debug, Default, Clone)]
pub struct FragmentBuffer {
    raw_xml: String,
    /// alias → URI, insertion-ordered. Alias `""` is the default namespace.
    namespace_decls: FastIndexMap<Rc<str>, Rc<str>>,
    lang: Option<Rc<str>>,
    base: Option<Rc<str>>,
    full_text: Option<FullText>,
}

impl FragmentBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables the full-text index before any content is captured.
    pub fn with_full_text_index() -> Self {
        FragmentBuffer { full_text: Some(FullText::default()), ..Self::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.raw_xml.is_empty()
    }

    /// The captured content, verbatim.
    pub fn raw_xml(&self) -> &str {
        &self.raw_xml
    }

    /// Declarations that make [`raw_xml`](Self::raw_xml) self-contained.
    pub fn namespace_decls(&self) -> impl Iterator<Item = Namespace> + '_ {
        self.namespace_decls
            .iter()
            .map(|(alias, uri)| Namespace { alias: Rc::clone(alias), uri: Rc::clone(uri) })
    }

    /// Inherited `xml:lang` at the point of capture.
    pub fn lang(&self) -> Option<&str> {
        self.lang.as_deref()
    }

    /// Inherited absolute `xml:base` at the point of capture.
    pub fn base(&self) -> Option<&str> {
        self.base.as_deref()
    }

    pub fn set_lang(&mut self, lang: Option<&str>) {
        self.lang = lang.map(Rc::from);
    }

    pub fn set_base(&mut self, base: Option<&str>) {
        self.base = base.map(Rc::from);
    }

    /// Registers an alias the raw text depends on. First binding wins; a
    /// conflicting re-registration reports [`DeclOutcome::Collision`].
    pub fn declare_namespace(&mut self, alias: &str, uri: &str) -> DeclOutcome {
        match self.namespace_decls.get(alias) {
            Some(existing) if &**existing == uri => DeclOutcome::Present,
            Some(_) => DeclOutcome::Collision,
            None => {
                self.namespace_decls.insert(Rc::from(alias), Rc::from(uri));
                DeclOutcome::Added
            }
        }
    }

    /// True if the alias is already covered by the fragment's declarations
    /// with this URI.
    pub fn declares(&self, alias: &str, uri: &str) -> bool {
        self.namespace_decls.get(alias).is_some_and(|u| &**u == uri)
    }

    /// Appends already-serialized content. The caller is responsible for
    /// escaping; this is the verbatim path.
    pub fn append_raw(&mut self, chunk: &str) {
        self.raw_xml.push_str(chunk);
    }

    /// Current length of the raw buffer; used by the capture layer to detect
    /// "nothing was appended since the open tag" for `<a/>` collapsing.
    pub fn raw_len(&self) -> usize {
        self.raw_xml.len()
    }

    /// Truncates the raw buffer (capture-layer backtracking only).
    pub(crate) fn truncate_raw(&mut self, len: usize) {
        self.raw_xml.truncate(len);
    }

    /// Adds character data to the full-text index, if enabled.
    pub fn index_text(&mut self, text: &str) {
        let Some(ft) = &mut self.full_text else { return };
        if text.is_empty() {
            return;
        }
        if ft.pending_boundary && !ft.buf.is_empty() {
            ft.buf.push(FULL_TEXT_SEPARATOR);
        }
        ft.pending_boundary = false;
        ft.buf.push_str(text);
    }

    /// Marks an element boundary; the next indexed segment is separated.
    pub fn mark_text_boundary(&mut self) {
        if let Some(ft) = &mut self.full_text {
            ft.pending_boundary = true;
        }
    }

    /// The concatenated text index, when enabled and non-empty.
    pub fn full_text(&self) -> Option<&str> {
        self.full_text
            .as_ref()
            .map(|ft| ft.buf.as_str())
            .filter(|s| !s.is_empty())
    }

    /// Serializes the fragment standalone: the raw content wrapped in a
    /// synthetic `fragment` element carrying the collected namespace
    /// declarations and the inherited `xml:lang`/`xml:base`. The result
    /// parses on its own even when every prefix was originally declared by
    /// an ancestor outside the buffer.
    pub fn standalone_xml(&self) -> String {
        let mut out = String::with_capacity(self.raw_xml.len() + 64);
        out.push_str("<fragment");
        for (alias, uri) in &self.namespace_decls {
            if alias.is_empty() {
                out.push_str(&format!(" xmlns=\"{uri}\""));
            } else {
                out.push_str(&format!(" xmlns:{alias}=\"{uri}\""));
            }
        }
        if let Some(lang) = &self.lang {
            out.push_str(&format!(" xml:lang=\"{lang}\""));
        }
        if let Some(base) = &self.base {
            out.push_str(&format!(" xml:base=\"{base}\""));
        }
        out.push('>');
        out.push_str(&self.raw_xml);
        out.push_str("</fragment>");
        out
    }
}
