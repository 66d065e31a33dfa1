//! Streaming XML output: the element writer the generation side runs on.
//!
//! Start tags are held open until the first piece of content arrives, so an
//! element without content collapses to `<a/>` and late namespace
//! declarations (fragment context) still land on the tag that needs them.
//! Prefix-Deklarationen werden gegen den Stack der offenen Elemente
//! dedupliziert; fehlende Bindungen fuer Attribut-Namespaces werden
//! synthetisiert (`ns0`, `ns1`, ...).
//!
//! Repeating-group markers carry no bytes of their own; they exist so a
//! serializer variant can group repeated siblings (the pretty writer keeps
//! them contiguous) and so unbalanced generation is caught early.

use std::borrow::Cow;
use std::io::Write;

use memchr::{memchr, memchr3};

use crate::attr::AttributeMap;
use crate::error::{Error, Result};
use crate::extension::Extension;
use crate::qname::{Namespace, QName, XML_URI};

// ============================================================================
// Escaping
// ============================================================================

/// Escapes character data (`&`, `<`, `>`).
pub(crate) fn escape_text(s: &str) -> Cow<'_, str> {
    if memchr3(b'&', b'<', b'>', s.as_bytes()).is_none() {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Escapes an attribute value for double-quoted output.
pub(crate) fn escape_attr(s: &str) -> Cow<'_, str> {
    let bytes = s.as_bytes();
    if memchr3(b'&', b'<', b'"', bytes).is_none() && memchr(b'>', bytes).is_none() {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

// ============================================================================
// ElementWriter
// ============================================================================

struct Open {
    /// Tag name exactly as written, reused for the end tag.
    tag: String,
    decls: Vec<Namespace>,
    had_element: bool,
    had_text: bool,
}

/// Structured XML writer over any [`Write`] sink.
pub struct ElementWriter<'w> {
    out: &'w mut dyn Write,
    stack: Vec<Open>,
    pending_open: bool,
    predeclared: Vec<Namespace>,
    repeat_depth: usize,
    synthetic_counter: usize,
    /// Indent width; `None` = compact output.
    pretty: Option<usize>,
    wrote_element: bool,
}

impl<'w> ElementWriter<'w> {
    pub fn new(out: &'w mut dyn Write) -> Self {
        ElementWriter {
            out,
            stack: Vec::new(),
            pending_open: false,
            predeclared: Vec::new(),
            repeat_depth: 0,
            synthetic_counter: 0,
            pretty: None,
            wrote_element: false,
        }
    }

    /// Pretty-printing variant with the given indent width.
    pub fn pretty(out: &'w mut dyn Write, indent: usize) -> Self {
        ElementWriter { pretty: Some(indent), ..ElementWriter::new(out) }
    }

    /// Namespaces to declare on the next (root) start tag, typically
    /// [`ExtensionRegistry::namespaces_in_use`](crate::registry::ExtensionRegistry::namespaces_in_use).
    pub fn predeclare_namespaces(&mut self, namespaces: Vec<Namespace>) {
        self.predeclared = namespaces;
    }

    /// Writes the XML declaration; only valid before any element.
    pub fn xml_declaration(&mut self) -> Result<()> {
        if self.wrote_element {
            return Err(Error::Generate("XML declaration after content".into()));
        }
        self.write_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>")?;
        if self.pretty.is_some() {
            self.write_str("\n")?;
        }
        Ok(())
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    fn write_str(&mut self, s: &str) -> Result<()> {
        self.out.write_all(s.as_bytes())?;
        Ok(())
    }

    fn close_pending(&mut self) -> Result<()> {
        if self.pending_open {
            self.pending_open = false;
            self.write_str(">")?;
        }
        Ok(())
    }

    fn newline_indent(&mut self, level: usize) -> Result<()> {
        let Some(width) = self.pretty else { return Ok(()) };
        let mut s = String::with_capacity(1 + level * width);
        s.push('\n');
        for _ in 0..level * width {
            s.push(' ');
        }
        self.write_str(&s)
    }

    /// True when the alias is bound to the URI by an open element (the
    /// implicit `xml` binding counts).
    fn in_scope(&self, alias: &str, uri: &str) -> bool {
        if alias == "xml" && uri == XML_URI {
            return true;
        }
        self.stack
            .iter()
            .rev()
            .flat_map(|open| open.decls.iter())
            .any(|ns| &*ns.alias == alias && &*ns.uri == uri)
    }

    /// True when the alias is bound to anything at all in scope.
    fn alias_taken(&self, alias: &str, decls: &[Namespace]) -> bool {
        decls.iter().any(|ns| &*ns.alias == alias)
            || self
                .stack
                .iter()
                .flat_map(|open| open.decls.iter())
                .any(|ns| &*ns.alias == alias)
    }

    fn push_decl(&self, decls: &mut Vec<Namespace>, alias: &str, uri: &str) {
        if decls.iter().any(|ns| &*ns.alias == alias && &*ns.uri == uri) {
            return;
        }
        if self.in_scope(alias, uri) {
            return;
        }
        decls.push(Namespace::new(alias, uri));
    }

    /// Resolves the written form of an attribute name, synthesizing a prefix
    /// declaration when the attribute's namespace has no usable binding.
    /// Unprefixed attributes never pick up the default namespace
    /// (Namespaces in XML 1.0, Section 6.2).
    fn attr_name(&mut self, name: &QName, decls: &mut Vec<Namespace>) -> String {
        if name.uri.is_empty() {
            return name.local_name.to_string();
        }
        if name.is_xml() {
            return format!("xml:{}", name.local_name);
        }
        if let Some(prefix) = name.prefix.as_deref().filter(|p| !p.is_empty()) {
            self.push_decl(decls, prefix, &name.uri);
            return format!("{prefix}:{}", name.local_name);
        }
        // Vorhandene nicht-leere Bindung wiederverwenden.
        let bound = decls
            .iter()
            .chain(self.stack.iter().flat_map(|open| open.decls.iter()))
            .find(|ns| ns.uri == name.uri && !ns.alias.is_empty())
            .map(|ns| ns.alias.to_string());
        if let Some(alias) = bound {
            return format!("{alias}:{}", name.local_name);
        }
        let alias = loop {
            let candidate = format!("ns{}", self.synthetic_counter);
            self.synthetic_counter += 1;
            if !self.alias_taken(&candidate, decls) {
                break candidate;
            }
        };
        decls.push(Namespace::new(&alias, &name.uri));
        format!("{alias}:{}", name.local_name)
    }

    /// Opens an element. `extra_ns` carries declarations that must live on
    /// this tag (fragment context, pre-declared root namespaces); bindings
    /// already in scope are suppressed.
    pub fn start_element(
        &mut self,
        name: &QName,
        attrs: &AttributeMap,
        extra_ns: &[Namespace],
    ) -> Result<()> {
        self.close_pending()?;
        let level = self.stack.len();
        if let Some(parent) = self.stack.last_mut() {
            parent.had_element = true;
        }
        if self.wrote_element || level > 0 {
            self.newline_indent(level)?;
        }

        let mut decls: Vec<Namespace> = Vec::new();
        for ns in std::mem::take(&mut self.predeclared) {
            self.push_decl(&mut decls, &ns.alias, &ns.uri);
        }
        for ns in extra_ns {
            self.push_decl(&mut decls, &ns.alias, &ns.uri);
        }

        // Binding for the element's own name.
        let tag = match name.prefix.as_deref().filter(|p| !p.is_empty()) {
            Some(prefix) => {
                if !name.uri.is_empty() {
                    self.push_decl(&mut decls, prefix, &name.uri);
                }
                format!("{prefix}:{}", name.local_name)
            }
            None => {
                if !name.uri.is_empty() {
                    // Unprefixed name in a namespace rides the default binding.
                    self.push_decl(&mut decls, "", &name.uri);
                }
                name.local_name.to_string()
            }
        };

        let mut buf = String::with_capacity(32);
        buf.push('<');
        buf.push_str(&tag);
        // Attribute names may synthesize further declarations; resolve them
        // before the declarations are serialized.
        let mut attr_parts: Vec<(String, String)> = Vec::new();
        for (attr, value) in attrs.iter() {
            let written = self.attr_name(attr, &mut decls);
            attr_parts.push((written, escape_attr(value).into_owned()));
        }
        for ns in &decls {
            if ns.alias.is_empty() {
                buf.push_str(&format!(" xmlns=\"{}\"", escape_attr(&ns.uri)));
            } else {
                buf.push_str(&format!(" xmlns:{}=\"{}\"", ns.alias, escape_attr(&ns.uri)));
            }
        }
        for (written, value) in &attr_parts {
            buf.push_str(&format!(" {written}=\"{value}\""));
        }
        self.write_str(&buf)?;

        self.stack.push(Open { tag, decls, had_element: false, had_text: false });
        self.pending_open = true;
        self.wrote_element = true;
        Ok(())
    }

    /// Element plus attributes plus optional text in one call.
    pub fn simple_element(
        &mut self,
        name: &QName,
        attrs: &AttributeMap,
        text: Option<&str>,
    ) -> Result<()> {
        self.start_element(name, attrs, &[])?;
        if let Some(text) = text {
            self.characters(text)?;
        }
        self.end_element()
    }

    /// Escaped character data.
    pub fn characters(&mut self, text: &str) -> Result<()> {
        if self.stack.is_empty() {
            return Err(Error::Generate("character data outside the root element".into()));
        }
        self.close_pending()?;
        if let Some(open) = self.stack.last_mut() {
            open.had_text = true;
        }
        let escaped = escape_text(text).into_owned();
        self.write_str(&escaped)
    }

    /// Splices already-serialized fragment content verbatim. The caller is
    /// responsible for having its namespace context declared in scope.
    pub fn raw_fragment(&mut self, raw: &str) -> Result<()> {
        if self.stack.is_empty() {
            return Err(Error::Generate("fragment content outside the root element".into()));
        }
        self.close_pending()?;
        if let Some(open) = self.stack.last_mut() {
            open.had_element = true;
        }
        self.write_str(raw)
    }

    /// Marks the start of a contiguous group of repeated siblings.
    pub fn start_repeating_element(&mut self) -> Result<()> {
        self.repeat_depth += 1;
        Ok(())
    }

    pub fn end_repeating_element(&mut self) -> Result<()> {
        if self.repeat_depth == 0 {
            return Err(Error::Generate("end of repeating group without start".into()));
        }
        self.repeat_depth -= 1;
        Ok(())
    }

    pub fn end_element(&mut self) -> Result<()> {
        let open = self
            .stack
            .pop()
            .ok_or(Error::Generate(Cow::Borrowed("end_element without open element")))?;
        if self.pending_open {
            self.pending_open = false;
            self.write_str("/>")?;
        } else {
            if open.had_element && !open.had_text {
                self.newline_indent(self.stack.len())?;
            }
            let close = format!("</{}>", open.tag);
            self.write_str(&close)?;
        }
        Ok(())
    }

    /// Verifies balanced output. Call once after the last element.
    pub fn finish(&mut self) -> Result<()> {
        if !self.stack.is_empty() {
            return Err(Error::Generate("unclosed elements at end of output".into()));
        }
        if self.repeat_depth != 0 {
            return Err(Error::Generate("unclosed repeating group at end of output".into()));
        }
        self.out.flush()?;
        Ok(())
    }
}

// ============================================================================
// Dokument-APIs
// ============================================================================

/// Serializes a bound object tree as a complete document. The root element
/// pre-declares every namespace the registry knows for the root type, so
/// nested extensions never re-declare their prefixes.
pub fn generate_document(
    root: &dyn Extension,
    registry: &crate::registry::ExtensionRegistry,
    out: &mut dyn Write,
    config: &crate::config::BindConfig,
) -> Result<()> {
    let mut w = match config.pretty_indent() {
        Some(width) => ElementWriter::pretty(out, width),
        None => ElementWriter::new(out),
    };
    if config.xml_declaration() {
        w.xml_declaration()?;
    }
    let root_type = (root as &dyn std::any::Any).type_id();
    w.predeclare_namespaces(registry.namespaces_in_use(root_type));
    root.generate(&mut w, registry)?;
    w.finish()
}

/// [`generate_document`] into a string.
pub fn to_xml_string(
    root: &dyn Extension,
    registry: &crate::registry::ExtensionRegistry,
    config: &crate::config::BindConfig,
) -> Result<String> {
    let mut buf = Vec::new();
    generate_document(root, registry, &mut buf, config)?;
    String::from_utf8(buf).map_err(|_| Error::Generate("generated XML is not valid UTF-8".into()))
}
