//! Qualified names and namespace bindings (Namespaces in XML 1.0).
//!
//! A [`QName`] is the triple of namespace URI, local name and optional
//! prefix. Two qnames are equal when URI and local name are equal; the
//! prefix is presentation only (Namespaces in XML 1.0, Section 4) and never
//! participates in equality or hashing.
//!
//! Komponenten sind `Rc<str>`: QNames werden zwischen Registry, Container
//! und Parser-Stack geteilt, Klonen ist dadurch nur ein Refcount-Increment.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// The `xml` namespace, implicitly bound to the `xml` prefix
/// (Namespaces in XML 1.0, Section 3).
pub const XML_URI: &str = "http://www.w3.org/XML/1998/namespace";

/// The `xmlns` reserved namespace (never user-declarable).
pub const XMLNS_URI: &str = "http://www.w3.org/2000/xmlns/";

/// A namespace binding: alias (prefix) plus URI.
///
/// An empty alias denotes the default namespace (`xmlns="..."`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    pub alias: Rc<str>,
    pub uri: Rc<str>,
}

impl Namespace {
    pub fn new(alias: &str, uri: &str) -> Self {
        Namespace { alias: Rc::from(alias), uri: Rc::from(uri) }
    }

    /// True for `xmlns="..."` (no alias).
    pub fn is_default(&self) -> bool {
        self.alias.is_empty()
    }
}

/// A qualified XML name.
#[derive(Debug, Clone)]
pub struct QName {
    /// Namespace URI; empty for names in no namespace.
    pub uri: Rc<str>,
    /// Local part.
    pub local_name: Rc<str>,
    /// Prefix as written in the document, if any. Presentation only.
    pub prefix: Option<Rc<str>>,
}

impl QName {
    pub fn new(uri: &str, local_name: &str) -> Self {
        QName { uri: Rc::from(uri), local_name: Rc::from(local_name), prefix: None }
    }

    pub fn with_prefix(uri: &str, local_name: &str, prefix: &str) -> Self {
        QName {
            uri: Rc::from(uri),
            local_name: Rc::from(local_name),
            prefix: if prefix.is_empty() { None } else { Some(Rc::from(prefix)) },
        }
    }

    /// A name in no namespace, without prefix.
    pub fn plain(local_name: &str) -> Self {
        QName::new("", local_name)
    }

    /// True if this name lives in the reserved `xml` namespace
    /// (`xml:lang`, `xml:base`, `xml:space`).
    pub fn is_xml(&self) -> bool {
        &*self.uri == XML_URI
    }

    /// `prefix:local` as written, or just the local name.
    pub fn qualified(&self) -> String {
        match &self.prefix {
            Some(p) if !p.is_empty() => format!("{p}:{}", self.local_name),
            _ => self.local_name.to_string(),
        }
    }

    /// Clark notation `{uri}local`, or the bare local name when the URI is
    /// empty. Used in diagnostics where the prefix is unknown.
    pub fn clark(&self) -> String {
        if self.uri.is_empty() {
            self.local_name.to_string()
        } else {
            format!("{{{}}}{}", self.uri, self.local_name)
        }
    }

    /// Diagnostic form: prefixed if a prefix is known, Clark notation else.
    pub fn display_name(&self) -> String {
        if self.prefix.is_some() {
            self.qualified()
        } else {
            self.clark()
        }
    }
}

impl PartialEq for QName {
    fn eq(&self, other: &Self) -> bool {
        self.uri == other.uri && self.local_name == other.local_name
    }
}

impl Eq for QName {}

impl Hash for QName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.uri.hash(state);
        self.local_name.hash(state);
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(p) if !p.is_empty() => write!(f, "{p}:{}", self.local_name),
            _ => write!(f, "{}", self.local_name),
        }
    }
}

// ============================================================================
// Registry-Schluessel
// ============================================================================

/// Local-name part of a registry key: a concrete name or the `*` catch-all.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LocalKey {
    Name(Rc<str>),
    /// Matches any local name within the namespace.
    Any,
}

impl LocalKey {
    pub fn name(s: &str) -> Self {
        if s == "*" { LocalKey::Any } else { LocalKey::Name(Rc::from(s)) }
    }
}

/// Lookup key for extension registrations: (namespace URI, local name or `*`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NameKey {
    pub uri: Rc<str>,
    pub local: LocalKey,
}

impl NameKey {
    pub fn exact(uri: &str, local_name: &str) -> Self {
        NameKey { uri: Rc::from(uri), local: LocalKey::Name(Rc::from(local_name)) }
    }

    pub fn wildcard(uri: &str) -> Self {
        NameKey { uri: Rc::from(uri), local: LocalKey::Any }
    }
}
