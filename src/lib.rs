//! xbind – extensible XML object binding with lossless round-trip
//!
//! A single-pass parser/generator pair that projects XML documents onto
//! typed Rust objects. Sub-elements are dispatched through an
//! [`ExtensionRegistry`] keyed by (namespace, local name) with cardinality
//! and requiredness rules; anything a container has no registration for is
//! captured verbatim — including its namespace declarations and inherited
//! `xml:lang`/`xml:base` context — and replayed on output.
//!
//! # Beispiel
//!
//! ```
//! use xbind::{parse_str_any, to_xml_string, AnyElement, BindConfig, Extension, ExtensionRegistry};
//!
//! let mut registry = ExtensionRegistry::new();
//! registry.declare::<AnyElement>();
//!
//! let config = BindConfig::default().with_xml_declaration(false);
//! let doc = parse_str_any(
//!     "<note xmlns:m=\"urn:m\" lane=\"4\"><m:tag>keep</m:tag></note>",
//!     &registry,
//!     &config,
//! ).unwrap();
//!
//! // The unregistered child survived verbatim in the fragment.
//! let fragment = doc.container().unwrap().fragment().unwrap();
//! assert_eq!(fragment.raw_xml(), "<m:tag>keep</m:tag>");
//!
//! let xml = to_xml_string(&doc, &registry, &config).unwrap();
//! assert_eq!(xml, "<note xmlns:m=\"urn:m\" lane=\"4\"><m:tag>keep</m:tag></note>");
//! ```

pub mod adapt;
pub mod any;
pub mod attr;
pub mod config;
pub mod container;
pub mod error;
pub mod extension;
pub mod fragment;
pub mod parser;
pub mod qname;
pub mod registry;
pub mod uri;
pub mod writer;

pub use error::{Error, Location, ParseError, Result};

/// HashMap mit ahash (schneller, nicht DoS-resistent — fuer interne
/// Datenstrukturen). Nutzt hashbrown direkt.
pub(crate) type FastHashMap<K, V> = hashbrown::HashMap<K, V, ahash::RandomState>;

/// IndexMap mit ahash (deterministische Iteration + schnelles Hashing).
pub(crate) type FastIndexMap<K, V> = indexmap::IndexMap<K, V, ahash::RandomState>;

// Public API: Namen und Attribute
pub use attr::{AttrEnum, Attribute, AttributeConsumer, AttributeMap};
pub use qname::{Namespace, QName};

// Public API: Objektmodell
pub use any::AnyElement;
pub use container::{visit, ExtensionContainer, InstanceId};
pub use extension::{downcast, downcast_mut, downcast_ref, Extension, ExtensionVisitor, VisitFlow};
pub use fragment::FragmentBuffer;
pub use registry::{ExtensionDescriptor, ExtensionRegistry, TypeRef};

// Public API: Parser/Generator
pub use config::BindConfig;
pub use parser::{parse_reader, parse_str, parse_str_any, BindingParser};
pub use writer::{generate_document, to_xml_string, ElementWriter};

// Public API: Subtyp-Adaption
pub use adapt::{AdaptFn, AdaptTable, Shared};
