//! Parse entry points: string and reader input over the push engine.
//!
//! Die Events kommen aus `quick-xml` (`NsReader`); der eigentliche Parser
//! ist push-basiert und kann genauso direkt von einer externen Event-Quelle
//! gefuettert werden ([`BindingParser`]). String-Input traegt eine
//! Quellposition an Fehlern; bei Reader-Input gibt es keinen Locator.

use std::io::BufRead;

use log::debug;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{QName as RawName, ResolveResult};
use quick_xml::reader::NsReader;

use crate::any::AnyElement;
use crate::attr::Attribute;
use crate::config::BindConfig;
use crate::error::{Error, Location, ParseError, Result};
use crate::extension::{downcast, Extension};
use crate::qname::{Namespace, QName};
use crate::registry::ExtensionRegistry;

use super::BindingParser;

/// Parses a complete document from a string into a `T` root.
///
/// The registry must already carry `T`'s declarations
/// (`registry.declare::<T>()`); parsing never mutates the registry.
pub fn parse_str<T: Extension + Default>(
    xml: &str,
    registry: &ExtensionRegistry,
    config: &BindConfig,
) -> core::result::Result<T, ParseError> {
    let root = run_str(Box::new(T::default()), false, xml, registry, config)?;
    match downcast::<T>(root) {
        Ok(boxed) => Ok(*boxed),
        Err(_) => unreachable!("the seeded root instance fixes the type"),
    }
}

/// Parses a document with an open root name into an [`AnyElement`].
pub fn parse_str_any(
    xml: &str,
    registry: &ExtensionRegistry,
    config: &BindConfig,
) -> core::result::Result<AnyElement, ParseError> {
    let root = run_str(Box::new(AnyElement::default()), true, xml, registry, config)?;
    match downcast::<AnyElement>(root) {
        Ok(boxed) => Ok(*boxed),
        Err(_) => unreachable!("the seeded root instance fixes the type"),
    }
}

/// Parses a complete document from a buffered byte stream. No source
/// location is attached to failures (the stream has no usable locator).
pub fn parse_reader<T: Extension + Default>(
    input: impl BufRead,
    registry: &ExtensionRegistry,
    config: &BindConfig,
) -> core::result::Result<T, ParseError> {
    let mut parser = BindingParser::new(Box::new(T::default()), registry, config.clone());
    let mut reader = NsReader::from_reader(input);
    reader.config_mut().trim_text(false);
    drive(&mut parser, &mut reader).map_err(ParseError::new)?;
    let root = parser.finish().map_err(ParseError::new)?;
    match downcast::<T>(root) {
        Ok(boxed) => Ok(*boxed),
        Err(_) => unreachable!("the seeded root instance fixes the type"),
    }
}

fn run_str(
    root: Box<dyn Extension>,
    any_root: bool,
    xml: &str,
    registry: &ExtensionRegistry,
    config: &BindConfig,
) -> core::result::Result<Box<dyn Extension>, ParseError> {
    let mut parser = if any_root {
        BindingParser::with_any_root(root, registry, config.clone())
    } else {
        BindingParser::new(root, registry, config.clone())
    };
    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(false);
    if let Err(error) = drive(&mut parser, &mut reader) {
        let offset = reader.buffer_position() as usize;
        let (line, column) = line_col(xml, offset);
        return Err(ParseError::with_location(
            error,
            Location { line, column, element: parser.innermost_open() },
        ));
    }
    let innermost = parser.innermost_open();
    parser.finish().map_err(|error| {
        let (line, column) = line_col(xml, xml.len());
        ParseError::with_location(error, Location { line, column, element: innermost })
    })
}

/// Feeds every tokenizer event into the push engine.
fn drive<R: BufRead>(parser: &mut BindingParser<'_>, reader: &mut NsReader<R>) -> Result<()> {
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let (name, attrs, ns_decls) = convert_start(reader, &e)?;
                parser.start_element(name, attrs, ns_decls)?;
            }
            Ok(Event::Empty(e)) => {
                let (name, attrs, ns_decls) = convert_start(reader, &e)?;
                parser.start_element(name.clone(), attrs, ns_decls)?;
                parser.end_element(&name)?;
            }
            Ok(Event::End(e)) => {
                // End tags need no namespace resolution: matching and the
                // buffered close tag both work on the written prefix form.
                let name = raw_qname(reader, e.name())?;
                parser.end_element(&name)?;
            }
            Ok(Event::Text(e)) => {
                let raw = decode(reader, e.as_ref())?;
                let text =
                    unescape(&raw).map_err(|err| Error::XmlSyntax(err.to_string()))?;
                parser.characters(&text)?;
            }
            Ok(Event::CData(e)) => {
                let text = decode(reader, e.as_ref())?;
                parser.characters(&text)?;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {
                // Comments, PIs, the declaration and the doctype carry no
                // binding information.
                debug!("skipping non-content event");
            }
            Err(err) => return Err(Error::XmlSyntax(err.to_string())),
        }
        buf.clear();
    }
    Ok(())
}

fn decode<'a, R>(reader: &NsReader<R>, bytes: &'a [u8]) -> Result<std::borrow::Cow<'a, str>> {
    reader
        .decoder()
        .decode(bytes)
        .map_err(|err| Error::XmlSyntax(err.to_string()))
}

/// Decodes a name without namespace resolution (prefix and local part only).
fn raw_qname<R>(reader: &NsReader<R>, raw: RawName<'_>) -> Result<QName> {
    let local = decode(reader, raw.local_name().as_ref())?.into_owned();
    let prefix = match raw.prefix() {
        Some(p) => decode(reader, p.as_ref())?.into_owned(),
        None => String::new(),
    };
    Ok(QName::with_prefix("", &local, &prefix))
}

/// Resolves a raw element name against the reader's namespace scope.
fn resolve_name<R>(reader: &NsReader<R>, raw: RawName<'_>) -> Result<QName> {
    let (resolution, local) = reader.resolve_element(raw);
    let uri = match resolution {
        ResolveResult::Bound(ns) => decode(reader, ns.as_ref())?.into_owned(),
        ResolveResult::Unbound => String::new(),
        ResolveResult::Unknown(prefix) => {
            let prefix = String::from_utf8_lossy(&prefix).into_owned();
            return Err(Error::XmlSyntax(format!("unbound namespace prefix '{prefix}'")));
        }
    };
    let local = decode(reader, local.as_ref())?;
    let prefix = match raw.prefix() {
        Some(p) => decode(reader, p.as_ref())?.into_owned(),
        None => String::new(),
    };
    Ok(QName::with_prefix(&uri, &local, &prefix))
}

/// Resolves a raw attribute name; unprefixed attributes are in no namespace.
fn resolve_attr_name<R>(reader: &NsReader<R>, raw: RawName<'_>) -> Result<QName> {
    let (resolution, local) = reader.resolve_attribute(raw);
    let uri = match resolution {
        ResolveResult::Bound(ns) => decode(reader, ns.as_ref())?.into_owned(),
        ResolveResult::Unbound => String::new(),
        ResolveResult::Unknown(prefix) => {
            let prefix = String::from_utf8_lossy(&prefix).into_owned();
            return Err(Error::XmlSyntax(format!("unbound namespace prefix '{prefix}'")));
        }
    };
    let local = decode(reader, local.as_ref())?;
    let prefix = match raw.prefix() {
        Some(p) => decode(reader, p.as_ref())?.into_owned(),
        None => String::new(),
    };
    Ok(QName::with_prefix(&uri, &local, &prefix))
}

/// Splits a start tag into resolved name, regular attributes, and the
/// namespace declarations made on the element.
fn convert_start<R>(
    reader: &NsReader<R>,
    e: &BytesStart<'_>,
) -> Result<(QName, Vec<Attribute>, Vec<Namespace>)> {
    let name = resolve_name(reader, e.name())?;
    let mut attrs = Vec::new();
    let mut ns_decls = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| Error::XmlSyntax(err.to_string()))?;
        let value = attr
            .decode_and_unescape_value(reader.decoder())
            .map_err(|err| Error::XmlSyntax(err.to_string()))?;
        let key_bytes = attr.key.as_ref();
        if key_bytes == b"xmlns" || key_bytes.starts_with(b"xmlns:") {
            let alias = if key_bytes.len() > 6 {
                decode(reader, &key_bytes[6..])?.into_owned()
            } else {
                String::new()
            };
            ns_decls.push(Namespace::new(&alias, &value));
            continue;
        }
        let key = resolve_attr_name(reader, attr.key)?;
        attrs.push(Attribute::new(key, value.into_owned()));
    }
    Ok((name, attrs, ns_decls))
}

/// 1-based line/column of a byte offset, for string input.
fn line_col(input: &str, offset: usize) -> (u64, u64) {
    let clamped = offset.min(input.len());
    let before = &input.as_bytes()[..clamped];
    let line = memchr::memchr_iter(b'\n', before).count() as u64 + 1;
    let line_start = memchr::memrchr(b'\n', before).map(|p| p + 1).unwrap_or(0);
    let column = (clamped - line_start) as u64 + 1;
    (line, column)
}
