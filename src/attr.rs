//! Typed attribute codec: ordered construction and checked consumption.
//!
//! [`AttributeMap`] is the generation side — an insertion-ordered builder
//! with typed `set_*` entries. Cleared values keep their slot so attribute
//! order survives a clear-then-set cycle, but suppressed entries are never
//! emitted.
//!
//! [`AttributeConsumer`] is the parse side — typed getters with
//! required/optional semantics, a tolerant boolean vocabulary, enum decoding
//! through an injected token mapping, and consumption tracking so leftover
//! attributes can be flagged with [`Error::UnexpectedAttribute`].
//!
//! Float-Werte verwenden die lexikalischen XSD-Token `INF`, `-INF` und
//! `NaN` (XML Schema Part 2, Section 3.2.4) statt der Rust-Schreibweisen.

use std::borrow::Cow;
use std::fmt;

use crate::error::{Error, Result};
use crate::qname::QName;
use crate::FastIndexMap;

/// A single decoded attribute as delivered by the tokenizer.
///
/// Unprefixed attributes are in no namespace (Namespaces in XML 1.0,
/// Section 6.2), so `name.uri` is empty for the common case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: QName,
    pub value: String,
}

impl Attribute {
    pub fn new(name: QName, value: impl Into<String>) -> Self {
        Attribute { name, value: value.into() }
    }
}

// ============================================================================
// Generation: AttributeMap
// ============================================================================

/// Insertion-ordered attribute builder for the generation side.
///
/// A `None` value is retained positionally and suppressed at emission time,
/// so clearing and later re-setting an attribute does not move it to the end
/// of the tag.
#[derive(Debug, Default, Clone)]
pub struct AttributeMap {
    entries: FastIndexMap<QName, Option<String>>,
}

impl AttributeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a string attribute, claiming an ordered slot on first use.
    pub fn set(&mut self, name: QName, value: impl Into<String>) {
        *self.entries.entry(name).or_insert(None) = Some(value.into());
    }

    /// Clears the value but keeps the slot.
    pub fn clear(&mut self, name: QName) {
        *self.entries.entry(name).or_insert(None) = None;
    }

    /// Sets or clears in one call; `None` keeps the positional slot.
    pub fn set_opt(&mut self, name: QName, value: Option<impl Into<String>>) {
        *self.entries.entry(name).or_insert(None) = value.map(Into::into);
    }

    pub fn set_long(&mut self, name: QName, value: i64) {
        self.set(name, value.to_string());
    }

    pub fn set_bool(&mut self, name: QName, value: bool) {
        self.set(name, if value { "true" } else { "false" });
    }

    pub fn set_float(&mut self, name: QName, value: f32) {
        self.set(name, format_float(f64::from(value)));
    }

    pub fn set_double(&mut self, name: QName, value: f64) {
        self.set(name, format_float(value));
    }

    /// Sets an enum through its token mapping.
    pub fn set_enum<E: AttrEnum>(&mut self, name: QName, value: &E) {
        self.set(name, value.to_token());
    }

    pub fn get(&self, name: &QName) -> Option<&str> {
        self.entries.get(name).and_then(|v| v.as_deref())
    }

    /// Emitted entries in insertion order; suppressed slots are skipped.
    pub fn iter(&self) -> impl Iterator<Item = (&QName, &str)> {
        self.entries
            .iter()
            .filter_map(|(k, v)| v.as_deref().map(|v| (k, v)))
    }

    /// True when nothing would be emitted.
    pub fn is_empty(&self) -> bool {
        self.entries.values().all(Option::is_none)
    }
}

/// Lexical float form: XSD tokens for the non-finite values.
fn format_float(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() { "INF".to_string() } else { "-INF".to_string() }
    } else {
        value.to_string()
    }
}

// ============================================================================
// Enum-Mapping
// ============================================================================

/// Token mapping for enum-valued attributes.
///
/// Decoding normalizes ASCII case before the injected mapping is consulted,
/// so implementations only need to list canonical lowercase tokens.
pub trait AttrEnum: Sized {
    fn to_token(&self) -> &'static str;
    fn from_token(token: &str) -> Option<Self>;
}

// ============================================================================
// Parsing: AttributeConsumer
// ============================================================================

/// Tolerant boolean vocabulary. Anything else is rejected.
fn parse_bool(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true")
        || value == "1"
        || value.eq_ignore_ascii_case("yes")
    {
        Some(true)
    } else if value.eq_ignore_ascii_case("false")
        || value == "0"
        || value.eq_ignore_ascii_case("no")
    {
        Some(false)
    } else {
        None
    }
}

/// Lexical float parse accepting the XSD tokens.
fn parse_double(value: &str) -> Option<f64> {
    match value {
        "INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        v => v.parse().ok(),
    }
}

/// Checked, tracked access to one element's attributes.
///
/// `xml:lang` / `xml:base` / `xmlns` never appear here — the stream engine
/// strips them before handing the rest over. The inherited language and base
/// context is exposed read-only instead.
pub struct AttributeConsumer<'a> {
    attrs: &'a [Attribute],
    consumed: Vec<bool>,
    lang: Option<&'a str>,
    base: Option<&'a str>,
}

impl<'a> AttributeConsumer<'a> {
    pub fn new(attrs: &'a [Attribute]) -> Self {
        AttributeConsumer { attrs, consumed: vec![false; attrs.len()], lang: None, base: None }
    }

    /// Consumer mit vererbtem `xml:lang`/`xml:base`-Kontext (inklusive der
    /// auf diesem Element explizit gesetzten Overrides).
    pub fn with_context(
        attrs: &'a [Attribute],
        lang: Option<&'a str>,
        base: Option<&'a str>,
    ) -> Self {
        AttributeConsumer { attrs, consumed: vec![false; attrs.len()], lang, base }
    }

    /// Effective `xml:lang` for this element (own or inherited).
    pub fn lang(&self) -> Option<&str> {
        self.lang
    }

    /// Effective absolute `xml:base` for this element (own or inherited).
    pub fn base(&self) -> Option<&str> {
        self.base
    }

    fn position(&self, uri: &str, local_name: &str) -> Option<usize> {
        self.attrs
            .iter()
            .position(|a| &*a.name.uri == uri && &*a.name.local_name == local_name)
    }

    /// Optional string attribute in no namespace.
    pub fn get(&mut self, local_name: &str) -> Option<&'a str> {
        self.get_ns("", local_name)
    }

    /// Optional string attribute in the given namespace.
    pub fn get_ns(&mut self, uri: &str, local_name: &str) -> Option<&'a str> {
        let idx = self.position(uri, local_name)?;
        self.consumed[idx] = true;
        Some(&self.attrs[idx].value)
    }

    /// Required string attribute in no namespace.
    pub fn required(&mut self, local_name: &str) -> Result<&'a str> {
        self.get(local_name)
            .ok_or_else(|| Error::MissingAttribute { name: Cow::Owned(local_name.to_string()) })
    }

    fn invalid(&self, idx: usize) -> Error {
        Error::InvalidAttributeValue {
            name: Cow::Owned(self.attrs[idx].name.qualified()),
            value: Cow::Owned(self.attrs[idx].value.clone()),
        }
    }

    fn typed<T>(
        &mut self,
        local_name: &str,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Result<Option<T>> {
        let Some(idx) = self.position("", local_name) else { return Ok(None) };
        self.consumed[idx] = true;
        match parse(&self.attrs[idx].value) {
            Some(v) => Ok(Some(v)),
            None => Err(self.invalid(idx)),
        }
    }

    /// Optional integer attribute; non-integer text is
    /// [`Error::InvalidAttributeValue`].
    pub fn get_long(&mut self, local_name: &str) -> Result<Option<i64>> {
        self.typed(local_name, |v| v.parse().ok())
    }

    pub fn required_long(&mut self, local_name: &str) -> Result<i64> {
        self.get_long(local_name)?
            .ok_or_else(|| Error::MissingAttribute { name: Cow::Owned(local_name.to_string()) })
    }

    /// Optional boolean attribute with the tolerant vocabulary
    /// `true/false/1/0/yes/no` (ASCII case-insensitive).
    pub fn get_bool(&mut self, local_name: &str) -> Result<Option<bool>> {
        self.typed(local_name, parse_bool)
    }

    pub fn required_bool(&mut self, local_name: &str) -> Result<bool> {
        self.get_bool(local_name)?
            .ok_or_else(|| Error::MissingAttribute { name: Cow::Owned(local_name.to_string()) })
    }

    /// Optional double attribute accepting `INF`/`-INF`/`NaN`.
    pub fn get_double(&mut self, local_name: &str) -> Result<Option<f64>> {
        self.typed(local_name, parse_double)
    }

    /// Optional float attribute accepting `INF`/`-INF`/`NaN`.
    pub fn get_float(&mut self, local_name: &str) -> Result<Option<f32>> {
        Ok(self.get_double(local_name)?.map(|v| v as f32))
    }

    /// Optional enum attribute through the injected token mapping.
    pub fn get_enum<E: AttrEnum>(&mut self, local_name: &str) -> Result<Option<E>> {
        self.typed(local_name, |v| {
            E::from_token(v).or_else(|| E::from_token(&v.to_ascii_lowercase()))
        })
    }

    /// Consumes and returns everything not yet claimed, in document order.
    /// Used by catch-all elements that keep arbitrary attributes.
    pub fn take_remaining(&mut self) -> Vec<Attribute> {
        let mut rest = Vec::new();
        for (idx, attr) in self.attrs.iter().enumerate() {
            if !self.consumed[idx] {
                self.consumed[idx] = true;
                rest.push(attr.clone());
            }
        }
        rest
    }

    /// Fails with [`Error::UnexpectedAttribute`] naming the first leftover.
    pub fn assert_all_consumed(&self) -> Result<()> {
        for (idx, attr) in self.attrs.iter().enumerate() {
            if !self.consumed[idx] {
                return Err(Error::UnexpectedAttribute {
                    name: Cow::Owned(attr.name.qualified()),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Debug for AttributeConsumer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeConsumer")
            .field("attrs", &self.attrs.len())
            .field("consumed", &self.consumed.iter().filter(|c| **c).count())
            .finish()
    }
}
