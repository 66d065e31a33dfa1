//! A generic catch-all element.
//!
//! [`AnyElement`] binds any element name, keeps every attribute, and
//! declares itself open for arbitrary and mixed content — all unrecognized
//! structure lands in its fragment. Useful as a root for schema-less
//! documents, as a wildcard extension target, and as the permissive root
//! for fuzzing the parser.

use std::borrow::Cow;

use crate::attr::{AttributeConsumer, AttributeMap};
use crate::container::ExtensionContainer;
use crate::error::Result;
use crate::extension::Extension;
use crate::qname::QName;
use crate::registry::ExtensionRegistry;

/// An element with no schema: name, attributes, text, and everything else
/// captured in the container's fragment.
#[derive(Debug, Default)]
pub struct AnyElement {
    name: Option<QName>,
    attrs: AttributeMap,
    text: Option<String>,
    container: ExtensionContainer,
}

impl AnyElement {
    /// A detached instance bound to the given name, for manual construction.
    pub fn named(name: QName) -> Self {
        AnyElement { name: Some(name), ..Self::default() }
    }

    pub fn attributes(&self) -> &AttributeMap {
        &self.attrs
    }

    pub fn attributes_mut(&mut self) -> &mut AttributeMap {
        &mut self.attrs
    }

    pub fn value(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn set_value(&mut self, value: Option<&str>) {
        self.text = value.map(str::to_string);
    }
}

impl Extension for AnyElement {
    fn element_name(&self) -> QName {
        match &self.name {
            Some(name) => name.clone(),
            // Placeholder until the parser hands over the observed root name.
            None => QName::plain("any"),
        }
    }

    fn set_element_name(&mut self, name: QName) {
        self.name = Some(name);
    }

    fn declare_extensions(registry: &mut ExtensionRegistry)
    where
        Self: Sized,
    {
        registry.allow_arbitrary_content::<AnyElement>(true);
        registry.allow_mixed_content::<AnyElement>(true);
    }

    fn consume_attributes(&mut self, attrs: &mut AttributeConsumer<'_>) -> Result<()> {
        for attr in attrs.take_remaining() {
            self.attrs.set(attr.name, attr.value);
        }
        Ok(())
    }

    fn put_attributes(&self, out: &mut AttributeMap) {
        for (name, value) in self.attrs.iter() {
            out.set(name.clone(), value);
        }
    }

    fn consume_text(&mut self, text: &str) -> Result<()> {
        self.text = Some(text.to_string());
        Ok(())
    }

    fn text(&self) -> Option<Cow<'_, str>> {
        self.text.as_deref().map(Cow::Borrowed)
    }

    fn container(&self) -> Option<&ExtensionContainer> {
        Some(&self.container)
    }

    fn container_mut(&mut self) -> Option<&mut ExtensionContainer> {
        Some(&mut self.container)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_construction() {
        let e = AnyElement::named(QName::new("urn:x", "thing"));
        assert_eq!(e.element_name(), QName::new("urn:x", "thing"));
        assert!(e.container().is_some_and(ExtensionContainer::is_empty));
    }

    #[test]
    fn attributes_kept_in_order() {
        use crate::attr::Attribute;
        let raw = vec![
            Attribute::new(QName::plain("b"), "2"),
            Attribute::new(QName::plain("a"), "1"),
        ];
        let mut e = AnyElement::default();
        let mut consumer = AttributeConsumer::new(&raw);
        e.consume_attributes(&mut consumer).unwrap();
        consumer.assert_all_consumed().unwrap();
        let order: Vec<_> = e.attributes().iter().map(|(k, _)| k.local_name.to_string()).collect();
        assert_eq!(order, vec!["b", "a"]);
    }
}
