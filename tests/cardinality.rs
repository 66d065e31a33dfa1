//! Cardinality, requiredness, aggregate merge, and error-path tests.

use std::any::TypeId;
use std::borrow::Cow;

use xbind::*;

include!("common/vocab.rs");

fn no_decl() -> BindConfig {
    BindConfig::default().with_xml_declaration(false)
}

/// Two siblings of a non-repeating, non-aggregate type are a duplicate.
#[test]
fn duplicate_non_repeating_fails() {
    let registry = test_registry();
    let xml = "<cat:catalog xmlns:cat=\"urn:example:catalog\">\
               <cat:priority level=\"1\"/><cat:priority level=\"2\"/></cat:catalog>";
    let err = parse_str::<Catalog>(xml, &registry, &no_decl()).unwrap_err();
    assert_eq!(
        *err.error(),
        Error::DuplicateExtension { name: "cat:priority".into() }
    );
}

/// Repeatable siblings form an ordered list in source order.
#[test]
fn repeatable_preserves_source_order() {
    let registry = test_registry();
    let xml = "<cat:catalog xmlns:cat=\"urn:example:catalog\"><cat:label>red</cat:label>\
               <cat:label>green</cat:label><cat:label>blue</cat:label></cat:catalog>";
    let catalog: Catalog = parse_str(xml, &registry, &no_decl()).unwrap();
    let labels: Vec<&str> = catalog
        .container
        .repeating::<Label>()
        .map(|l| l.value.as_str())
        .collect();
    assert_eq!(labels, vec!["red", "green", "blue"]);
}

/// Aggregate siblings merge onto one instance; per attribute the last
/// occurrence wins, untouched attributes survive.
#[test]
fn aggregate_merges_attributes() {
    let registry = test_registry();
    let xml = "<cat:catalog xmlns:cat=\"urn:example:catalog\">\
               <cat:settings width=\"100\" access=\"public\"/>\
               <cat:settings width=\"200\" height=\"50\"/></cat:catalog>";
    let catalog: Catalog = parse_str(xml, &registry, &no_decl()).unwrap();
    let settings = catalog.container.get::<Settings>().unwrap();
    assert_eq!(settings.width, Some(200));
    assert_eq!(settings.height, Some(50));
    assert_eq!(settings.access.as_deref(), Some("public"));
    // Exactly one instance, no repeating group.
    assert!(catalog
        .container
        .get_repeating(TypeId::of::<Settings>())
        .is_empty());
}

/// Requiredness is checked when the owning element closes, not earlier —
/// observable through the push API.
#[test]
fn required_validation_runs_at_close() {
    let registry = test_registry();
    let mut parser = BindingParser::new(
        Box::new(Owner::default()),
        &registry,
        BindConfig::default(),
    );
    let owner_name = QName::with_prefix(MEDIA_URI, "owner", "med");
    parser.start_element(owner_name.clone(), vec![], vec![]).unwrap();
    // Still open: the missing <med:name> is not an error yet.
    let err = parser.end_element(&owner_name).unwrap_err();
    assert_eq!(
        err,
        Error::MissingRequiredExtension {
            namespace: MEDIA_URI.into(),
            local_name: "name".into(),
        }
    );
}

#[test]
fn required_satisfied() {
    let registry = test_registry();
    let xml = "<med:owner xmlns:med=\"urn:example:media\"><med:name>ada</med:name></med:owner>";
    let owner: Owner = parse_str(xml, &registry, &no_decl()).unwrap();
    assert_eq!(owner.container.get::<Name>().unwrap().value, "ada");
}

/// Required validation applies per nesting level: a nested owner inside a
/// catalog fails on its own close.
#[test]
fn nested_required_validation() {
    let registry = test_registry();
    let xml = "<cat:catalog xmlns:cat=\"urn:example:catalog\" \
               xmlns:med=\"urn:example:media\"><med:owner/></cat:catalog>";
    let err = parse_str::<Catalog>(xml, &registry, &no_decl()).unwrap_err();
    assert_eq!(
        *err.error(),
        Error::MissingRequiredExtension {
            namespace: MEDIA_URI.into(),
            local_name: "name".into(),
        }
    );
}

/// A descriptor without a factory cannot construct instances.
#[test]
fn descriptor_without_factory_fails() {
    let mut registry = ExtensionRegistry::new();
    registry.declare::<Strict>();
    registry.register::<Strict>(ExtensionDescriptor::declared_only::<VideoItem>(
        &catalog_ns(),
        "video",
    ));
    let xml = "<cat:strict xmlns:cat=\"urn:example:catalog\"><cat:video/></cat:strict>";
    let err = parse_str::<Strict>(xml, &registry, &no_decl()).unwrap_err();
    assert!(matches!(err.error(), Error::CannotCreateExtension { .. }));
}

#[test]
fn attribute_error_paths() {
    let registry = test_registry();
    let base = "<cat:catalog xmlns:cat=\"urn:example:catalog\">";

    let xml = format!("{base}<cat:priority level=\"high\"/></cat:catalog>");
    let err = parse_str::<Catalog>(&xml, &registry, &no_decl()).unwrap_err();
    assert_eq!(
        *err.error(),
        Error::InvalidAttributeValue { name: "level".into(), value: "high".into() }
    );

    let xml = format!("{base}<cat:priority/></cat:catalog>");
    let err = parse_str::<Catalog>(&xml, &registry, &no_decl()).unwrap_err();
    assert_eq!(*err.error(), Error::MissingAttribute { name: "level".into() });

    let xml = format!("{base}<cat:priority level=\"1\" nope=\"x\"/></cat:catalog>");
    let err = parse_str::<Catalog>(&xml, &registry, &no_decl()).unwrap_err();
    assert_eq!(*err.error(), Error::UnexpectedAttribute { name: "nope".into() });
}

/// Character data on a children-only container is rejected at close.
#[test]
fn text_not_allowed_without_mixed_content() {
    let registry = test_registry();
    let xml = "<cat:catalog xmlns:cat=\"urn:example:catalog\">loose text</cat:catalog>";
    let err = parse_str::<Catalog>(xml, &registry, &no_decl()).unwrap_err();
    assert_eq!(
        *err.error(),
        Error::TextNotAllowed { element: "cat:catalog".into() }
    );

    // Whitespace between children is insignificant and dropped.
    let xml = "<cat:catalog xmlns:cat=\"urn:example:catalog\">\n  \
               <cat:priority level=\"1\"/>\n</cat:catalog>";
    parse_str::<Catalog>(xml, &registry, &no_decl()).unwrap();
}

/// A relative `xml:base` with no absolute base in scope is unresolvable.
#[test]
fn relative_base_without_anchor_fails() {
    let registry = test_registry();
    let xml = "<cat:catalog xmlns:cat=\"urn:example:catalog\" xml:base=\"rel/\"/>";
    let err = parse_str::<Catalog>(xml, &registry, &no_decl()).unwrap_err();
    assert_eq!(*err.error(), Error::InvalidUri { value: "rel/".into() });
}

/// The root element must match the seeded instance.
#[test]
fn root_name_mismatch() {
    let registry = test_registry();
    let xml = "<cat:other xmlns:cat=\"urn:example:catalog\"/>";
    let err = parse_str::<Catalog>(xml, &registry, &no_decl()).unwrap_err();
    assert!(matches!(err.error(), Error::UnrecognizedElement { .. }));
}

/// Two-phase adaptation: parse generic, adapt by marker afterwards.
#[test]
fn adaptation_selects_variant() {
    let registry = test_registry();
    let xml = "<cat:catalog xmlns:cat=\"urn:example:catalog\">\
               <cat:item kind=\"video\" caption=\"intro\"/></cat:catalog>";
    let mut catalog: Catalog = parse_str(xml, &registry, &no_decl()).unwrap();
    let generic = catalog
        .container
        .take(TypeId::of::<GenericItem>())
        .expect("item parsed generically");
    let adapted = registry.adapt(generic).unwrap();
    let video = downcast_ref::<VideoItem>(&*adapted).expect("video variant selected");
    assert_eq!(video.caption.as_deref(), Some("intro"));
}

/// An unregistered marker keeps the generic type.
#[test]
fn adaptation_falls_back_to_generic() {
    let registry = test_registry();
    let xml = "<cat:catalog xmlns:cat=\"urn:example:catalog\">\
               <cat:item kind=\"audio\"/></cat:catalog>";
    let mut catalog: Catalog = parse_str(xml, &registry, &no_decl()).unwrap();
    let generic = catalog.container.take(TypeId::of::<GenericItem>()).unwrap();
    let kept = registry.adapt(generic).unwrap();
    assert!(downcast_ref::<GenericItem>(&*kept).is_some());
}

/// Push-API misuse surfaces as syntax errors rather than silence.
#[test]
fn push_api_document_shape() {
    let registry = test_registry();

    // Unclosed root at finish.
    let mut parser = BindingParser::new(
        Box::new(Strict::default()),
        &registry,
        BindConfig::default(),
    );
    let root = QName::with_prefix(CATALOG_URI, "strict", "cat");
    parser.start_element(root.clone(), vec![], vec![]).unwrap();
    assert!(matches!(parser.finish().err().unwrap(), Error::XmlSyntax(_)));

    // A second root element.
    let mut parser = BindingParser::new(
        Box::new(Strict::default()),
        &registry,
        BindConfig::default(),
    );
    parser.start_element(root.clone(), vec![], vec![]).unwrap();
    parser.end_element(&root).unwrap();
    assert!(matches!(
        parser.start_element(root.clone(), vec![], vec![]).unwrap_err(),
        Error::XmlSyntax(_)
    ));
}
