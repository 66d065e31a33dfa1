#![no_main]
use libfuzzer_sys::fuzz_target;

// Generation must be a fixpoint: whatever parses also re-parses from its
// own serialized form, and serializing again changes nothing.
fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else { return };
    let mut registry = xbind::ExtensionRegistry::new();
    registry.declare::<xbind::AnyElement>();
    let config = xbind::BindConfig::default().with_xml_declaration(false);

    let Ok(doc) = xbind::parse_str_any(text, &registry, &config) else { return };
    let first = xbind::to_xml_string(&doc, &registry, &config).expect("generate parsed document");
    let again = xbind::parse_str_any(&first, &registry, &config).expect("re-parse own output");
    let second = xbind::to_xml_string(&again, &registry, &config).expect("generate re-parsed document");
    assert_eq!(first, second);
});
