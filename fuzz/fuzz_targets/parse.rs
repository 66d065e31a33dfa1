#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else { return };
    let mut registry = xbind::ExtensionRegistry::new();
    registry.declare::<xbind::AnyElement>();
    let config = xbind::BindConfig::default().with_full_text_index(true);
    let _ = xbind::parse_str_any(text, &registry, &config);
});
