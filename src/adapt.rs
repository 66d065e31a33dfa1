//! Two-phase dynamic subtype adaptation.
//!
//! Some vocabularies select a more specific object type based on a runtime
//! category marker that is only known mid-parse (a `kind` term, a category
//! scheme). Instead of switching handlers on the fly, parsing always builds
//! the generic type; a separate, explicit adapt step then consults a
//! tagged-variant table keyed by (base type, observed marker) and converts
//! the finished generic instance into the most specific registered variant.
//! Kein Laufzeit-Reflection-Mechanismus — nur eine Funktionstabelle.
//!
//! Adapted views that share one logical record model that record as a
//! [`Shared`] handle: one owned state struct, many thin facades.

use std::any::TypeId;
use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use crate::error::Result;
use crate::extension::Extension;
use crate::FastHashMap;

/// Converts a finished generic instance into a specific variant.
///
/// The adaptor owns the generic box and may take it apart; on failure the
/// instance is lost, so adaptors should only fail on genuinely broken state.
pub type AdaptFn = fn(Box<dyn Extension>) -> Result<Box<dyn Extension>>;

/// Variant table: (base type, kind marker) → adaptor.
#[derive(Debug, Default)]
pub struct AdaptTable {
    variants: FastHashMap<(TypeId, Box<str>), AdaptFn>,
}

impl AdaptTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, base: TypeId, kind: &str, adaptor: AdaptFn) {
        self.variants.insert((base, Box::from(kind)), adaptor);
    }

    /// Runs the matching adaptor, if any. A generic instance without a
    /// marker, or with an unregistered marker, passes through unchanged —
    /// staying generic is the defined fallback, not an error.
    pub fn adapt(&self, generic: Box<dyn Extension>) -> Result<Box<dyn Extension>> {
        let Some(kind) = generic.adaptation_kind() else {
            return Ok(generic);
        };
        let base = (&*generic as &dyn std::any::Any).type_id();
        match self.variants.get(&(base, Box::from(kind.as_str()))) {
            Some(adaptor) => adaptor(generic),
            None => Ok(generic),
        }
    }
}

// ============================================================================
// Shared state handle
// ============================================================================

/// Reference-counted handle to one owned state record.
///
/// Several typed facades over the same logical object hold clones of the
/// same `Shared`; mutations through any facade are visible through all.
#[derive(Debug, Default)]
pub struct Shared<S> {
    state: Rc<RefCell<S>>,
}

impl<S> Shared<S> {
    pub fn new(state: S) -> Self {
        Shared { state: Rc::new(RefCell::new(state)) }
    }

    pub fn borrow(&self) -> Ref<'_, S> {
        self.state.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, S> {
        self.state.borrow_mut()
    }
}

impl<S> Clone for Shared<S> {
    fn clone(&self) -> Self {
        Shared { state: Rc::clone(&self.state) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qname::QName;

    #[derive(Default)]
    struct GenericEntry {
        kind: Option<String>,
        title: String,
    }

    impl Extension for GenericEntry {
        fn element_name(&self) -> QName {
            QName::new("urn:a", "entry")
        }
        fn adaptation_kind(&self) -> Option<String> {
            self.kind.clone()
        }
    }

    struct PhotoEntry {
        title: String,
    }

    impl Extension for PhotoEntry {
        fn element_name(&self) -> QName {
            QName::new("urn:a", "entry")
        }
    }

    fn to_photo(generic: Box<dyn Extension>) -> Result<Box<dyn Extension>> {
        let generic = crate::extension::downcast::<GenericEntry>(generic)
            .unwrap_or_else(|_| unreachable!("registered for GenericEntry only"));
        Ok(Box::new(PhotoEntry { title: generic.title }))
    }

    #[test]
    fn adapts_by_marker() {
        let mut table = AdaptTable::new();
        table.register(TypeId::of::<GenericEntry>(), "photo", to_photo);

        let generic: Box<dyn Extension> = Box::new(GenericEntry {
            kind: Some("photo".to_string()),
            title: "sunset".to_string(),
        });
        let adapted = table.adapt(generic).unwrap();
        let photo = crate::extension::downcast_ref::<PhotoEntry>(&*adapted).unwrap();
        assert_eq!(photo.title, "sunset");
    }

    /// No marker, or an unknown marker, keeps the generic instance.
    #[test]
    fn unmatched_marker_passes_through() {
        let mut table = AdaptTable::new();
        table.register(TypeId::of::<GenericEntry>(), "photo", to_photo);

        let plain: Box<dyn Extension> = Box::new(GenericEntry::default());
        let out = table.adapt(plain).unwrap();
        assert!(crate::extension::downcast_ref::<GenericEntry>(&*out).is_some());

        let odd: Box<dyn Extension> = Box::new(GenericEntry {
            kind: Some("album".to_string()),
            title: String::new(),
        });
        let out = table.adapt(odd).unwrap();
        assert!(crate::extension::downcast_ref::<GenericEntry>(&*out).is_some());
    }

    /// Facades over one record observe each other's writes.
    #[test]
    fn shared_state_is_one_record() {
        #[derive(Default)]
        struct Record {
            views: u32,
        }
        let a = Shared::new(Record::default());
        let b = a.clone();
        a.borrow_mut().views += 1;
        b.borrow_mut().views += 1;
        assert_eq!(a.borrow().views, 2);
    }
}
