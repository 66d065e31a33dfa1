// Gemeinsames Test-Vokabular fuer die Integrationstests.
//
// Wird per `include!` eingebunden. Benoetigte Imports:
//   use std::borrow::Cow;
//   use xbind::*;

pub const CATALOG_URI: &str = "urn:example:catalog";
pub const MEDIA_URI: &str = "urn:example:media";

pub fn catalog_ns() -> Namespace {
    Namespace::new("cat", CATALOG_URI)
}

pub fn media_ns() -> Namespace {
    Namespace::new("med", MEDIA_URI)
}

/// Root type: structural `<cat:title>`, registered extensions, arbitrary
/// content allowed.
#[derive(Default, Debug)]
pub struct Catalog {
    pub title: Option<Title>,
    pub container: ExtensionContainer,
}

impl Extension for Catalog {
    fn element_name(&self) -> QName {
        QName::with_prefix(CATALOG_URI, "catalog", "cat")
    }

    fn declare_extensions(registry: &mut ExtensionRegistry)
    where
        Self: Sized,
    {
        let cat = catalog_ns();
        let med = media_ns();
        registry.register::<Catalog>(ExtensionDescriptor::new::<Label>(&cat, "label").repeatable());
        registry.register::<Catalog>(ExtensionDescriptor::new::<Priority>(&cat, "priority"));
        registry.register::<Catalog>(ExtensionDescriptor::new::<Settings>(&cat, "settings").aggregate());
        registry.register::<Catalog>(ExtensionDescriptor::new::<Owner>(&med, "owner"));
        registry.register::<Catalog>(ExtensionDescriptor::new::<LangProbe>(&cat, "probe"));
        registry.register::<Catalog>(ExtensionDescriptor::new::<GenericItem>(&cat, "item"));
        registry.allow_arbitrary_content::<Catalog>(true);
    }

    fn structural_child(&mut self, name: &QName) -> Option<Box<dyn Extension>> {
        if name == &QName::new(CATALOG_URI, "title") {
            Some(Box::new(Title::default()))
        } else {
            None
        }
    }

    fn accept_structural_child(&mut self, child: Box<dyn Extension>) -> Result<()> {
        match downcast::<Title>(child) {
            Ok(title) => {
                self.title = Some(*title);
                Ok(())
            }
            Err(other) => Err(Error::UnrecognizedElement {
                name: other.element_name().display_name().into(),
            }),
        }
    }

    fn container(&self) -> Option<&ExtensionContainer> {
        Some(&self.container)
    }

    fn container_mut(&mut self) -> Option<&mut ExtensionContainer> {
        Some(&mut self.container)
    }

    fn generate_children(&self, w: &mut ElementWriter<'_>, registry: &ExtensionRegistry) -> Result<()> {
        if let Some(title) = &self.title {
            title.generate(w, registry)?;
        }
        self.container.emit(w, registry)
    }
}

/// Structural leaf child of [`Catalog`].
#[derive(Default, Debug)]
pub struct Title {
    pub value: String,
}

impl Extension for Title {
    fn element_name(&self) -> QName {
        QName::with_prefix(CATALOG_URI, "title", "cat")
    }
    fn consume_text(&mut self, text: &str) -> Result<()> {
        self.value = text.to_string();
        Ok(())
    }
    fn text(&self) -> Option<Cow<'_, str>> {
        Some(Cow::Borrowed(&self.value))
    }
}

/// Repeatable text extension.
#[derive(Default)]
pub struct Label {
    pub value: String,
}

impl Extension for Label {
    fn element_name(&self) -> QName {
        QName::with_prefix(CATALOG_URI, "label", "cat")
    }
    fn consume_text(&mut self, text: &str) -> Result<()> {
        self.value = text.to_string();
        Ok(())
    }
    fn text(&self) -> Option<Cow<'_, str>> {
        Some(Cow::Borrowed(&self.value))
    }
}

/// Non-repeating extension with a required integer attribute.
#[derive(Default)]
pub struct Priority {
    pub level: i64,
}

impl Extension for Priority {
    fn element_name(&self) -> QName {
        QName::with_prefix(CATALOG_URI, "priority", "cat")
    }
    fn consume_attributes(&mut self, attrs: &mut AttributeConsumer<'_>) -> Result<()> {
        self.level = attrs.required_long("level")?;
        Ok(())
    }
    fn put_attributes(&self, out: &mut AttributeMap) {
        out.set_long(QName::plain("level"), self.level);
    }
}

/// Aggregate extension: repeated occurrences merge onto one instance,
/// attribute-wise last write wins.
#[derive(Default)]
pub struct Settings {
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub access: Option<String>,
}

impl Extension for Settings {
    fn element_name(&self) -> QName {
        QName::with_prefix(CATALOG_URI, "settings", "cat")
    }
    fn consume_attributes(&mut self, attrs: &mut AttributeConsumer<'_>) -> Result<()> {
        if let Some(width) = attrs.get_long("width")? {
            self.width = Some(width);
        }
        if let Some(height) = attrs.get_long("height")? {
            self.height = Some(height);
        }
        if let Some(access) = attrs.get("access") {
            self.access = Some(access.to_string());
        }
        Ok(())
    }
    fn put_attributes(&self, out: &mut AttributeMap) {
        if let Some(width) = self.width {
            out.set_long(QName::plain("width"), width);
        }
        if let Some(height) = self.height {
            out.set_long(QName::plain("height"), height);
        }
        if let Some(access) = &self.access {
            out.set(QName::plain("access"), access.clone());
        }
    }
}

/// Nested extensible type with a required child.
#[derive(Default)]
pub struct Owner {
    pub container: ExtensionContainer,
}

impl Extension for Owner {
    fn element_name(&self) -> QName {
        QName::with_prefix(MEDIA_URI, "owner", "med")
    }
    fn declare_extensions(registry: &mut ExtensionRegistry)
    where
        Self: Sized,
    {
        registry.register::<Owner>(ExtensionDescriptor::new::<Name>(&media_ns(), "name").required());
    }
    fn container(&self) -> Option<&ExtensionContainer> {
        Some(&self.container)
    }
    fn container_mut(&mut self) -> Option<&mut ExtensionContainer> {
        Some(&mut self.container)
    }
}

/// Required child of [`Owner`].
#[derive(Default)]
pub struct Name {
    pub value: String,
}

impl Extension for Name {
    fn element_name(&self) -> QName {
        QName::with_prefix(MEDIA_URI, "name", "med")
    }
    fn consume_text(&mut self, text: &str) -> Result<()> {
        self.value = text.to_string();
        Ok(())
    }
    fn text(&self) -> Option<Cow<'_, str>> {
        Some(Cow::Borrowed(&self.value))
    }
}

/// Records the inherited `xml:lang`/`xml:base` context it was parsed under.
#[derive(Default)]
pub struct LangProbe {
    pub lang: Option<String>,
    pub base: Option<String>,
}

impl Extension for LangProbe {
    fn element_name(&self) -> QName {
        QName::with_prefix(CATALOG_URI, "probe", "cat")
    }
    fn consume_attributes(&mut self, attrs: &mut AttributeConsumer<'_>) -> Result<()> {
        self.lang = attrs.lang().map(str::to_string);
        self.base = attrs.base().map(str::to_string);
        Ok(())
    }
}

/// Generic item carrying a runtime category marker for two-phase
/// adaptation.
#[derive(Default)]
pub struct GenericItem {
    pub kind: Option<String>,
    pub caption: Option<String>,
}

impl Extension for GenericItem {
    fn element_name(&self) -> QName {
        QName::with_prefix(CATALOG_URI, "item", "cat")
    }
    fn consume_attributes(&mut self, attrs: &mut AttributeConsumer<'_>) -> Result<()> {
        self.kind = attrs.get("kind").map(str::to_string);
        self.caption = attrs.get("caption").map(str::to_string);
        Ok(())
    }
    fn adaptation_kind(&self) -> Option<String> {
        self.kind.clone()
    }
}

/// Specific variant selected by the `video` marker.
pub struct VideoItem {
    pub caption: Option<String>,
}

impl Extension for VideoItem {
    fn element_name(&self) -> QName {
        QName::with_prefix(CATALOG_URI, "item", "cat")
    }
}

pub fn adapt_to_video(generic: Box<dyn Extension>) -> Result<Box<dyn Extension>> {
    match downcast::<GenericItem>(generic) {
        Ok(item) => Ok(Box::new(VideoItem { caption: item.caption })),
        Err(other) => Ok(other),
    }
}

/// Root that allows nothing beyond its registrations.
#[derive(Default, Debug)]
pub struct Strict {
    pub container: ExtensionContainer,
}

impl Extension for Strict {
    fn element_name(&self) -> QName {
        QName::with_prefix(CATALOG_URI, "strict", "cat")
    }
    fn declare_extensions(registry: &mut ExtensionRegistry)
    where
        Self: Sized,
    {
        registry.register::<Strict>(ExtensionDescriptor::new::<Label>(&catalog_ns(), "label").repeatable());
    }
    fn container(&self) -> Option<&ExtensionContainer> {
        Some(&self.container)
    }
    fn container_mut(&mut self) -> Option<&mut ExtensionContainer> {
        Some(&mut self.container)
    }
}

/// Builds the registry the way a consuming application would: every root
/// type declares itself once.
pub fn test_registry() -> ExtensionRegistry {
    let mut registry = ExtensionRegistry::new();
    registry.declare::<Catalog>();
    registry.declare::<Strict>();
    registry.declare::<AnyElement>();
    registry.register_variant::<GenericItem>("video", adapt_to_video);
    registry
}
