//! Central error types for the binding engine.
//!
//! One crate-wide [`Error`] enum carries the machine-checkable reason code;
//! the public parse entry points wrap it in [`ParseError`] together with the
//! source location (line/column plus innermost open element) when the
//! underlying tokenizer can supply one.

use core::fmt;
use std::borrow::Cow;

/// All error conditions raised by parsing, validation and generation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// An element matched neither a structural child, nor a registered
    /// extension, and the enclosing container does not allow arbitrary content.
    UnrecognizedElement {
        /// Qualified name of the offending element (`prefix:local` or `{uri}local`).
        name: Cow<'static, str>,
    },
    /// A non-repeating, non-aggregate extension type occurred twice under the
    /// same parent.
    DuplicateExtension {
        /// Qualified name of the second occurrence.
        name: Cow<'static, str>,
    },
    /// A required extension was still absent when its owning element closed.
    MissingRequiredExtension {
        /// Namespace URI of the missing extension.
        namespace: Cow<'static, str>,
        /// Local name of the missing extension.
        local_name: Cow<'static, str>,
    },
    /// A registered extension descriptor has no factory, so no instance could
    /// be constructed for a matching element.
    CannotCreateExtension {
        /// Debug name of the descriptor's target type.
        type_name: Cow<'static, str>,
    },
    /// An attribute value does not parse as the requested datatype.
    InvalidAttributeValue {
        /// Attribute name as written.
        name: Cow<'static, str>,
        /// The rejected value.
        value: Cow<'static, str>,
    },
    /// A required attribute is absent.
    MissingAttribute {
        /// Attribute name that was expected.
        name: Cow<'static, str>,
    },
    /// An attribute was present that the element's consumer did not claim.
    UnexpectedAttribute {
        /// Attribute name as written.
        name: Cow<'static, str>,
    },
    /// Character data appeared where none is permitted and mixed content is
    /// disabled for the enclosing container.
    TextNotAllowed {
        /// Qualified name of the element that received the text.
        element: Cow<'static, str>,
    },
    /// `xml:base` is malformed, or a relative reference arrived with no
    /// absolute base in scope to resolve it against (RFC 3986 Section 5).
    InvalidUri {
        /// The value that could not be resolved.
        value: Cow<'static, str>,
    },
    /// The XML input itself is not well formed (reported by the tokenizer).
    XmlSyntax(String),
    /// Generation-side misuse of the element writer (unbalanced calls).
    Generate(Cow<'static, str>),
    /// IO failure while reading input or writing output.
    Io(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnrecognizedElement { name } => {
                write!(f, "unrecognized element '{name}'")
            }
            Self::DuplicateExtension { name } => {
                write!(f, "duplicate extension element '{name}'")
            }
            Self::MissingRequiredExtension { namespace, local_name } => {
                if namespace.is_empty() {
                    write!(f, "required extension '{local_name}' is missing")
                } else {
                    write!(f, "required extension '{{{namespace}}}{local_name}' is missing")
                }
            }
            Self::CannotCreateExtension { type_name } => {
                write!(f, "cannot create extension instance of type '{type_name}'")
            }
            Self::InvalidAttributeValue { name, value } => {
                write!(f, "invalid value '{value}' for attribute '{name}'")
            }
            Self::MissingAttribute { name } => write!(f, "missing attribute '{name}'"),
            Self::UnexpectedAttribute { name } => write!(f, "unexpected attribute '{name}'"),
            Self::TextNotAllowed { element } => {
                write!(f, "element '{element}' does not allow text content")
            }
            Self::InvalidUri { value } => {
                write!(f, "invalid or unresolvable URI reference '{value}' (RFC 3986)")
            }
            Self::XmlSyntax(msg) => write!(f, "XML syntax error: {msg}"),
            Self::Generate(msg) => write!(f, "generation error: {msg}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<quick_xml::Error> for Error {
    fn from(e: quick_xml::Error) -> Self {
        Error::XmlSyntax(e.to_string())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

// ============================================================================
// ParseError: Fehlercode + Quellposition
// ============================================================================

/// Source position of a parse failure.
///
/// Lines and columns are 1-based. `element` names the innermost element that
/// was still open when the error was raised, in `prefix:local` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub line: u64,
    pub column: u64,
    pub element: Option<String>,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)?;
        if let Some(el) = &self.element {
            write!(f, ", in element '{el}'")?;
        }
        Ok(())
    }
}

/// A parse failure annotated with structural context.
///
/// Wraps the [`Error`] reason code. The location is present only when the
/// event source has a usable locator (string input always has one; a raw
/// push-event source usually has none).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub error: Error,
    pub location: Option<Location>,
}

impl ParseError {
    pub fn new(error: Error) -> Self {
        ParseError { error, location: None }
    }

    pub fn with_location(error: Error, location: Location) -> Self {
        ParseError { error, location: Some(location) }
    }

    /// The machine-checkable reason code.
    pub fn error(&self) -> &Error {
        &self.error
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "{} ({loc})", self.error),
            None => write!(f, "{}", self.error),
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<Error> for ParseError {
    fn from(error: Error) -> Self {
        ParseError::new(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reason codes are comparable for exact assertions.
    #[test]
    fn error_equality() {
        let a = Error::MissingAttribute { name: "count".into() };
        let b = Error::MissingAttribute { name: "count".into() };
        assert_eq!(a, b);
        assert_ne!(a, Error::UnexpectedAttribute { name: "count".into() });
    }

    #[test]
    fn display_includes_namespace() {
        let e = Error::MissingRequiredExtension {
            namespace: "urn:x".into(),
            local_name: "bar".into(),
        };
        assert_eq!(e.to_string(), "required extension '{urn:x}bar' is missing");
    }

    #[test]
    fn display_without_namespace() {
        let e = Error::MissingRequiredExtension {
            namespace: "".into(),
            local_name: "bar".into(),
        };
        assert_eq!(e.to_string(), "required extension 'bar' is missing");
    }

    #[test]
    fn parse_error_location_display() {
        let loc = Location { line: 3, column: 14, element: Some("atom:entry".to_string()) };
        let pe = ParseError::with_location(
            Error::TextNotAllowed { element: "atom:entry".into() },
            loc,
        );
        let s = pe.to_string();
        assert!(s.contains("line 3, column 14"), "{s}");
        assert!(s.contains("atom:entry"), "{s}");
    }
}
