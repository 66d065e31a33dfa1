//! URI reference resolution for `xml:base` (RFC 3986 Section 5, XML Base).
//!
//! Only the parts the binding engine needs: absoluteness detection and
//! relative-reference resolution against an inherited absolute base. No
//! percent-decoding, no normalization beyond dot-segment removal — the
//! resolved value is carried as context, never dereferenced here.

use std::borrow::Cow;

use crate::error::{Error, Result};

/// True if the reference carries a scheme (RFC 3986 Section 3.1:
/// `ALPHA *( ALPHA / DIGIT / "+" / "-" / "." ) ":"`).
pub fn is_absolute(reference: &str) -> bool {
    let bytes = reference.as_bytes();
    let Some(&first) = bytes.first() else { return false };
    if !first.is_ascii_alphabetic() {
        return false;
    }
    for &b in &bytes[1..] {
        match b {
            b':' => return true,
            b'/' | b'?' | b'#' => return false,
            _ if b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.') => {}
            _ => return false,
        }
    }
    false
}

/// Components of an absolute URI, split non-destructively.
struct Split<'a> {
    /// Scheme including the trailing `:`.
    scheme: &'a str,
    /// Authority including the leading `//`, empty if absent.
    authority: &'a str,
    path: &'a str,
    /// Query including the leading `?`, empty if absent.
    query: &'a str,
}

fn split(uri: &str) -> Split<'_> {
    let (scheme, rest) = match uri.find(':') {
        Some(i) => uri.split_at(i + 1),
        None => ("", uri),
    };
    let (authority, rest) = if let Some(after) = rest.strip_prefix("//") {
        let end = after
            .find(|c| matches!(c, '/' | '?' | '#'))
            .unwrap_or(after.len());
        (&rest[..end + 2], &after[end..])
    } else {
        ("", rest)
    };
    // Fragment wird verworfen: xml:base hat laut XML Base Section 3 keinen
    // Fragment-Anteil, und RFC 3986 5.3 uebernimmt ihn nie von der Base.
    let rest = rest.split('#').next().unwrap_or(rest);
    let (path, query) = match rest.find('?') {
        Some(i) => rest.split_at(i),
        None => (rest, ""),
    };
    Split { scheme, authority, path, query }
}

/// Dot-segment removal (RFC 3986 Section 5.2.4).
fn remove_dot_segments(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let leading_slash = path.starts_with('/');
    let trailing = path.ends_with('/') || path.ends_with("/.") || path.ends_with("/..");
    for seg in path.split('/') {
        match seg {
            "." | "" => {}
            ".." => {
                out.pop();
            }
            s => out.push(s),
        }
    }
    let mut result = String::new();
    if leading_slash {
        result.push('/');
    }
    result.push_str(&out.join("/"));
    if trailing && !result.ends_with('/') {
        result.push('/');
    }
    result
}

/// Merges a relative path with the base path (RFC 3986 Section 5.2.3).
fn merge(base: &Split<'_>, reference: &str) -> String {
    if !base.authority.is_empty() && base.path.is_empty() {
        return format!("/{reference}");
    }
    match base.path.rfind('/') {
        Some(i) => format!("{}{}", &base.path[..=i], reference),
        None => reference.to_string(),
    }
}

/// Resolves `reference` against `base` (RFC 3986 Section 5.3).
///
/// `base` must be absolute when `reference` is not; otherwise
/// [`Error::InvalidUri`] names the unresolvable reference. An absolute
/// reference is returned unchanged, so a document can always re-anchor its
/// own `xml:base`.
pub fn resolve(base: Option<&str>, reference: &str) -> Result<String> {
    if is_absolute(reference) {
        return Ok(reference.to_string());
    }
    let Some(base) = base.filter(|b| is_absolute(b)) else {
        return Err(Error::InvalidUri { value: Cow::Owned(reference.to_string()) });
    };
    let b = split(base);

    if let Some(after) = reference.strip_prefix("//") {
        return Ok(format!("{}//{}", b.scheme, after));
    }
    if reference.is_empty() {
        return Ok(format!("{}{}{}{}", b.scheme, b.authority, b.path, b.query));
    }
    if let Some(q) = reference.strip_prefix('?') {
        return Ok(format!("{}{}{}?{}", b.scheme, b.authority, b.path, q));
    }
    let (ref_path, ref_query) = match reference.find('?') {
        Some(i) => reference.split_at(i),
        None => (reference, ""),
    };
    let path = if ref_path.starts_with('/') {
        remove_dot_segments(ref_path)
    } else {
        remove_dot_segments(&merge(&b, ref_path))
    };
    Ok(format!("{}{}{}{}", b.scheme, b.authority, path, ref_query))
}
