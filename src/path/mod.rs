//! # Property Paths
//!
//! Dotted property paths (`"Address.City.Name"`) resolved against the
//! `TypeRegistry`.
//!
//! - [`resolve`] turns one name into a [`ResolvedAccessor`].
//! - [`enumerate`] lists every path reachable from a type up to a depth.
//!
//! Both are pure functions of the registry: nothing here holds state
//! about live objects.

pub mod accessor;
pub mod enumerator;

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::{Error, Result};

pub use accessor::{ResolvedAccessor, resolve};
pub use enumerator::{PropertyPaths, enumerate};

/// Separator between segments.
pub const SEPARATOR: char = '.';

/// An immutable, non-empty chain of property names rooted at a type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyPath {
    component_type: String,
    value_type: String,
    segments: SmallVec<[String; 4]>,
}

impl PropertyPath {
    pub(crate) fn new(
        component_type: impl Into<String>,
        value_type: impl Into<String>,
        segments: SmallVec<[String; 4]>,
    ) -> Self {
        debug_assert!(!segments.is_empty());
        Self {
            component_type: component_type.into(),
            value_type: value_type.into(),
            segments,
        }
    }

    /// Split and validate a dotted name.
    pub fn parse_segments(name: &str) -> Result<SmallVec<[String; 4]>> {
        if name.is_empty() {
            return Err(Error::InvalidArgument("property path is empty".into()));
        }
        let segments: SmallVec<[String; 4]> = name.split(SEPARATOR).map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(Error::InvalidArgument(format!(
                "property path '{name}' has an empty segment"
            )));
        }
        Ok(segments)
    }

    /// The dotted name.
    pub fn name(&self) -> String {
        self.segments.join(".")
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Nested hops from the root: 0 for a direct property.
    pub fn depth(&self) -> usize {
        self.segments.len() - 1
    }

    /// The root type the first segment resolves against.
    pub fn component_type(&self) -> &str {
        &self.component_type
    }

    /// Declared type of the final segment.
    pub fn value_type(&self) -> &str {
        &self.value_type
    }

    pub fn last_segment(&self) -> &str {
        // segments is never empty
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    pub(crate) fn child(&self, segment: &str, value_type: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Self::new(self.component_type.clone(), value_type, segments)
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// True when `path` is `ancestor` itself or lies underneath it.
///
/// Matches on whole segments: `"AddressBook"` is not within `"Address"`.
pub fn is_within(path: &str, ancestor: &str) -> bool {
    match path.strip_prefix(ancestor) {
        Some("") => true,
        Some(rest) => rest.starts_with(SEPARATOR),
        None => false,
    }
}

/// True when `path` lies strictly underneath `ancestor`.
pub fn is_proper_descendant(path: &str, ancestor: &str) -> bool {
    path.len() > ancestor.len() && is_within(path, ancestor)
}

/// `"prefix.name"`, or just `name` for an empty prefix.
pub fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}{SEPARATOR}{name}")
    }
}
