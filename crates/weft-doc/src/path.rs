//! Paths into the document tree.
//!
//! A path is the materialized address of a node: object keys and visible
//! list indexes from the root. Paths are derived, not stored; a node's path
//! shifts when siblings before it are inserted or deleted.

use crate::error::{DocError, Result};
use serde::{Deserialize, Serialize};

/// A path from the root object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Path(Vec<PathSegment>);

impl Path {
    /// The root path.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }

    /// Parse dot notation, e.g. `"todos.0.title"`. Canonical decimal
    /// segments (`0`, `12`, not `012`) parse as indexes and still address
    /// an object key spelled the same way; everything else is a key. The
    /// empty string is the root.
    pub fn parse(path: &str) -> Result<Self> {
        if path.is_empty() {
            return Ok(Self::root());
        }
        path.split('.')
            .map(|s| {
                if s.is_empty() {
                    Err(DocError::InvalidPath(path.to_string()))
                } else if let Some(idx) = canonical_index(s) {
                    Ok(PathSegment::Index(idx))
                } else {
                    Ok(PathSegment::Key(s.to_string()))
                }
            })
            .collect::<Result<Vec<_>>>()
            .map(Self)
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    pub fn last(&self) -> Option<&PathSegment> {
        self.0.last()
    }

    pub fn push(&mut self, segment: PathSegment) {
        self.0.push(segment);
    }

    pub fn child_key(&self, key: impl Into<String>) -> Self {
        let mut new = self.clone();
        new.push(PathSegment::Key(key.into()));
        new
    }

    pub fn child_index(&self, index: usize) -> Self {
        let mut new = self.clone();
        new.push(PathSegment::Index(index));
        new
    }

    /// Whether `prefix` is this path or one of its ancestors.
    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.0.len() >= prefix.0.len()
            && self.0.iter().zip(&prefix.0).all(|(a, b)| a.addresses(b))
    }

    /// Whether one path is an ancestor of (or equal to) the other. A change
    /// at either end is visible from the other.
    pub fn overlaps(&self, other: &Path) -> bool {
        self.starts_with(other) || other.starts_with(self)
    }
}

fn canonical_index(s: &str) -> Option<usize> {
    let digits = s.bytes().all(|b| b.is_ascii_digit());
    if !digits || (s.len() > 1 && s.starts_with('0')) {
        return None;
    }
    s.parse().ok()
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s: Vec<String> = self.0.iter().map(|s| s.to_string()).collect();
        write!(f, "{}", s.join("."))
    }
}

impl std::str::FromStr for Path {
    type Err = DocError;

    fn from_str(s: &str) -> Result<Self> {
        Path::parse(s)
    }
}

/// A segment in a path.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathSegment {
    /// Object key.
    Key(String),
    /// Visible list index.
    Index(usize),
}

impl PathSegment {
    /// Segment equality, except that an index also addresses the object key
    /// spelled as its decimal form.
    pub fn addresses(&self, other: &PathSegment) -> bool {
        match (self, other) {
            (PathSegment::Key(k), PathSegment::Index(i))
            | (PathSegment::Index(i), PathSegment::Key(k)) => *k == i.to_string(),
            _ => self == other,
        }
    }
}

impl std::fmt::Display for PathSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathSegment::Key(k) => write!(f, "{}", k),
            PathSegment::Index(i) => write!(f, "{}", i),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_parsing() {
        let path = Path::parse("todos.0.title").unwrap();
        assert_eq!(path.len(), 3);
        assert!(matches!(path.segments()[1], PathSegment::Index(0)));
        assert_eq!(path.to_string(), "todos.0.title");

        assert!(Path::parse("").unwrap().is_root());
        assert!(Path::parse("a..b").is_err());
    }

    #[test]
    fn test_prefix_relations() {
        let todos = Path::parse("todos").unwrap();
        let title = Path::parse("todos.0.title").unwrap();
        let other = Path::parse("settings").unwrap();

        assert!(title.starts_with(&todos));
        assert!(!todos.starts_with(&title));
        assert!(todos.overlaps(&title));
        assert!(title.overlaps(&todos));
        assert!(!other.overlaps(&todos));
        assert!(Path::root().overlaps(&other));
    }

    #[test]
    fn test_parent_and_children() {
        let path = Path::root().child_key("todos").child_index(2);
        assert_eq!(path.parent(), Some(Path::root().child_key("todos")));
        assert_eq!(path.last(), Some(&PathSegment::Index(2)));
        assert_eq!(Path::root().parent(), None);
    }

    #[test]
    fn test_numeric_keys() {
        assert_eq!(
            Path::parse("07").unwrap().segments(),
            &[PathSegment::Key("07".to_string())]
        );
        assert_eq!(
            Path::parse("+1").unwrap().segments(),
            &[PathSegment::Key("+1".to_string())]
        );

        let year = Path::root().child_key("2024").child_key("total");
        let scope = Path::parse("2024").unwrap();
        assert!(year.starts_with(&scope));
        assert!(scope.overlaps(&year));
        assert!(!Path::root().child_key("2025").overlaps(&scope));
    }
}
