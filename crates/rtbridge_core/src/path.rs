//! Database paths.

use crate::error::{ValidationError, ValidationResult};
use std::fmt;

/// Characters that may not appear anywhere in a path.
const FORBIDDEN_CHARS: [char; 5] = ['.', '#', '$', '[', ']'];

/// Reserved location where both backends publish the liveness boolean.
const INFO_CONNECTED: &str = ".info/connected";

/// A normalized location in the database tree.
///
/// Paths are stored without leading or trailing separators; the root is the
/// empty path. Construction from user input goes through [`DbPath::parse`] or
/// [`DbPath::parse_optional`], which enforce the character rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct DbPath(String);

impl DbPath {
    /// The root of the database.
    pub fn root() -> Self {
        Self(String::new())
    }

    /// The reserved liveness signal path.
    ///
    /// This path cannot be produced by `parse`, since it starts with `.`.
    pub fn info_connected() -> Self {
        Self(INFO_CONNECTED.to_string())
    }

    /// Parses a path that must be non-empty after trimming.
    pub fn parse(raw: &str) -> ValidationResult<Self> {
        let path = Self::normalize(raw)?;
        if path.is_root() {
            return Err(ValidationError::EmptyPath);
        }
        Ok(path)
    }

    /// Parses an optional path; absent or blank input means the root.
    pub fn parse_optional(raw: Option<&str>) -> ValidationResult<Self> {
        match raw {
            Some(raw) => Self::normalize(raw),
            None => Ok(Self::root()),
        }
    }

    fn normalize(raw: &str) -> ValidationResult<Self> {
        let trimmed = raw.trim();
        if let Some(c) = trimmed.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
            let reason = format!(
                "must not contain {c:?} (paths cannot contain \".\", \"#\", \"$\", \"[\" or \"]\")"
            );
            return Err(ValidationError::invalid_path(raw, reason));
        }
        let joined = trimmed
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        Ok(Self(joined))
    }

    /// Returns a child path, validating the relative segment(s).
    pub fn child(&self, relative: &str) -> ValidationResult<Self> {
        let relative = Self::parse(relative)?;
        if self.is_root() {
            return Ok(relative);
        }
        Ok(Self(format!("{}/{}", self.0, relative.0)))
    }

    /// Returns the parent path, or `None` at the root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => Some(Self::root()),
        }
    }

    /// Returns the last segment, or `None` at the root.
    pub fn key(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }
        self.0.rsplit('/').next()
    }

    /// Iterates over the path segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Returns true for the root path.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true for the reserved liveness path.
    pub fn is_info_connected(&self) -> bool {
        self.0 == INFO_CONNECTED
    }

    /// Checks that the path may be the target of a write.
    ///
    /// Writes at the root would replace the whole tree, and the liveness
    /// path is owned by the backend.
    pub fn ensure_writable(&self) -> ValidationResult<()> {
        if self.is_root() {
            return Err(ValidationError::EmptyPath);
        }
        if self.is_info_connected() {
            return Err(ValidationError::invalid_path(&self.0, "reserved for the backend"));
        }
        Ok(())
    }

    /// Returns true if `other` equals this path or lies below it.
    pub fn contains(&self, other: &DbPath) -> bool {
        if self.is_root() {
            return true;
        }
        other.0 == self.0
            || (other.0.starts_with(&self.0) && other.0.as_bytes().get(self.0.len()) == Some(&b'/'))
    }

    /// Returns the path as a string slice (empty for the root).
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DbPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_trims_and_normalizes() {
        let path = DbPath::parse("  /users//alice/  ").unwrap();
        assert_eq!(path.as_str(), "users/alice");
        assert_eq!(path.key(), Some("alice"));
        assert_eq!(path.parent().unwrap().as_str(), "users");
        assert_eq!(path.to_string(), "/users/alice");
    }

    #[test]
    fn parse_rejects_empty() {
        assert_eq!(DbPath::parse("   "), Err(ValidationError::EmptyPath));
        assert_eq!(DbPath::parse("/"), Err(ValidationError::EmptyPath));
    }

    #[test]
    fn optional_path_allows_root() {
        assert!(DbPath::parse_optional(None).unwrap().is_root());
        assert!(DbPath::parse_optional(Some("  ")).unwrap().is_root());
        assert!(DbPath::parse_optional(Some("a.b")).is_err());
    }

    #[test]
    fn info_connected_is_reserved() {
        assert!(DbPath::parse(".info/connected").is_err());
        assert!(DbPath::info_connected().is_info_connected());
    }

    #[test]
    fn root_and_liveness_paths_are_not_writable() {
        assert_eq!(DbPath::root().ensure_writable(), Err(ValidationError::EmptyPath));
        assert_eq!(DbPath::default().ensure_writable(), Err(ValidationError::EmptyPath));
        assert!(matches!(
            DbPath::info_connected().ensure_writable(),
            Err(ValidationError::InvalidPath { .. })
        ));
        assert!(DbPath::parse("users/alice").unwrap().ensure_writable().is_ok());
    }

    #[test]
    fn containment() {
        let users = DbPath::parse("users").unwrap();
        let alice = DbPath::parse("users/alice").unwrap();
        let usersx = DbPath::parse("usersx").unwrap();
        assert!(users.contains(&alice));
        assert!(users.contains(&users));
        assert!(!users.contains(&usersx));
        assert!(!alice.contains(&users));
        assert!(DbPath::root().contains(&alice));
    }

    #[test]
    fn child_validates_segment() {
        let users = DbPath::parse("users").unwrap();
        assert_eq!(users.child("bob/name").unwrap().as_str(), "users/bob/name");
        assert!(users.child("b#b").is_err());
        assert_eq!(DbPath::root().child("x").unwrap().as_str(), "x");
    }

    proptest! {
        #[test]
        fn forbidden_chars_always_rejected(
            prefix in "[a-z/]{0,8}",
            bad in prop::sample::select(vec!['.', '#', '$', '[', ']']),
            suffix in "[a-z/]{0,8}",
        ) {
            let raw = format!("{prefix}{bad}{suffix}");
            let is_invalid_path =
                matches!(DbPath::parse(&raw), Err(ValidationError::InvalidPath { .. }));
            prop_assert!(is_invalid_path);
            let is_invalid_optional = matches!(
                DbPath::parse_optional(Some(&raw)),
                Err(ValidationError::InvalidPath { .. })
            );
            prop_assert!(is_invalid_optional);
        }

        #[test]
        fn clean_paths_roundtrip_segments(
            segments in prop::collection::vec("[a-zA-Z0-9_-]{1,6}", 1..5),
        ) {
            let raw = segments.join("/");
            let path = DbPath::parse(&raw).unwrap();
            let expected = segments.iter().map(String::as_str).collect::<Vec<_>>();
            prop_assert_eq!(path.segments().collect::<Vec<_>>(), expected);
        }
    }
}
