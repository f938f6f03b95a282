//! Content model read from the host publishing system.

use std::fmt;

use time::OffsetDateTime;

/// Identifier of a content item in the host system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentId(i64);

impl ContentId {
    pub fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// String-valued kind tag (`post`, `page`, host-defined custom kinds).
///
/// The set of kinds is owned by the content store; the engine treats the tag
/// as opaque and only compares it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentKind(String);

impl ContentKind {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentKind {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// A published resource as reported by the content store.
///
/// The engine only reads these records; creation, editing, and deletion
/// happen in the host system.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentItem {
    pub id: ContentId,
    /// Parent item, forming a tree. `None` for top-level items.
    pub parent_id: Option<ContentId>,
    pub kind: ContentKind,
    /// `None` when the store reported a modification timestamp that could
    /// not be parsed; such items are never considered changed.
    pub modified_at: Option<OffsetDateTime>,
    /// Canonical address of the item, absolute or site-relative.
    pub permalink: String,
}

impl ContentItem {
    /// Last non-empty path segment of the permalink, with any query or
    /// fragment stripped. Expansion rules use this as the item's slug.
    pub fn slug(&self) -> Option<&str> {
        let path = self.permalink.split(['?', '#']).next().unwrap_or("");
        path.rsplit('/').find(|segment| !segment.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(permalink: &str) -> ContentItem {
        ContentItem {
            id: ContentId::new(1),
            parent_id: None,
            kind: ContentKind::new("post"),
            modified_at: None,
            permalink: permalink.to_string(),
        }
    }

    #[test]
    fn slug_from_trailing_slash_permalink() {
        assert_eq!(item("/posts/foo/").slug(), Some("foo"));
    }

    #[test]
    fn slug_ignores_query_and_fragment() {
        assert_eq!(item("/posts/foo?preview=1").slug(), Some("foo"));
        assert_eq!(item("/posts/foo#section").slug(), Some("foo"));
    }

    #[test]
    fn slug_from_absolute_permalink() {
        assert_eq!(item("https://example.com/games/sorting/").slug(), Some("sorting"));
    }

    #[test]
    fn root_has_no_slug() {
        assert_eq!(item("/").slug(), None);
    }
}
