//! Page cache key definitions.
//!
//! The homepage and slug pages live under different key segments, so no slug
//! can ever produce the homepage key:
//!
//! ```text
//! {namespace}:page:home
//! {namespace}:page:slug:{slug}
//! ```

use std::fmt;

use crate::domain::slug::validate_slug;

const PAGE_SEGMENT: &str = "page";
const HOME_SEGMENT: &str = "home";
const SLUG_SEGMENT: &str = "slug";

/// Identity of a cached page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PageKind {
    Homepage,
    Slug(String),
}

/// A fully qualified page cache key.
///
/// Only constructible through [`PageKey::homepage`] and [`PageKey::slug`],
/// which keeps every stored key inside the namespace prefix that bulk
/// invalidation scans.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageKey {
    kind: PageKind,
    rendered: String,
}

impl PageKey {
    pub fn homepage(namespace: &str) -> Self {
        Self {
            kind: PageKind::Homepage,
            rendered: format!("{}{HOME_SEGMENT}", page_prefix(namespace)),
        }
    }

    /// Key for a content slug. Returns `None` for slugs that fail validation.
    pub fn slug(namespace: &str, slug: &str) -> Option<Self> {
        validate_slug(slug).ok()?;
        Some(Self {
            kind: PageKind::Slug(slug.to_string()),
            rendered: format!("{}{SLUG_SEGMENT}:{slug}", page_prefix(namespace)),
        })
    }

    pub fn kind(&self) -> &PageKind {
        &self.kind
    }

    pub fn as_str(&self) -> &str {
        &self.rendered
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

/// Prefix shared by every page key in `namespace`.
pub fn page_prefix(namespace: &str) -> String {
    format!("{namespace}:{PAGE_SEGMENT}:")
}
