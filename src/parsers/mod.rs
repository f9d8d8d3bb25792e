//! Minimal discovery parsers (spec §4.5 point 7, §4.6, SPEC_FULL.md §10).
//!
//! Intentionally small and regex-based: the spec scopes out the *design*
//! of HTML/CSS/XML parsing, not its presence. Each parser returns the
//! raw link strings it found; canonicalization, recursion filtering, and
//! blacklist checks happen in the Fetch Pipeline (spec §4.5).

pub mod html;
pub mod css;
pub mod sitemap;
pub mod metalink;

/// A link discovered in a document, tagged by how it would be followed
/// under the page-requisites rule (spec §4.5 recursion rule g).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredLink {
    pub href: String,
    pub kind: LinkKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// `<a href>`, CSS `@import`: navigation.
    Navigation,
    /// `<img src>`, CSS `url()`: inline page requisite.
    Requisite,
}
