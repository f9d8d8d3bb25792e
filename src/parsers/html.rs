//! HTML link extraction: `href` (navigation) and `src` (page requisite)
//! attributes. Regex-based per SPEC_FULL.md §10; a real tokenizer is out
//! of scope (spec §1).

use regex::Regex;
use std::sync::OnceLock;

use super::{DiscoveredLink, LinkKind};

fn href_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)\bhref\s*=\s*["']([^"']+)["']"#).unwrap())
}

fn src_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)\bsrc\s*=\s*["']([^"']+)["']"#).unwrap())
}

pub fn extract(body: &str) -> Vec<DiscoveredLink> {
    let mut links = Vec::new();
    for cap in href_re().captures_iter(body) {
        links.push(DiscoveredLink { href: cap[1].to_string(), kind: LinkKind::Navigation });
    }
    for cap in src_re().captures_iter(body) {
        links.push(DiscoveredLink { href: cap[1].to_string(), kind: LinkKind::Requisite });
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_href_and_src() {
        let body = r#"<a href="page.html">x</a><img src='a.png'>"#;
        let links = extract(body);
        assert!(links.contains(&DiscoveredLink { href: "page.html".into(), kind: LinkKind::Navigation }));
        assert!(links.contains(&DiscoveredLink { href: "a.png".into(), kind: LinkKind::Requisite }));
    }

    #[test]
    fn ignores_unrelated_attributes() {
        let body = r#"<div class="href-like">no link here</div>"#;
        assert!(extract(body).is_empty());
    }
}
