//! CSS `url()` and `@import` extraction (spec §4.5 point 7).

use regex::Regex;
use std::sync::OnceLock;

use super::{DiscoveredLink, LinkKind};

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"url\(\s*['"]?([^'")]+)['"]?\s*\)"#).unwrap())
}

fn import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"@import\s+["']([^"']+)["']"#).unwrap())
}

pub fn extract(body: &str) -> Vec<DiscoveredLink> {
    let mut links = Vec::new();
    for cap in url_re().captures_iter(body) {
        links.push(DiscoveredLink { href: cap[1].to_string(), kind: LinkKind::Requisite });
    }
    for cap in import_re().captures_iter(body) {
        links.push(DiscoveredLink { href: cap[1].to_string(), kind: LinkKind::Navigation });
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_url_function() {
        let body = "body { background: url('bg.png'); }";
        let links = extract(body);
        assert_eq!(links, vec![DiscoveredLink { href: "bg.png".into(), kind: LinkKind::Requisite }]);
    }

    #[test]
    fn extracts_import() {
        let body = "@import \"reset.css\";";
        let links = extract(body);
        assert_eq!(links, vec![DiscoveredLink { href: "reset.css".into(), kind: LinkKind::Navigation }]);
    }
}
