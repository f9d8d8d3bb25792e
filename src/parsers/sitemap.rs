//! Sitemap parsing: plain-text (one URL per line) and XML `<loc>` entries,
//! the latter optionally gzip-compressed (spec §4.5 point 7, §4.7).

use std::io::Read;

use regex::Regex;
use std::sync::OnceLock;

fn loc_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<loc>\s*([^<\s]+)\s*</loc>").unwrap())
}

pub fn parse_text(body: &str) -> Vec<String> {
    body.lines().map(str::trim).filter(|l| !l.is_empty() && !l.starts_with('#')).map(str::to_string).collect()
}

pub fn parse_xml(body: &str) -> Vec<String> {
    loc_re().captures_iter(body).map(|cap| cap[1].to_string()).collect()
}

/// Gzip-decompresses `body` if it looks gzip-magic-prefixed, then parses
/// it as an XML sitemap (spec §4.7: "XML sitemaps additionally accept
/// gzip bodies").
pub fn parse_xml_maybe_gzip(body: &[u8]) -> Vec<String> {
    let text = if body.starts_with(&[0x1f, 0x8b]) {
        let mut decoder = flate2::read::GzDecoder::new(body);
        let mut out = String::new();
        if decoder.read_to_string(&mut out).is_err() {
            return Vec::new();
        }
        out
    } else {
        String::from_utf8_lossy(body).into_owned()
    };
    parse_xml(&text)
}
