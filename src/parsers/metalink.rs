//! Metalink3/4 XML parsing (RFC 5854) into the coordinator's own
//! `Metalink`/`Mirror`/`Piece` shapes (spec §3, §4.6). Regex-based: a
//! full XML parser is out of scope (spec §1), and Metalink's grammar is
//! regular enough for the fields the Part Scheduler needs.

use std::sync::OnceLock;

use regex::Regex;

use crate::job::{HashAlgorithm, Metalink, Mirror, Piece, PieceHash};
use crate::url_canon::{CanonicalUrl, UrlError};

fn file_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?s)<file\s+name="([^"]+)"\s*>(.*?)</file>"#).unwrap())
}

fn size_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<size>\s*(\d+)\s*</size>").unwrap())
}

fn whole_hash_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"<hash\s+type="([^"]+)">\s*([0-9a-fA-F]+)\s*</hash>"#).unwrap())
}

fn pieces_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?s)<pieces\s+length="(\d+)"\s+type="([^"]+)"\s*>(.*?)</pieces>"#).unwrap())
}

fn piece_hash_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<hash>\s*([0-9a-fA-F]+)\s*</hash>").unwrap())
}

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<url(?:\s+priority="(\d+)")?(?:\s+location="([^"]*)")?\s*>\s*([^<\s]+)\s*</url>"#).unwrap()
    })
}

fn algorithm(name: &str) -> Option<HashAlgorithm> {
    match name.to_lowercase().replace('-', "").as_str() {
        "md5" => Some(HashAlgorithm::Md5),
        "sha1" => Some(HashAlgorithm::Sha1),
        "sha256" => Some(HashAlgorithm::Sha256),
        _ => None,
    }
}

/// Parses a single-file Metalink document. Multi-file Metalinks are
/// uncommon for this coordinator's use case (one Job == one file) so
/// only the first `<file>` element is honored.
pub fn parse(body: &str) -> Result<Metalink, UrlError> {
    let Some(file_cap) = file_re().captures(body) else {
        return Ok(Metalink { total_size: 0, filename: String::new(), pieces: Vec::new(), mirrors: Vec::new(), whole_file_hash: None });
    };
    let filename = file_cap[1].to_string();
    let file_body = &file_cap[2];

    let total_size = size_re().captures(file_body).and_then(|c| c[1].parse().ok()).unwrap_or(0);

    let whole_file_hash = whole_hash_re().captures(file_body).and_then(|c| {
        algorithm(&c[1]).map(|algorithm| PieceHash { algorithm, digest_hex: c[2].to_lowercase() })
    });

    let mut pieces = Vec::new();
    if let Some(pc) = pieces_re().captures(file_body) {
        let length: u64 = pc[1].parse().unwrap_or(0);
        let algo = algorithm(&pc[2]);
        let hashes_body = &pc[3];
        for (i, cap) in piece_hash_re().captures_iter(hashes_body).enumerate() {
            let position = i as u64 * length;
            let remaining = total_size.saturating_sub(position);
            let piece_length = if remaining > 0 { remaining.min(length) } else { length };
            pieces.push(Piece {
                position,
                length: piece_length,
                hash: algo.map(|algorithm| PieceHash { algorithm, digest_hex: cap[1].to_lowercase() }),
            });
        }
    }

    let mut mirrors = Vec::new();
    for cap in url_re().captures_iter(file_body) {
        let priority = cap.get(1).and_then(|m| m.as_str().parse().ok()).unwrap_or(u32::MAX);
        let location = cap.get(2).map(|m| m.as_str().to_string()).filter(|s| !s.is_empty());
        let url = CanonicalUrl::parse(&cap[3])?;
        mirrors.push(Mirror { priority, url, location });
    }

    let mut metalink = Metalink { total_size, filename, pieces, mirrors, whole_file_hash };
    metalink.sort_mirrors();
    Ok(metalink)
}
