//! Utility functions for magnet links and task reference strings

use sha2::{Digest, Sha256};

use crate::types::{InfoHash, SegmentedId};

const BTIH_PREFIX: &str = "urn:btih:";

/// Extract the info-hash of a magnet link
///
/// Accepts both the 40-character hex and the 32-character base32 forms of the `xt`
/// parameter.
///
/// # Examples
///
/// ```
/// use unidl::utils::info_hash_from_magnet;
///
/// let hash = info_hash_from_magnet(
///     "magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567&dn=file",
/// )
/// .unwrap();
/// assert_eq!(hash.to_string(), "0123456789abcdef0123456789abcdef01234567");
/// ```
pub fn info_hash_from_magnet(magnet: &str) -> Option<InfoHash> {
    let parsed = url::Url::parse(magnet).ok()?;
    if parsed.scheme() != "magnet" {
        return None;
    }
    parsed.query_pairs().find_map(|(key, value)| {
        if key != "xt" {
            return None;
        }
        let encoded = value.get(BTIH_PREFIX.len()..)?;
        if !value[..BTIH_PREFIX.len()].eq_ignore_ascii_case(BTIH_PREFIX) {
            return None;
        }
        match encoded.len() {
            40 => encoded.parse().ok(),
            32 => decode_base32(encoded).map(InfoHash),
            _ => None,
        }
    })
}

/// The `dn` (display name) parameter of a magnet link
pub fn magnet_display_name(magnet: &str) -> Option<String> {
    let parsed = url::Url::parse(magnet).ok()?;
    if parsed.scheme() != "magnet" {
        return None;
    }
    parsed
        .query_pairs()
        .find(|(key, value)| key == "dn" && !value.is_empty())
        .map(|(_, value)| value.into_owned())
}

/// Build a magnet link for `hash`, with `name` as display name when non-empty
pub fn magnet_uri(hash: &InfoHash, name: &str) -> String {
    let mut uri = format!("magnet:?xt={BTIH_PREFIX}{}", hash.to_hex());
    if !name.is_empty() {
        uri.push_str("&dn=");
        uri.push_str(&urlencoding::encode(name));
    }
    uri
}

/// Stable 40-character reference string for a segmented task
///
/// Segmented tasks have no content hash; external references use a digest of the id and
/// the request source so they look like and sort like swarm hashes.
pub fn segmented_item_hash(id: SegmentedId, source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(id.get().to_be_bytes());
    hasher.update(source.as_bytes());
    hasher.finalize()[..20]
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn decode_base32(input: &str) -> Option<[u8; 20]> {
    let mut out = [0u8; 20];
    let mut buffer: u64 = 0;
    let mut bits = 0u32;
    let mut written = 0usize;
    for c in input.bytes() {
        let value = match c {
            b'A'..=b'Z' => c - b'A',
            b'a'..=b'z' => c - b'a',
            b'2'..=b'7' => c - b'2' + 26,
            _ => return None,
        };
        buffer = (buffer << 5) | u64::from(value);
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            *out.get_mut(written)? = (buffer >> bits) as u8;
            written += 1;
        }
    }
    (written == 20).then_some(out)
}
