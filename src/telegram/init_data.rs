//! Signature check for the mini-app `init_data` query string.
//!
//! The data-check string is every `key=value` pair except `hash`, sorted by
//! key and joined with `\n`. It is signed with HMAC-SHA256 keyed by
//! `SHA-256(bot_token)`; `hash` carries the hex digest.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

type HmacSha256 = Hmac<Sha256>;

pub fn verify_init_data(init_data: &str, bot_token: &str) -> bool {
    if init_data.is_empty() {
        return false;
    }

    let mut fields = parse_query(init_data);
    let Some(received_hash) = fields.remove("hash") else {
        return false;
    };
    // The digest is sent as lowercase hex; anything else is a mismatch.
    if !received_hash
        .bytes()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    {
        return false;
    }
    let Ok(expected) = hex::decode(&received_hash) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(&secret_key(bot_token)) else {
        return false;
    };
    mac.update(data_check_string(&fields).as_bytes());

    // Constant-time comparison
    mac.verify_slice(&expected).is_ok()
}

fn secret_key(bot_token: &str) -> Vec<u8> {
    Sha256::digest(bot_token.as_bytes()).to_vec()
}

fn data_check_string(fields: &BTreeMap<String, String>) -> String {
    fields
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Form-urlencoded parsing: `+` is a space, blank values are kept and a
/// repeated key keeps its last value.
fn parse_query(query: &str) -> BTreeMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(key), decode_component(value))
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    String::from_utf8_lossy(&urlencoding::decode_binary(spaced.as_bytes())).into_owned()
}
