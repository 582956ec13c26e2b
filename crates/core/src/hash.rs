use crate::message::Message;
use crate::request::RequestOptions;
use serde::Serialize;
use sha2::{Digest, Sha256};

#[derive(Serialize)]
struct Payload<'a> {
    messages: &'a [Message],
    options: &'a RequestOptions,
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Canonical JSON body the transport receives for these messages and options.
pub fn canonical_payload(
    messages: &[Message],
    options: &RequestOptions,
) -> Result<String, serde_json::Error> {
    // Round-trip through `Value` so every map is emitted with sorted keys.
    let value = serde_json::to_value(Payload { messages, options })?;
    serde_json::to_string(&value)
}

/// Hash used to compare what was produced with what was logged as sent.
pub fn payload_hash(
    messages: &[Message],
    options: &RequestOptions,
) -> Result<String, serde_json::Error> {
    Ok(sha256_hex(canonical_payload(messages, options)?.as_bytes()))
}
