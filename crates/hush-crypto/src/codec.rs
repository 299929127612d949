//! base64url and fixed-width binary packing helpers

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, URL_SAFE_NO_PAD};
use base64::engine::DecodePaddingMode;
use base64::Engine;

use hush_core::{HushError, HushResult};

/// Encode bytes as base64url without `=` padding.
pub fn b64url_encode(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Decodes with canonical `=` padding or none; any other padding is rejected.
const URL_SAFE_PAD_OPTIONAL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decode base64url, padded or not.
pub fn b64url_decode(s: &str) -> HushResult<Vec<u8>> {
    URL_SAFE_PAD_OPTIONAL
        .decode(s.trim())
        .map_err(|e| HushError::MalformedKey(format!("base64url decode: {e}")))
}

/// Append `value` as 4 little-endian bytes.
pub fn pack_u32_le(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Read a little-endian u32 from the front of `data`, returning it and the rest.
pub fn read_u32_le(data: &[u8]) -> HushResult<(u32, &[u8])> {
    if data.len() < 4 {
        return Err(HushError::MalformedEnvelope(format!(
            "length prefix truncated: {} bytes (need 4)",
            data.len()
        )));
    }
    let (prefix, rest) = data.split_at(4);
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(prefix);
    Ok((u32::from_le_bytes(bytes), rest))
}

/// Split off exactly `len` bytes, failing if the buffer is shorter.
pub fn take(data: &[u8], len: usize) -> HushResult<(&[u8], &[u8])> {
    if len > data.len() {
        return Err(HushError::MalformedEnvelope(format!(
            "declared length {len} exceeds remaining {} bytes",
            data.len()
        )));
    }
    Ok(data.split_at(len))
}

/// First `n` lowercase hex characters of `data`.
pub fn hex_prefix(data: &[u8], n: usize) -> String {
    let mut s = hex::encode(data);
    s.truncate(n);
    s
}
