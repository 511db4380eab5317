use crate::error::Error;
use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// JSON codec. The engine speaks JSON end to end; the codec is a struct
/// rather than free functions so decoder strategies can name it.
pub struct Json;

impl Json {
    pub const CONTENT_TYPE: &'static str = "application/json";

    pub fn decode<T: DeserializeOwned>(bytes: &Bytes) -> Result<T, Error> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::parse(e, truncate_lossy(bytes, 8 * 1024)))
    }

    pub fn encode<T: Serialize>(value: &T) -> Result<Bytes, Error> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|e| Error::parse(e, "<encode>"))
    }
}

/// Lossy UTF-8 preview capped at `max_chars`, with an ellipsis when cut.
pub(crate) fn truncate_lossy(bytes: &[u8], max_chars: usize) -> String {
    if max_chars == 0 {
        return String::new();
    }
    // Worst case UTF-8 expansion: cap the byte slice by ~4 bytes per char.
    let max_bytes = max_chars.saturating_mul(4).max(1);
    let slice_len = bytes.len().min(max_bytes);
    let s = String::from_utf8_lossy(&bytes[..slice_len]);
    let mut out = String::new();
    let mut it = s.chars();
    for _ in 0..max_chars {
        match it.next() {
            Some(c) => out.push(c),
            None => break,
        }
    }
    if it.next().is_some() || slice_len < bytes.len() {
        out.push('…');
    }
    out
}
