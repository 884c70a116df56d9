//! Document codec.
//!
//! Layout of an encoded document:
//!
//! ```text
//! magic "SSD\0" | version u8 | payload_len u32 LE | payload | crc32 u32 LE
//! ```
//!
//! The payload is MessagePack, which carries its own type tags, so no schema
//! is needed to decode it.

use crate::document::Document;
use crate::error::{Result, StoreError};
use serde::Deserialize;

/// Magic bytes for encoded documents.
const DOC_MAGIC: &[u8; 4] = b"SSD\0";

/// Current document format version.
const DOC_VERSION: u8 = 1;

/// Deepest container nesting a document may have.
///
/// Enforced when encoding and when decoding, so anything [`encode`] accepts
/// [`decode`] reads back.
pub const MAX_DEPTH: usize = 128;

const HEADER_LEN: usize = DOC_MAGIC.len() + 1 + 4;
const CHECKSUM_LEN: usize = 4;

/// Encode a document into a self-describing byte sequence.
///
/// Fails with [`StoreError::Serialization`] when the document nests deeper
/// than [`MAX_DEPTH`].
pub fn encode(doc: &Document) -> Result<Vec<u8>> {
    let depth = doc.depth();
    if depth > MAX_DEPTH {
        return Err(StoreError::Serialization(format!(
            "document nested {} levels deep, limit is {}",
            depth, MAX_DEPTH
        )));
    }

    let payload = rmp_serde::to_vec(doc)?;
    let payload_len = u32::try_from(payload.len())
        .map_err(|_| StoreError::Serialization(format!("document too large: {} bytes", payload.len())))?;

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len() + CHECKSUM_LEN);
    out.extend_from_slice(DOC_MAGIC);
    out.push(DOC_VERSION);
    out.extend_from_slice(&payload_len.to_le_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());

    Ok(out)
}

/// Decode bytes produced by [`encode`].
///
/// Fails with [`StoreError::CorruptDocument`] on any framing, checksum or
/// payload error.
pub fn decode(bytes: &[u8]) -> Result<Document> {
    if bytes.len() < HEADER_LEN + CHECKSUM_LEN {
        return Err(StoreError::corrupt(format!(
            "truncated document: {} bytes",
            bytes.len()
        )));
    }

    let (magic, rest) = bytes.split_at(DOC_MAGIC.len());
    if magic != DOC_MAGIC {
        return Err(StoreError::corrupt("invalid document magic"));
    }

    let version = rest[0];
    if version != DOC_VERSION {
        return Err(StoreError::corrupt(format!(
            "unsupported document version: {}",
            version
        )));
    }

    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&rest[1..5]);
    let payload_len = u32::from_le_bytes(len_bytes) as usize;

    let body = &rest[5..];
    if body.len() != payload_len + CHECKSUM_LEN {
        return Err(StoreError::corrupt(format!(
            "length mismatch: header says {} payload bytes, found {}",
            payload_len,
            body.len().saturating_sub(CHECKSUM_LEN)
        )));
    }

    let (payload, checksum_bytes) = body.split_at(payload_len);
    let mut stored = [0u8; 4];
    stored.copy_from_slice(checksum_bytes);
    let stored = u32::from_le_bytes(stored);
    let computed = crc32fast::hash(payload);
    if stored != computed {
        return Err(StoreError::corrupt(format!(
            "checksum mismatch: expected {}, got {}",
            stored, computed
        )));
    }

    // The counter trips once it reaches zero, so one extra level of headroom
    // admits exactly MAX_DEPTH nested containers.
    let mut de = rmp_serde::Deserializer::from_read_ref(payload);
    de.set_max_depth(MAX_DEPTH + 1);
    Ok(Document::deserialize(&mut de)?)
}
