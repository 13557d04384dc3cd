//! `MsgPack` envelope codec.
//!
//! One envelope is one `MsgPack` value; the transport preserves message
//! boundaries, so no framing or length prefix is added here. Encoding uses
//! named maps (`rmp_serde::to_vec_named`) so both ends agree on the
//! `method`/`args` keys regardless of field order.

use std::io::Cursor;

use serde::Deserialize;

use crate::envelope::Envelope;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error decoding inbound envelope bytes.
///
/// Always terminal for that single envelope: callers log and drop the frame,
/// never crash, and never observe a partially populated [`Envelope`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The buffer is truncated or structurally invalid `MsgPack`.
    #[error("malformed envelope bytes: {0}")]
    Malformed(#[from] rmp_serde::decode::Error),
    /// A complete envelope decoded, but bytes were left over. The transport
    /// delivers exactly one envelope per frame, so trailing data means the
    /// frame was corrupted or mis-framed upstream.
    #[error("{remaining} trailing bytes after envelope")]
    TrailingBytes {
        /// Number of undecoded bytes left in the frame.
        remaining: usize,
    },
}

/// Error encoding an envelope for the wire.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// An argument value is not representable in the wire format.
    #[error("unencodable envelope: {0}")]
    Unrepresentable(#[from] rmp_serde::encode::Error),
}

// ---------------------------------------------------------------------------
// Encode / decode
// ---------------------------------------------------------------------------

/// Encodes an envelope to its wire bytes.
///
/// The output satisfies the round-trip law: `decode(encode(e)) == e` for
/// every envelope whose arguments are representable, modulo `MsgPack`-level
/// normalization (fixed numeric widths, no "undefined" distinct from nil).
///
/// # Errors
///
/// Returns [`EncodeError`] when an argument value cannot be represented.
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, EncodeError> {
    Ok(rmp_serde::to_vec_named(envelope)?)
}

/// Decodes one envelope from a transport frame.
///
/// # Errors
///
/// Returns [`DecodeError`] for truncated or structurally invalid input, and
/// for frames with trailing bytes after a complete envelope.
pub fn decode(bytes: &[u8]) -> Result<Envelope, DecodeError> {
    let mut cursor = Cursor::new(bytes);
    let envelope = {
        let mut deserializer = rmp_serde::Deserializer::new(&mut cursor);
        Envelope::deserialize(&mut deserializer)?
    };
    let consumed = usize::try_from(cursor.position()).unwrap_or(usize::MAX);
    if consumed < bytes.len() {
        return Err(DecodeError::TrailingBytes {
            remaining: bytes.len() - consumed,
        });
    }
    Ok(envelope)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
