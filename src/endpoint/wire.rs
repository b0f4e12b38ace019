//! Wire codec for the leader/follower protocol
//!
//! The protocol is private to processes of the same application, so the
//! only hard requirement is that both ends agree. Every integer on the
//! wire is a little-endian `u64`.
//!
//! Handshake (once per connection, both directions):
//! `[value: u64]` — the follower sends its pid, the leader replies with
//! the id it assigned to the connection.
//!
//! Steady state: `[len: u64][len raw bytes]`, repeated.

use bytes::{BufMut, Bytes, BytesMut};

/// Width of the handshake value and of the frame length prefix, in bytes.
pub const WORD: usize = 8;

/// Largest body a peer may declare. Anything above this is treated as a
/// desynced stream and the connection is dropped, since framing cannot
/// be realigned safely.
pub const MAX_FRAME_LEN: u64 = 256 * 1024 * 1024;

/// Encode a handshake value.
pub fn encode_handshake(value: u64) -> [u8; WORD] {
    value.to_le_bytes()
}

/// Decode a handshake value or a frame length prefix.
pub fn decode_word(word: [u8; WORD]) -> u64 {
    u64::from_le_bytes(word)
}

/// Encode one `[len][body]` frame.
pub fn encode_frame(payload: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(WORD + payload.len());
    out.put_u64_le(payload.len() as u64);
    out.put_slice(payload);
    out.freeze()
}
