//! The 20-byte handshake preamble exchanged before any chunked message.
//!
//! The client sends a fixed magic value followed by four proposed
//! versions, most-preferred first; the server echoes back the single
//! version it agreed to, or four zero bytes if none matched.

/// `0x60 0x60 0xB0 0x17` — identifies the connection as Bolt, not some
/// other protocol that happens to share the port.
pub const MAGIC_PREAMBLE: [u8; 4] = [0x60, 0x60, 0xB0, 0x17];

/// This implementation only ever proposes/accepts Bolt v1.
pub const SUPPORTED_VERSION: u32 = 1;

/// All-zero version response means "no proposed version is acceptable".
pub const VERSION_NONE: u32 = 0;

/// Build the 20-byte client handshake: magic preamble followed by four
/// big-endian `u32` version proposals. This implementation proposes v1 in
/// the first slot and leaves the rest zero-filled, matching how a
/// single-version client behaves in practice.
pub fn client_proposal() -> [u8; 20] {
    let mut buf = [0u8; 20];
    buf[0..4].copy_from_slice(&MAGIC_PREAMBLE);
    buf[4..8].copy_from_slice(&SUPPORTED_VERSION.to_be_bytes());
    buf
}

/// Inspect the four version proposals sent by a client and pick the first
/// one this server supports, if any.
pub fn negotiate(proposals: &[u32; 4]) -> Option<u32> {
    proposals.iter().copied().find(|&v| v == SUPPORTED_VERSION)
}
