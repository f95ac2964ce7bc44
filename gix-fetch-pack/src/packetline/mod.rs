//! pkt-line framing for the client side of the fetch protocol.
//!
//! Each packet starts with four hexadecimal ASCII digits giving the total
//! length of the packet, header included. `0000` is the flush packet.
//! Encoding and header decoding are done by `gix-packetline`.
//!
//! Writes are buffered by the caller's stream. Anything written must be
//! followed by [`PacketLineOut::end()`] or [`PacketLineOut::flush()`] before
//! blocking on a read that depends on it, as the remote won't answer earlier.

mod read;
pub(crate) mod sideband;
mod write;

pub use read::{parse_ack, PacketLineIn};
pub use sideband::{HandleProgress, SideBandReader};
pub use write::PacketLineOut;

/// Size of the length header in bytes.
pub const HEADER_LEN: usize = 4;
