pub mod auth;
pub mod bytes;
pub mod codec;
pub mod declar;
pub mod packet;

/// Packet framing constants (§6): 3-byte little-endian length + 1-byte sequence id.
pub const PACKET_HEADER_SIZE: usize = 4;
pub const MAX_BODY_LENGTH: usize = 0x00FF_FFFF;
pub const NULL_TERMINATOR: u8 = 0;

/// `utf8mb4_general_ci`, the default handshake character set.
pub const UTF8_MB4_GENERAL_CI: u8 = 45;

/// Length of the handshake challenge seed and the client's login signature (§6).
pub const SCRAMBLE_LENGTH: usize = 20;
