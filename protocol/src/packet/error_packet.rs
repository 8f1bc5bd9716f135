use common::err::SqliteServerError;

use crate::packet::response_type::ResponseType;

/// Encodes a §7 error into the frontend protocol's error packet: a header
/// byte, a 2-byte error code, a `#`-prefixed 5-byte SQLSTATE, and a
/// human-readable message, consistent with every propagation rule in §7.
pub fn encode_error_packet(err: &SqliteServerError, error_code: u16) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.push(ResponseType::ERROR);
    buf.extend_from_slice(&error_code.to_le_bytes());
    buf.push(b'#');
    buf.extend_from_slice(err.sql_state().as_bytes());
    buf.extend_from_slice(err.to_string().as_bytes());
    buf
}

/// Deterministic mapping of error kinds to a numeric error code band. Real
/// frontend-protocol error codes aren't specified by the design (on-wire
/// encoders are out of scope per spec §1); these exist so distinct error
/// kinds are at least distinguishable by a client parsing the packet.
pub fn error_code_for(err: &SqliteServerError) -> u16 {
    match err {
        SqliteServerError::Parse { .. } => 1064,
        SqliteServerError::PermissionDenied(_) => 1045,
        SqliteServerError::ReadOnlyViolation => 1792,
        SqliteServerError::Busy(_) => 1205,
        SqliteServerError::UniqueViolation(_) => 1062,
        SqliteServerError::Io(_) => 2013,
        SqliteServerError::Protocol(_) => 1047,
        SqliteServerError::ImplicitCommit(_) => 1180,
        SqliteServerError::Network(_) => 2006,
        SqliteServerError::Timeout(_) => 1040,
        SqliteServerError::Config(_) => 1193,
    }
}
