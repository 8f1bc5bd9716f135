use std::io::{Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt};

use common::err::SqliteServerError;

use crate::codec::{read_len_enc_str, read_null_term_string, write_null_term_string};
use crate::SCRAMBLE_LENGTH;

/// The handshake-init packet payload (§6): 1-byte protocol version, a
/// length-prefixed server version string, a big-endian 4-byte session id,
/// and a 20-byte challenge seed. Framing (the 3-byte length + sequence
/// header) is applied by `packet::write_frames` around this payload.
#[derive(Debug, Clone)]
pub struct HandshakePacket {
    pub protocol_version: u8,
    pub server_version: String,
    pub connection_id: u32,
    pub challenge_seed: [u8; SCRAMBLE_LENGTH],
}

impl HandshakePacket {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(self.protocol_version);
        let _ = write_null_term_string(&mut buf, &self.server_version);
        buf.extend_from_slice(&self.connection_id.to_be_bytes());
        buf.extend_from_slice(&self.challenge_seed);
        buf
    }

    pub fn parse(packet: &[u8]) -> Result<Self, SqliteServerError> {
        let mut cursor = Cursor::new(packet);
        let protocol_version = cursor.read_u8().map_err(SqliteServerError::Io)?;
        let server_version = read_null_term_string(&mut cursor)?;
        let connection_id = cursor.read_u32::<BigEndian>().map_err(SqliteServerError::Io)?;
        let mut challenge_seed = [0u8; SCRAMBLE_LENGTH];
        cursor.read_exact(&mut challenge_seed).map_err(SqliteServerError::Io)?;
        Ok(HandshakePacket { protocol_version, server_version, connection_id, challenge_seed })
    }
}

/// The login reply payload (§6): protocol version, database name, 4-byte
/// open flags, user name, and the 20-byte login signature.
#[derive(Debug, Clone)]
pub struct LoginPacket {
    pub protocol_version: u8,
    pub database: String,
    pub open_flags: u32,
    pub user: String,
    pub signature: Vec<u8>,
}

impl LoginPacket {
    pub fn parse(packet: &[u8]) -> Result<Self, SqliteServerError> {
        let mut cursor = Cursor::new(packet);
        let protocol_version = cursor.read_u8().map_err(SqliteServerError::Io)?;
        let database = read_len_enc_str(&mut cursor)?;
        let open_flags = cursor.read_u32::<BigEndian>().map_err(SqliteServerError::Io)?;
        let user = read_len_enc_str(&mut cursor)?;
        let mut signature = vec![0u8; SCRAMBLE_LENGTH];
        cursor.read_exact(&mut signature).map_err(SqliteServerError::Io)?;
        Ok(LoginPacket { protocol_version, database, open_flags, user, signature })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(self.protocol_version);
        crate::codec::write_len_enc_str(&mut buf, &self.database);
        buf.extend_from_slice(&self.open_flags.to_be_bytes());
        crate::codec::write_len_enc_str(&mut buf, &self.user);
        buf.extend_from_slice(&self.signature);
        buf
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn handshake_round_trips() {
        let packet = HandshakePacket {
            protocol_version: 10,
            server_version: "sqlited-server-0.1".to_string(),
            connection_id: 7,
            challenge_seed: *b"01234567890123456789",
        };
        let encoded = packet.encode();
        let decoded = HandshakePacket::parse(&encoded).unwrap();
        assert_eq!(decoded.protocol_version, 10);
        assert_eq!(decoded.server_version, "sqlited-server-0.1");
        assert_eq!(decoded.connection_id, 7);
        assert_eq!(decoded.challenge_seed, *b"01234567890123456789");
    }

    #[test]
    fn login_round_trips() {
        let packet = LoginPacket {
            protocol_version: 10,
            database: "main".to_string(),
            open_flags: 0,
            user: "alice".to_string(),
            signature: vec![9u8; 20],
        };
        let decoded = LoginPacket::parse(&packet.encode()).unwrap();
        assert_eq!(decoded.database, "main");
        assert_eq!(decoded.user, "alice");
        assert_eq!(decoded.signature, vec![9u8; 20]);
    }
}
