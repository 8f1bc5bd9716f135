use common::err::SqliteServerError;

/// Command-phase opcodes, numbered after the frontend protocol's own
/// command byte so a real client library lines up with this server.
pub mod opcode {
    pub const QUIT: u8 = 0x01;
    pub const INIT_DB: u8 = 0x02;
    pub const QUERY: u8 = 0x03;
    pub const PING: u8 = 0x0e;
}

/// A single decoded command-phase frame (§4.4 step 1). The exact frame
/// layout is an external collaborator's concern (spec §1); this is the
/// structured form the processor dispatches on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Query(String),
    InitDb(String),
    Ping,
    Quit,
}

impl Command {
    pub fn decode(payload: &[u8]) -> Result<Self, SqliteServerError> {
        let (&op, rest) = payload
            .split_first()
            .ok_or_else(|| SqliteServerError::Protocol("empty command frame".to_string()))?;
        match op {
            opcode::QUIT => Ok(Command::Quit),
            opcode::PING => Ok(Command::Ping),
            opcode::INIT_DB => Ok(Command::InitDb(to_utf8(rest)?)),
            opcode::QUERY => Ok(Command::Query(to_utf8(rest)?)),
            other => Err(SqliteServerError::Protocol(format!("unknown command opcode 0x{other:02x}"))),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Command::Quit => vec![opcode::QUIT],
            Command::Ping => vec![opcode::PING],
            Command::InitDb(db) => {
                let mut buf = vec![opcode::INIT_DB];
                buf.extend_from_slice(db.as_bytes());
                buf
            }
            Command::Query(sql) => {
                let mut buf = vec![opcode::QUERY];
                buf.extend_from_slice(sql.as_bytes());
                buf
            }
        }
    }
}

fn to_utf8(bytes: &[u8]) -> Result<String, SqliteServerError> {
    String::from_utf8(bytes.to_vec()).map_err(|e| SqliteServerError::Protocol(e.to_string()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn query_round_trips() {
        let cmd = Command::Query("select 1".to_string());
        assert_eq!(Command::decode(&cmd.encode()).unwrap(), cmd);
    }

    #[test]
    fn unknown_opcode_is_a_protocol_error() {
        assert!(Command::decode(&[0x99]).is_err());
    }
}
