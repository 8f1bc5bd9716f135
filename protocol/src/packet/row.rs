use std::io::Cursor;

use common::err::SqliteServerError;

use crate::codec::write_len_enc_str;

pub const NULL_MARKER: u8 = 0xfb;

/// A single result-set row of nullable text values (text protocol).
#[derive(Debug, Clone)]
pub struct RowPacket {
    pub cells: Vec<Option<String>>,
}

impl RowPacket {
    pub fn new(cells: Vec<Option<String>>) -> Self {
        RowPacket { cells }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        for cell in &self.cells {
            match cell {
                Some(value) => write_len_enc_str(&mut buf, value),
                None => buf.push(NULL_MARKER),
            }
        }
        buf
    }

    pub fn parse(packet: &[u8], column_count: usize) -> Result<Self, SqliteServerError> {
        let mut cursor = Cursor::new(packet);
        let mut cells = Vec::with_capacity(column_count);
        for _ in 0..column_count {
            if cursor.position() as usize >= packet.len() {
                break;
            }
            if packet[cursor.position() as usize] == NULL_MARKER {
                cursor.set_position(cursor.position() + 1);
                cells.push(None);
            } else {
                cells.push(Some(crate::codec::read_len_enc_str(&mut cursor)?));
            }
        }
        Ok(RowPacket { cells })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn row_round_trips_with_nulls() {
        let row = RowPacket::new(vec![Some("a".to_string()), None, Some("bc".to_string())]);
        let decoded = RowPacket::parse(&row.encode(), 3).unwrap();
        assert_eq!(decoded.cells, row.cells);
    }
}
