use std::io::{self, Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use common::err::SqliteServerError;

/// Length-encoded integer / string helpers, grounded in the teacher's
/// `binlog::utils::read_len_enc_num`/`read_len_enc_str_with_cursor` (used
/// throughout `connection/src/packet/*.rs`), reimplemented here since this
/// workspace carries no binlog crate.
pub fn read_len_enc_int(cursor: &mut Cursor<&[u8]>) -> Result<u64, SqliteServerError> {
    let first = cursor.read_u8().map_err(SqliteServerError::Io)?;
    match first {
        0xfb => Ok(0), // NULL sentinel; caller distinguishes via read_len_enc_int_or_null
        0xfc => cursor.read_u16::<LittleEndian>().map(|v| v as u64).map_err(SqliteServerError::Io),
        0xfd => {
            let mut buf = [0u8; 3];
            cursor.read_exact(&mut buf).map_err(SqliteServerError::Io)?;
            Ok(u32::from_le_bytes([buf[0], buf[1], buf[2], 0]) as u64)
        }
        0xfe => cursor.read_u64::<LittleEndian>().map_err(SqliteServerError::Io),
        v => Ok(v as u64),
    }
}

pub fn write_len_enc_int(buf: &mut Vec<u8>, value: u64) {
    if value < 251 {
        buf.push(value as u8);
    } else if value < 0x1_0000 {
        buf.push(0xfc);
        buf.extend_from_slice(&(value as u16).to_le_bytes());
    } else if value < 0x1_0000_00 {
        buf.push(0xfd);
        buf.extend_from_slice(&(value as u32).to_le_bytes()[..3]);
    } else {
        buf.push(0xfe);
        buf.extend_from_slice(&value.to_le_bytes());
    }
}

pub fn read_len_enc_str(cursor: &mut Cursor<&[u8]>) -> Result<String, SqliteServerError> {
    let len = read_len_enc_int(cursor)? as usize;
    let mut data = vec![0u8; len];
    cursor.read_exact(&mut data).map_err(SqliteServerError::Io)?;
    String::from_utf8(data).map_err(|e| SqliteServerError::Protocol(e.to_string()))
}

pub fn write_len_enc_str(buf: &mut Vec<u8>, value: &str) {
    write_len_enc_int(buf, value.len() as u64);
    buf.extend_from_slice(value.as_bytes());
}

pub fn read_null_term_string(cursor: &mut Cursor<&[u8]>) -> Result<String, SqliteServerError> {
    let mut bytes = Vec::new();
    loop {
        let b = cursor.read_u8().map_err(SqliteServerError::Io)?;
        if b == 0 {
            break;
        }
        bytes.push(b);
    }
    String::from_utf8(bytes).map_err(|e| SqliteServerError::Protocol(e.to_string()))
}

pub fn write_null_term_string(buf: &mut Vec<u8>, value: &str) -> io::Result<()> {
    buf.write_all(value.as_bytes())?;
    buf.write_u8(0)
}

pub fn read_rest_as_string(cursor: &mut Cursor<&[u8]>) -> Result<String, SqliteServerError> {
    let mut s = String::new();
    cursor.read_to_string(&mut s).map_err(SqliteServerError::Io)?;
    Ok(s)
}
