pub mod column;
pub mod command;
pub mod error_packet;
pub mod handshake_packet;
pub mod ok_packet;
pub mod response_type;
pub mod row;

use std::io::{self, Cursor, Read, Write};

use byteorder::WriteBytesExt;

use crate::{MAX_BODY_LENGTH, PACKET_HEADER_SIZE};

/// Reads one length-prefixed frame (3-byte LE length + 1-byte sequence id,
/// per §6) from `reader`. Returns `None` on a clean EOF before any header
/// byte is read (peer closed the connection between statements).
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Option<(u8, Vec<u8>)>> {
    let mut header = [0u8; PACKET_HEADER_SIZE];
    match reader.read_exact(&mut header) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
    let seq = header[3];
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(Some((seq, payload)))
}

/// Writes one or more length-prefixed frames for `payload`, splitting at
/// `MAX_BODY_LENGTH` the way the frontend protocol requires for payloads
/// that don't fit a single 3-byte length (a final zero-length frame closes
/// a payload that was an exact multiple of the split size).
pub fn write_frames<W: Write>(writer: &mut W, mut seq: u8, mut payload: &[u8]) -> io::Result<u8> {
    loop {
        let chunk_len = payload.len().min(MAX_BODY_LENGTH);
        let (chunk, rest) = payload.split_at(chunk_len);
        write_header(writer, chunk_len, seq)?;
        writer.write_all(chunk)?;
        seq = seq.wrapping_add(1);
        payload = rest;
        if chunk_len < MAX_BODY_LENGTH {
            break;
        }
        if payload.is_empty() {
            write_header(writer, 0, seq)?;
            seq = seq.wrapping_add(1);
            break;
        }
    }
    Ok(seq)
}

fn write_header<W: Write>(writer: &mut W, len: usize, seq: u8) -> io::Result<()> {
    let bytes = (len as u32).to_le_bytes();
    writer.write_all(&bytes[..3])?;
    writer.write_u8(seq)
}

pub fn frame_into_buffer(buf: &mut Vec<u8>, seq: u8, payload: &[u8]) {
    let mut cursor = Cursor::new(Vec::new());
    let _ = write_frames(&mut cursor, seq, payload);
    buf.extend_from_slice(&cursor.into_inner());
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn frame_round_trips_a_small_payload() {
        let mut buf = Vec::new();
        write_frames(&mut buf, 0, b"select 1").unwrap();
        let mut cursor = Cursor::new(buf.as_slice());
        let (seq, payload) = read_frame(&mut cursor).unwrap().unwrap();
        assert_eq!(seq, 0);
        assert_eq!(payload, b"select 1");
    }

    #[test]
    fn read_frame_returns_none_on_clean_eof() {
        let mut cursor = Cursor::new(&[][..]);
        assert!(read_frame(&mut cursor).unwrap().is_none());
    }
}
