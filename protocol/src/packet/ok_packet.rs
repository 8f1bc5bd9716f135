use crate::codec::{write_len_enc_int, write_len_enc_str};
use crate::packet::response_type::ResponseType;

#[derive(Debug, Clone, Default)]
pub struct OkPacket {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status_flags: u16,
    pub warnings: u16,
    pub info: String,
}

impl OkPacket {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(ResponseType::OK);
        write_len_enc_int(&mut buf, self.affected_rows);
        write_len_enc_int(&mut buf, self.last_insert_id);
        buf.extend_from_slice(&self.status_flags.to_le_bytes());
        buf.extend_from_slice(&self.warnings.to_le_bytes());
        if !self.info.is_empty() {
            write_len_enc_str(&mut buf, &self.info);
        }
        buf
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EndOfFilePacket {
    pub warning_count: u16,
    pub status_flags: u16,
}

impl EndOfFilePacket {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(ResponseType::EOF);
        buf.extend_from_slice(&self.warning_count.to_le_bytes());
        buf.extend_from_slice(&self.status_flags.to_le_bytes());
        buf
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ok_packet_leads_with_the_ok_marker() {
        let packet = OkPacket { affected_rows: 1, ..Default::default() };
        assert_eq!(packet.encode()[0], ResponseType::OK);
    }
}
