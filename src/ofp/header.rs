use byteorder::{ByteOrder, NetworkEndian};

use crate::error::{require_bytes, Error, Result};

pub const OFP_VERSION: u8 = 1;
pub const HEADER_LEN: usize = 8;

/// Max ports a physical switch may have; used to size `OFP_MAXLEN`.
pub const OFPP_MAX: u16 = 0x100;

/// `8 (header) + 12 (data_hello fixed fields) + 2 (miss_send_len) + 2 (pad)
/// + OFPP_MAX * 48 (phy_port)`, rounded up with slack exactly as the
/// original reserves it.
pub const OFP_MAXLEN: usize = HEADER_LEN + 32 + OFPP_MAX as usize * 48 + 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    ControlHello = 0,
    DataHello = 1,
    PacketIn = 2,
    PacketOut = 3,
    FlowMod = 4,
    FlowExpired = 5,
    Table = 6,
    PortMod = 7,
    PortStatus = 8,
    FlowStatRequest = 9,
    FlowStatReply = 10,
    TableStatRequest = 11,
    TableStatReply = 12,
    PortStatRequest = 13,
    PortStatReply = 14,
}

impl MessageType {
    pub fn from_u8(v: u8) -> Result<MessageType> {
        use MessageType::*;
        Ok(match v {
            0 => ControlHello,
            1 => DataHello,
            2 => PacketIn,
            3 => PacketOut,
            4 => FlowMod,
            5 => FlowExpired,
            6 => Table,
            7 => PortMod,
            8 => PortStatus,
            9 => FlowStatRequest,
            10 => FlowStatReply,
            11 => TableStatRequest,
            12 => TableStatReply,
            13 => PortStatRequest,
            14 => PortStatReply,
            other => return Err(Error::BadType(other)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub message_type: MessageType,
    /// Total message length, header included. Always matches the buffer
    /// this header was decoded from once validated.
    pub length: u16,
    pub xid: u32,
}

impl Header {
    pub fn new(message_type: MessageType, xid: u32) -> Header {
        Header {
            version: OFP_VERSION,
            message_type,
            length: 0,
            xid,
        }
    }

    /// Parses the 8-byte header and validates version/type/length against
    /// `available`, the number of bytes actually in the buffer. Does not
    /// consume anything; the caller slices past `HEADER_LEN` itself.
    pub fn parse(buf: &[u8]) -> Result<Header> {
        require_bytes(buf, HEADER_LEN)?;
        let version = buf[0];
        if version != OFP_VERSION {
            return Err(Error::BadVersion(version));
        }
        let message_type = MessageType::from_u8(buf[1])?;
        let length = NetworkEndian::read_u16(&buf[2..4]);
        if (length as usize) < HEADER_LEN || length as usize > buf.len() {
            return Err(Error::BadLength {
                length,
                available: buf.len(),
            });
        }
        let xid = NetworkEndian::read_u32(&buf[4..8]);
        Ok(Header {
            version,
            message_type,
            length,
            xid,
        })
    }

    pub fn write(&self, buf: &mut crate::buffer::Buffer) {
        buf.put_u8(self.version);
        buf.put_u8(self.message_type as u8);
        buf.put_u16(self.length);
        buf.put_u32(self.xid);
    }
}

/// Validates version and type and returns the declared total frame length,
/// without requiring that many bytes to already be present in `buf`. Used
/// by stream carriers to decide how many more bytes to wait for before a
/// complete message can be sliced out of a reassembly buffer.
pub fn peek_length(buf: &[u8]) -> Result<usize> {
    require_bytes(buf, HEADER_LEN)?;
    let version = buf[0];
    if version != OFP_VERSION {
        return Err(Error::BadVersion(version));
    }
    MessageType::from_u8(buf[1])?;
    let length = NetworkEndian::read_u16(&buf[2..4]);
    if (length as usize) < HEADER_LEN {
        return Err(Error::BadLength {
            length,
            available: buf.len(),
        });
    }
    Ok(length as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_version() {
        let buf = [2u8, 0, 0, 8, 0, 0, 0, 0];
        assert!(matches!(Header::parse(&buf), Err(Error::BadVersion(2))));
    }

    #[test]
    fn rejects_length_beyond_buffer() {
        let buf = [1u8, 0, 0, 100, 0, 0, 0, 0];
        assert!(matches!(Header::parse(&buf), Err(Error::BadLength { .. })));
    }

    #[test]
    fn round_trips_header_fields() {
        let mut buf = crate::buffer::Buffer::new();
        let h = Header {
            version: OFP_VERSION,
            message_type: MessageType::FlowMod,
            length: 8,
            xid: 42,
        };
        h.write(&mut buf);
        let parsed = Header::parse(buf.as_slice()).unwrap();
        assert_eq!(parsed, h);
    }
}
