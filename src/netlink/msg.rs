use byteorder::{ByteOrder, NativeEndian};

use crate::buffer::Buffer;
use crate::error::{require_bytes, Error, Result};

pub const NLMSG_HDR_LEN: usize = 16;
pub const GENLMSG_HDR_LEN: usize = 4;
pub const NLA_HDR_LEN: usize = 4;

pub const NLMSG_NOOP: u16 = 1;
pub const NLMSG_ERROR: u16 = 2;
pub const NLMSG_DONE: u16 = 3;
pub const NLMSG_OVERRUN: u16 = 4;
pub const NLMSG_MIN_TYPE: u16 = 0x10;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NlmFlags: u16 {
        const REQUEST    = 0x01;
        const MULTI      = 0x02;
        const ACK        = 0x04;
        const ECHO       = 0x08;
        const DUMP_INTR  = 0x10;
        const ROOT       = 0x100;
        const MATCH      = 0x200;
        const DUMP       = Self::ROOT.bits() | Self::MATCH.bits();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NlmsgHeader {
    pub len: u32,
    pub msg_type: u16,
    pub flags: NlmFlags,
    pub seq: u32,
    pub pid: u32,
}

impl NlmsgHeader {
    pub fn parse(buf: &[u8]) -> Result<NlmsgHeader> {
        require_bytes(buf, NLMSG_HDR_LEN)?;
        let len = NativeEndian::read_u32(&buf[0..4]);
        if (len as usize) < NLMSG_HDR_LEN || len as usize > buf.len() {
            return Err(Error::BadLength {
                length: len as u16,
                available: buf.len(),
            });
        }
        Ok(NlmsgHeader {
            len,
            msg_type: NativeEndian::read_u16(&buf[4..6]),
            flags: NlmFlags::from_bits_truncate(NativeEndian::read_u16(&buf[6..8])),
            seq: NativeEndian::read_u32(&buf[8..12]),
            pid: NativeEndian::read_u32(&buf[12..16]),
        })
    }

}

/// Netlink fields are native-endian, not network-endian (unlike the
/// OpenFlow payload they carry). `Buffer`'s appenders are all
/// network-order, so the netlink framing code writes header fields by hand
/// via native-endian byte conversion instead of reusing `Buffer::put_u32`.
pub fn write_nlmsg_header(buf: &mut Buffer, header: &NlmsgHeader) {
    buf.put_bytes(&header.len.to_ne_bytes());
    buf.put_bytes(&header.msg_type.to_ne_bytes());
    buf.put_bytes(&header.flags.bits().to_ne_bytes());
    buf.put_bytes(&header.seq.to_ne_bytes());
    buf.put_bytes(&header.pid.to_ne_bytes());
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenlMsgHeader {
    pub cmd: u8,
    pub version: u8,
}

pub fn write_genlmsg_header(buf: &mut Buffer, header: &GenlMsgHeader) {
    buf.put_u8(header.cmd);
    buf.put_u8(header.version);
    buf.put_zeros(2); // reserved
}

pub fn parse_genlmsg_header(buf: &[u8]) -> Result<GenlMsgHeader> {
    require_bytes(buf, GENLMSG_HDR_LEN)?;
    Ok(GenlMsgHeader {
        cmd: buf[0],
        version: buf[1],
    })
}

fn pad_to_4(len: usize) -> usize {
    (4 - (len % 4)) % 4
}

/// Builds a complete netlink message: `nlmsghdr` + `genlmsghdr`, with
/// `nlmsg_len` left for the caller to fill in via `patch_nlmsg_len` once
/// the attribute TLVs have been appended.
pub fn start_genl_message(
    buf: &mut Buffer,
    msg_type: u16,
    flags: NlmFlags,
    seq: u32,
    pid: u32,
    cmd: u8,
    genl_version: u8,
) {
    write_nlmsg_header(
        buf,
        &NlmsgHeader {
            len: 0,
            msg_type,
            flags,
            seq,
            pid,
        },
    );
    write_genlmsg_header(
        buf,
        &GenlMsgHeader {
            cmd,
            version: genl_version,
        },
    );
}

/// Patches the `nlmsg_len` field (the first 4 bytes) to `buf.len()`. Call
/// once after all attributes have been appended.
pub fn patch_nlmsg_len(buf: &mut Buffer) {
    let len = buf.len() as u32;
    buf.patch_bytes(0, &len.to_ne_bytes());
}

/// Appends one attribute TLV: a 4-byte `{len, type}` header (native-endian,
/// `len` is the *unpadded* total including this header) followed by
/// `value` and zero pad bytes up to the next 4-byte boundary.
pub fn put_attr(buf: &mut Buffer, attr_type: u16, value: &[u8]) {
    let total_len = (NLA_HDR_LEN + value.len()) as u16;
    buf.put_bytes(&total_len.to_ne_bytes());
    buf.put_bytes(&attr_type.to_ne_bytes());
    buf.put_bytes(value);
    buf.put_zeros(pad_to_4(value.len()));
}

pub fn put_attr_u32(buf: &mut Buffer, attr_type: u16, value: u32) {
    put_attr(buf, attr_type, &value.to_ne_bytes());
}

pub fn put_attr_u16(buf: &mut Buffer, attr_type: u16, value: u16) {
    put_attr(buf, attr_type, &value.to_ne_bytes());
}

pub fn put_attr_str(buf: &mut Buffer, attr_type: u16, value: &str) {
    let mut bytes = value.as_bytes().to_vec();
    bytes.push(0);
    put_attr(buf, attr_type, &bytes);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawAttr<'a> {
    pub attr_type: u16,
    pub value: &'a [u8],
}

/// Walks a buffer of back-to-back attribute TLVs. Unknown types are simply
/// yielded; policy validation happens one layer up in `policy.rs`.
pub fn parse_attrs(mut buf: &[u8]) -> Result<Vec<RawAttr<'_>>> {
    let mut attrs = Vec::new();
    while !buf.is_empty() {
        require_bytes(buf, NLA_HDR_LEN)?;
        let len = NativeEndian::read_u16(&buf[0..2]) as usize;
        let attr_type = NativeEndian::read_u16(&buf[2..4]);
        if len < NLA_HDR_LEN {
            return Err(Error::AttrBadLen {
                index: attr_type,
                len,
            });
        }
        require_bytes(buf, len)?;
        let value = &buf[NLA_HDR_LEN..len];
        attrs.push(RawAttr { attr_type, value });
        let consumed = len + pad_to_4(len - NLA_HDR_LEN);
        let consumed = consumed.min(buf.len());
        buf = &buf[consumed..];
    }
    Ok(attrs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_round_trips_with_padding() {
        let mut buf = Buffer::new();
        put_attr(&mut buf, 3, b"abc"); // 3 bytes -> 1 pad byte
        assert_eq!(buf.len(), NLA_HDR_LEN + 3 + 1);
        let attrs = parse_attrs(buf.as_slice()).unwrap();
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs[0].attr_type, 3);
        assert_eq!(attrs[0].value, b"abc");
    }

    #[test]
    fn multiple_attributes_parse_in_order() {
        let mut buf = Buffer::new();
        put_attr_u32(&mut buf, 1, 7);
        put_attr_u16(&mut buf, 2, 9);
        let attrs = parse_attrs(buf.as_slice()).unwrap();
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs[0].attr_type, 1);
        assert_eq!(attrs[1].attr_type, 2);
    }

    #[test]
    fn nlmsg_len_covers_the_whole_built_message() {
        let mut buf = Buffer::new();
        start_genl_message(&mut buf, 0x10, NlmFlags::REQUEST, 1, 0, 5, 1);
        put_attr_u32(&mut buf, 1, 0);
        patch_nlmsg_len(&mut buf);
        let header = NlmsgHeader::parse(buf.as_slice()).unwrap();
        assert_eq!(header.len as usize, buf.len());
        let genl = parse_genlmsg_header(&buf.as_slice()[NLMSG_HDR_LEN..]).unwrap();
        assert_eq!(genl.cmd, 5);
        let attrs = parse_attrs(&buf.as_slice()[NLMSG_HDR_LEN + GENLMSG_HDR_LEN..]).unwrap();
        assert_eq!(attrs.len(), 1);
    }
}
