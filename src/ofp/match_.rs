use byteorder::{ByteOrder, NetworkEndian};

use crate::buffer::Buffer;
use crate::error::{require_bytes, Result};

bitflags::bitflags! {
    /// Bits that exclude the corresponding field from matching. Mirrors
    /// `enum ofp_flow_wildcards`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Wildcards: u16 {
        const IN_PORT = 1 << 0;
        const DL_VLAN = 1 << 1;
        const DL_SRC  = 1 << 2;
        const DL_DST  = 1 << 3;
        const DL_TYPE = 1 << 4;
        const NW_SRC  = 1 << 5;
        const NW_DST  = 1 << 6;
        const NW_PROTO = 1 << 7;
        const TP_SRC  = 1 << 8;
        const TP_DST  = 1 << 9;
        const ALL = (1 << 10) - 1;
    }
}

/// VLAN id sentinel meaning "no VLAN header present" (match) or "strip the
/// VLAN header" (action).
pub const DL_VLAN_NONE: u16 = 0xffff;

pub const MATCH_LEN: usize = 36;

/// The 10-tuple flow match. Always 36 bytes on the wire, including three
/// zero pad bytes after `nw_proto` that keep `tp_src` on a 2-byte boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub wildcards: Wildcards,
    pub in_port: u16,
    pub dl_src: [u8; 6],
    pub dl_dst: [u8; 6],
    pub dl_vlan: u16,
    pub dl_type: u16,
    pub nw_src: u32,
    pub nw_dst: u32,
    pub nw_proto: u8,
    pub tp_src: u16,
    pub tp_dst: u16,
}

impl Match {
    pub fn exact(in_port: u16, dl_src: [u8; 6], dl_dst: [u8; 6]) -> Match {
        Match {
            wildcards: Wildcards::empty(),
            in_port,
            dl_src,
            dl_dst,
            dl_vlan: DL_VLAN_NONE,
            dl_type: 0,
            nw_src: 0,
            nw_dst: 0,
            nw_proto: 0,
            tp_src: 0,
            tp_dst: 0,
        }
    }

    pub fn wildcard_all() -> Match {
        Match {
            wildcards: Wildcards::ALL,
            in_port: 0,
            dl_src: [0; 6],
            dl_dst: [0; 6],
            dl_vlan: DL_VLAN_NONE,
            dl_type: 0,
            nw_src: 0,
            nw_dst: 0,
            nw_proto: 0,
            tp_src: 0,
            tp_dst: 0,
        }
    }

    pub fn parse(buf: &[u8]) -> Result<Match> {
        require_bytes(buf, MATCH_LEN)?;
        let wildcards = Wildcards::from_bits_truncate(NetworkEndian::read_u16(&buf[0..2]));
        let in_port = NetworkEndian::read_u16(&buf[2..4]);
        let mut dl_src = [0u8; 6];
        dl_src.copy_from_slice(&buf[4..10]);
        let mut dl_dst = [0u8; 6];
        dl_dst.copy_from_slice(&buf[10..16]);
        let dl_vlan = NetworkEndian::read_u16(&buf[16..18]);
        let dl_type = NetworkEndian::read_u16(&buf[18..20]);
        let nw_src = NetworkEndian::read_u32(&buf[20..24]);
        let nw_dst = NetworkEndian::read_u32(&buf[24..28]);
        let nw_proto = buf[28];
        // buf[29..32] is zero pad.
        let tp_src = NetworkEndian::read_u16(&buf[32..34]);
        let tp_dst = NetworkEndian::read_u16(&buf[34..36]);
        Ok(Match {
            wildcards,
            in_port,
            dl_src,
            dl_dst,
            dl_vlan,
            dl_type,
            nw_src,
            nw_dst,
            nw_proto,
            tp_src,
            tp_dst,
        })
    }

    pub fn write(&self, buf: &mut Buffer) {
        buf.put_u16(self.wildcards.bits());
        buf.put_u16(self.in_port);
        buf.put_bytes(&self.dl_src);
        buf.put_bytes(&self.dl_dst);
        buf.put_u16(self.dl_vlan);
        buf.put_u16(self.dl_type);
        buf.put_u32(self.nw_src);
        buf.put_u32(self.nw_dst);
        buf.put_u8(self.nw_proto);
        buf.put_zeros(3);
        buf.put_u16(self.tp_src);
        buf.put_u16(self.tp_dst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_exact_match() {
        let m = Match::exact(1, [2, 0, 0, 0, 0, 1], [2, 0, 0, 0, 0, 2]);
        let mut buf = Buffer::new();
        m.write(&mut buf);
        assert_eq!(buf.len(), MATCH_LEN);
        let parsed = Match::parse(buf.as_slice()).unwrap();
        assert_eq!(parsed, m);
    }

    #[test]
    fn pad_bytes_are_zero_on_write() {
        let m = Match::wildcard_all();
        let mut buf = Buffer::new();
        m.write(&mut buf);
        assert_eq!(&buf.as_slice()[29..32], &[0, 0, 0]);
    }
}
