use byteorder::{ByteOrder, NetworkEndian};

use crate::buffer::Buffer;
use crate::error::{require_bytes, Result};

pub const PHY_PORT_LEN: usize = 36;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PortFlags: u32 {
        const NO_FLOOD = 1 << 0;
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PortFeatures: u32 {
        const MODE_10MB_HD  = 1 << 0;
        const MODE_10MB_FD  = 1 << 1;
        const MODE_100MB_HD = 1 << 2;
        const MODE_100MB_FD = 1 << 3;
        const MODE_1GB_HD   = 1 << 4;
        const MODE_1GB_FD   = 1 << 5;
        const MODE_10GB_FD  = 1 << 6;
    }
}

/// Description of one physical switch port, as carried in `ofp_data_hello`,
/// `ofp_port_mod`, `ofp_port_status`, and `ofp_port_stat_reply`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhyPort {
    pub port_no: u16,
    pub hw_addr: [u8; 6],
    /// Human-readable interface name. Null-terminated on the wire; trailing
    /// NULs are stripped when decoded.
    pub name: String,
    pub flags: PortFlags,
    pub speed: u32,
    pub features: PortFeatures,
}

impl PhyPort {
    pub fn parse(buf: &[u8]) -> Result<PhyPort> {
        require_bytes(buf, PHY_PORT_LEN)?;
        let port_no = NetworkEndian::read_u16(&buf[0..2]);
        let mut hw_addr = [0u8; 6];
        hw_addr.copy_from_slice(&buf[2..8]);
        let raw_name = &buf[8..24];
        let nul = raw_name.iter().position(|&b| b == 0).unwrap_or(raw_name.len());
        let name = String::from_utf8_lossy(&raw_name[..nul]).into_owned();
        let flags = PortFlags::from_bits_truncate(NetworkEndian::read_u32(&buf[24..28]));
        let speed = NetworkEndian::read_u32(&buf[28..32]);
        let features = PortFeatures::from_bits_truncate(NetworkEndian::read_u32(&buf[32..36]));
        Ok(PhyPort {
            port_no,
            hw_addr,
            name,
            flags,
            speed,
            features,
        })
    }

    pub fn write(&self, buf: &mut Buffer) {
        buf.put_u16(self.port_no);
        buf.put_bytes(&self.hw_addr);
        buf.put_fixed(self.name.as_bytes(), 16);
        buf.put_u32(self.flags.bits());
        buf.put_u32(self.speed);
        buf.put_u32(self.features.bits());
    }
}

pub fn parse_all(buf: &[u8]) -> Result<Vec<PhyPort>> {
    if buf.len() % PHY_PORT_LEN != 0 {
        return Err(crate::error::Error::BadAlignment);
    }
    buf.chunks(PHY_PORT_LEN).map(PhyPort::parse).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_port() {
        let p = PhyPort {
            port_no: 1,
            hw_addr: [0, 1, 2, 3, 4, 5],
            name: "eth0".into(),
            flags: PortFlags::empty(),
            speed: 1000,
            features: PortFeatures::MODE_1GB_FD,
        };
        let mut buf = Buffer::new();
        p.write(&mut buf);
        assert_eq!(buf.len(), PHY_PORT_LEN);
        assert_eq!(PhyPort::parse(buf.as_slice()).unwrap(), p);
    }

    #[test]
    fn name_longer_than_field_is_truncated_not_overrun() {
        let p = PhyPort {
            port_no: 1,
            hw_addr: [0; 6],
            name: "a-very-long-interface-name-indeed".into(),
            flags: PortFlags::empty(),
            speed: 0,
            features: PortFeatures::empty(),
        };
        let mut buf = Buffer::new();
        p.write(&mut buf);
        assert_eq!(buf.len(), PHY_PORT_LEN);
    }
}
