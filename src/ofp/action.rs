use byteorder::{ByteOrder, NetworkEndian};

use crate::buffer::Buffer;
use crate::error::{require_bytes, Error, Result};

pub const ACTION_LEN: usize = 8;

/// A single flow action. Every variant serializes to exactly 8 bytes: a
/// 2-byte type tag followed by a 6-byte argument union, zero-padded where
/// the argument is shorter than 6 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Send the packet out `port`. `max_len` bounds how much of the packet
    /// is copied to the controller when `port == CONTROLLER`; 0 means "send
    /// the whole packet".
    Output { port: u16, max_len: u16 },
    SetDlVlan(u16),
    SetDlSrc([u8; 6]),
    SetDlDst([u8; 6]),
    SetNwSrc(u32),
    SetNwDst(u32),
    SetTpSrc(u16),
    SetTpDst(u16),
}

const TYPE_OUTPUT: u16 = 0;
const TYPE_SET_DL_VLAN: u16 = 1;
const TYPE_SET_DL_SRC: u16 = 2;
const TYPE_SET_DL_DST: u16 = 3;
const TYPE_SET_NW_SRC: u16 = 4;
const TYPE_SET_NW_DST: u16 = 5;
const TYPE_SET_TP_SRC: u16 = 6;
const TYPE_SET_TP_DST: u16 = 7;

impl Action {
    pub fn parse(buf: &[u8]) -> Result<Action> {
        require_bytes(buf, ACTION_LEN)?;
        let ty = NetworkEndian::read_u16(&buf[0..2]);
        let arg = &buf[2..8];
        Ok(match ty {
            TYPE_OUTPUT => Action::Output {
                max_len: NetworkEndian::read_u16(&arg[0..2]),
                port: NetworkEndian::read_u16(&arg[2..4]),
            },
            TYPE_SET_DL_VLAN => Action::SetDlVlan(NetworkEndian::read_u16(&arg[0..2])),
            TYPE_SET_DL_SRC => Action::SetDlSrc(mac(arg)),
            TYPE_SET_DL_DST => Action::SetDlDst(mac(arg)),
            TYPE_SET_NW_SRC => Action::SetNwSrc(NetworkEndian::read_u32(&arg[0..4])),
            TYPE_SET_NW_DST => Action::SetNwDst(NetworkEndian::read_u32(&arg[0..4])),
            TYPE_SET_TP_SRC => Action::SetTpSrc(NetworkEndian::read_u16(&arg[0..2])),
            TYPE_SET_TP_DST => Action::SetTpDst(NetworkEndian::read_u16(&arg[0..2])),
            other => return Err(Error::UnknownAction(other)),
        })
    }

    pub fn write(&self, buf: &mut Buffer) {
        match *self {
            Action::Output { port, max_len } => {
                buf.put_u16(TYPE_OUTPUT);
                buf.put_u16(max_len);
                buf.put_u16(port);
                buf.put_zeros(2);
            }
            Action::SetDlVlan(vlan) => {
                buf.put_u16(TYPE_SET_DL_VLAN);
                buf.put_u16(vlan);
                buf.put_zeros(4);
            }
            Action::SetDlSrc(mac) => {
                buf.put_u16(TYPE_SET_DL_SRC);
                buf.put_bytes(&mac);
            }
            Action::SetDlDst(mac) => {
                buf.put_u16(TYPE_SET_DL_DST);
                buf.put_bytes(&mac);
            }
            Action::SetNwSrc(ip) => {
                buf.put_u16(TYPE_SET_NW_SRC);
                buf.put_u32(ip);
                buf.put_zeros(2);
            }
            Action::SetNwDst(ip) => {
                buf.put_u16(TYPE_SET_NW_DST);
                buf.put_u32(ip);
                buf.put_zeros(2);
            }
            Action::SetTpSrc(port) => {
                buf.put_u16(TYPE_SET_TP_SRC);
                buf.put_u16(port);
                buf.put_zeros(4);
            }
            Action::SetTpDst(port) => {
                buf.put_u16(TYPE_SET_TP_DST);
                buf.put_u16(port);
                buf.put_zeros(4);
            }
        }
    }
}

fn mac(arg: &[u8]) -> [u8; 6] {
    let mut out = [0u8; 6];
    out.copy_from_slice(&arg[0..6]);
    out
}

/// Parses a tightly packed sequence of 8-byte actions, as found after the
/// fixed prefix of `ofp_flow_mod`/`ofp_packet_out`.
pub fn parse_all(buf: &[u8]) -> Result<Vec<Action>> {
    if buf.len() % ACTION_LEN != 0 {
        return Err(Error::BadAlignment);
    }
    buf.chunks(ACTION_LEN).map(Action::parse).collect()
}

pub fn write_all(actions: &[Action], buf: &mut Buffer) {
    for a in actions {
        a.write(buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_output_action() {
        let a = Action::Output {
            port: 2,
            max_len: 0,
        };
        let mut buf = Buffer::new();
        a.write(&mut buf);
        assert_eq!(buf.len(), ACTION_LEN);
        assert_eq!(Action::parse(buf.as_slice()).unwrap(), a);
    }

    #[test]
    fn unused_union_bytes_are_zero() {
        let a = Action::SetDlVlan(7);
        let mut buf = Buffer::new();
        a.write(&mut buf);
        assert_eq!(&buf.as_slice()[4..8], &[0, 0, 0, 0]);
    }

    #[test]
    fn rejects_misaligned_action_list() {
        let buf = [0u8; 5];
        assert!(matches!(parse_all(&buf), Err(Error::BadAlignment)));
    }
}
