use byteorder::{ByteOrder, NetworkEndian};

use crate::buffer::Buffer;
use crate::error::{require_bytes, Error, Result};

use super::action::{self, Action};
use super::header::{Header, MessageType, HEADER_LEN};
use super::match_::Match;
use super::phy_port::PhyPort;

pub use super::match_::MATCH_LEN;
pub use super::phy_port::PHY_PORT_LEN;

/// `buffer_id` sentinel meaning "no buffered packet; the full packet is
/// included in the message".
pub const NO_BUFFER: u32 = 0xffff_ffff;
/// `max_idle` sentinel meaning the flow never ages out.
pub const PERMANENT: u16 = 0;
/// `miss_send_len`/`length`-field sentinel meaning "leave unchanged".
pub const UNCHANGED_MISS_SEND_LEN: u16 = 0xffff;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ControlHelloFlags: u16 {
        const SEND_FLOW_EXP = 1 << 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowModCommand {
    Add = 0,
    Delete = 1,
    DeleteStrict = 2,
}

impl FlowModCommand {
    fn from_u16(v: u16) -> Result<FlowModCommand> {
        Ok(match v {
            0 => FlowModCommand::Add,
            1 => FlowModCommand::Delete,
            2 => FlowModCommand::DeleteStrict,
            other => return Err(Error::BadType(other as u8)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketInReason {
    NoMatch = 0,
    Action = 1,
}

impl PacketInReason {
    fn from_u8(v: u8) -> Result<PacketInReason> {
        Ok(match v {
            0 => PacketInReason::NoMatch,
            1 => PacketInReason::Action,
            other => return Err(Error::UnknownReason(other)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortStatusReason {
    Add = 0,
    Delete = 1,
    Modify = 2,
}

impl PortStatusReason {
    fn from_u8(v: u8) -> Result<PortStatusReason> {
        Ok(match v {
            0 => PortStatusReason::Add,
            1 => PortStatusReason::Delete,
            2 => PortStatusReason::Modify,
            other => return Err(Error::UnknownReason(other)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStatType {
    Individual = 0,
    Aggregate = 1,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlHello {
    pub version: u32,
    pub flags: ControlHelloFlags,
    pub miss_send_len: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataHello {
    pub datapath_id: u64,
    pub n_exact: u32,
    pub n_mac_only: u32,
    /// Preserved for wire compatibility; never interpreted by this core.
    pub n_compression: u32,
    pub n_general: u32,
    pub buffer_mb: u32,
    pub n_buffers: u32,
    pub capabilities: u32,
    pub actions: u32,
    pub miss_send_len: u16,
    pub ports: Vec<PhyPort>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketIn {
    pub buffer_id: u32,
    pub total_len: u16,
    pub in_port: u16,
    pub reason: PacketInReason,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketOutTail {
    Actions(Vec<Action>),
    Data(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketOut {
    pub buffer_id: u32,
    pub in_port: u16,
    pub out_port: u16,
    pub tail: PacketOutTail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowMod {
    pub matches: Match,
    pub command: FlowModCommand,
    pub max_idle: u16,
    pub buffer_id: u32,
    /// A QoS handle with no consumer in this core; preserved, never
    /// interpreted.
    pub group_id: u32,
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowExpired {
    pub matches: Match,
    pub duration: u32,
    pub packet_count: u64,
    pub byte_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub name: String,
    pub table_id: u16,
    pub n_flows: u64,
    pub max_flows: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMod {
    pub desc: PhyPort,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortStatus {
    pub reason: PortStatusReason,
    pub desc: PhyPort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowStatRequest {
    pub matches: Match,
    pub stat_type: FlowStatType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowStats {
    pub matches: Match,
    pub duration: u32,
    pub packet_count: u64,
    pub byte_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    ControlHello(ControlHello),
    DataHello(DataHello),
    PacketIn(PacketIn),
    PacketOut(PacketOut),
    FlowMod(FlowMod),
    FlowExpired(FlowExpired),
    Table(Table),
    PortMod(PortMod),
    PortStatus(PortStatus),
    FlowStatRequest(FlowStatRequest),
    FlowStatReply(Vec<FlowStats>),
    TableStatRequest,
    TableStatReply(Vec<Table>),
    PortStatRequest,
    PortStatReply(Vec<PhyPort>),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        use Message::*;
        match self {
            ControlHello(_) => MessageType::ControlHello,
            DataHello(_) => MessageType::DataHello,
            PacketIn(_) => MessageType::PacketIn,
            PacketOut(_) => MessageType::PacketOut,
            FlowMod(_) => MessageType::FlowMod,
            FlowExpired(_) => MessageType::FlowExpired,
            Table(_) => MessageType::Table,
            PortMod(_) => MessageType::PortMod,
            PortStatus(_) => MessageType::PortStatus,
            FlowStatRequest(_) => MessageType::FlowStatRequest,
            FlowStatReply(_) => MessageType::FlowStatReply,
            TableStatRequest => MessageType::TableStatRequest,
            TableStatReply(_) => MessageType::TableStatReply,
            PortStatRequest => MessageType::PortStatRequest,
            PortStatReply(_) => MessageType::PortStatReply,
        }
    }

    /// Serializes this message with a fresh header, patching `length` once
    /// the body is known.
    pub fn encode(&self, xid: u32) -> Buffer {
        let mut buf = Buffer::new();
        let header = Header::new(self.message_type(), xid);
        header.write(&mut buf);
        self.write_body(&mut buf);
        let len = buf.len() as u16;
        buf.patch_u16(2, len);
        buf
    }

    fn write_body(&self, buf: &mut Buffer) {
        match self {
            Message::ControlHello(m) => {
                buf.put_u32(m.version);
                buf.put_u16(m.flags.bits());
                buf.put_u16(m.miss_send_len);
            }
            Message::DataHello(m) => {
                buf.put_u64(m.datapath_id);
                buf.put_u32(m.n_exact);
                buf.put_u32(m.n_mac_only);
                buf.put_u32(m.n_compression);
                buf.put_u32(m.n_general);
                buf.put_u32(m.buffer_mb);
                buf.put_u32(m.n_buffers);
                buf.put_u32(m.capabilities);
                buf.put_u32(m.actions);
                buf.put_u16(m.miss_send_len);
                buf.put_zeros(2);
                for p in &m.ports {
                    p.write(buf);
                }
            }
            Message::PacketIn(m) => {
                buf.put_u32(m.buffer_id);
                buf.put_u16(m.total_len);
                buf.put_u16(m.in_port);
                buf.put_u8(m.reason as u8);
                buf.put_zeros(1);
                buf.put_bytes(&m.data);
            }
            Message::PacketOut(m) => {
                buf.put_u32(m.buffer_id);
                buf.put_u16(m.in_port);
                buf.put_u16(m.out_port);
                match &m.tail {
                    PacketOutTail::Actions(actions) => action::write_all(actions, buf),
                    PacketOutTail::Data(data) => buf.put_bytes(data),
                }
            }
            Message::FlowMod(m) => {
                m.matches.write(buf);
                buf.put_u16(m.command as u16);
                buf.put_u16(m.max_idle);
                buf.put_u32(m.buffer_id);
                buf.put_u32(m.group_id);
                action::write_all(&m.actions, buf);
            }
            Message::FlowExpired(m) => {
                m.matches.write(buf);
                buf.put_u32(m.duration);
                buf.put_u64(m.packet_count);
                buf.put_u64(m.byte_count);
            }
            Message::Table(m) => write_table(m, buf),
            Message::PortMod(m) => m.desc.write(buf),
            Message::PortStatus(m) => {
                buf.put_u8(m.reason as u8);
                buf.put_zeros(3);
                m.desc.write(buf);
            }
            Message::FlowStatRequest(m) => {
                m.matches.write(buf);
                buf.put_u8(m.stat_type as u8);
                buf.put_zeros(3);
            }
            Message::FlowStatReply(flows) => {
                for f in flows {
                    f.matches.write(buf);
                    buf.put_u32(f.duration);
                    buf.put_u64(f.packet_count);
                    buf.put_u64(f.byte_count);
                }
            }
            Message::TableStatRequest => {}
            Message::TableStatReply(tables) => {
                for t in tables {
                    write_table(t, buf);
                }
            }
            Message::PortStatRequest => {}
            Message::PortStatReply(ports) => {
                for p in ports {
                    p.write(buf);
                }
            }
        }
    }

    /// Parses a complete message, including its header, from `buf`.
    /// `buf.len()` may exceed `header.length`; only the first `length`
    /// bytes are consumed, mirroring the truncation rule in
    /// `Header::parse`.
    pub fn parse(buf: &[u8]) -> Result<(Header, Message)> {
        let header = Header::parse(buf)?;
        let body = &buf[HEADER_LEN..header.length as usize];
        let message = match header.message_type {
            MessageType::ControlHello => Message::ControlHello(parse_control_hello(body)?),
            MessageType::DataHello => Message::DataHello(parse_data_hello(body)?),
            MessageType::PacketIn => Message::PacketIn(parse_packet_in(body)?),
            MessageType::PacketOut => Message::PacketOut(parse_packet_out(body)?),
            MessageType::FlowMod => Message::FlowMod(parse_flow_mod(body)?),
            MessageType::FlowExpired => Message::FlowExpired(parse_flow_expired(body)?),
            MessageType::Table => Message::Table(parse_table(body)?),
            MessageType::PortMod => Message::PortMod(PortMod {
                desc: PhyPort::parse(body)?,
            }),
            MessageType::PortStatus => Message::PortStatus(parse_port_status(body)?),
            MessageType::FlowStatRequest => Message::FlowStatRequest(parse_flow_stat_request(body)?),
            MessageType::FlowStatReply => Message::FlowStatReply(parse_flow_stats(body)?),
            MessageType::TableStatRequest => Message::TableStatRequest,
            MessageType::TableStatReply => Message::TableStatReply(parse_tables(body)?),
            MessageType::PortStatRequest => Message::PortStatRequest,
            MessageType::PortStatReply => Message::PortStatReply(PhyPort::parse_all_checked(body)?),
        };
        Ok((header, message))
    }
}

// Extension so `message.rs` doesn't need to reach into `phy_port`'s
// internals for the checked multi-port parse used by port-stat replies.
impl PhyPort {
    fn parse_all_checked(buf: &[u8]) -> Result<Vec<PhyPort>> {
        super::phy_port::parse_all(buf)
    }
}

fn parse_control_hello(body: &[u8]) -> Result<ControlHello> {
    require_bytes(body, 8)?;
    Ok(ControlHello {
        version: NetworkEndian::read_u32(&body[0..4]),
        flags: ControlHelloFlags::from_bits_truncate(NetworkEndian::read_u16(&body[4..6])),
        miss_send_len: NetworkEndian::read_u16(&body[6..8]),
    })
}

const DATA_HELLO_FIXED_LEN: usize = 8 + 4 * 8 + 2 + 2;

fn parse_data_hello(body: &[u8]) -> Result<DataHello> {
    require_bytes(body, DATA_HELLO_FIXED_LEN)?;
    let datapath_id = NetworkEndian::read_u64(&body[0..8]);
    let n_exact = NetworkEndian::read_u32(&body[8..12]);
    let n_mac_only = NetworkEndian::read_u32(&body[12..16]);
    let n_compression = NetworkEndian::read_u32(&body[16..20]);
    let n_general = NetworkEndian::read_u32(&body[20..24]);
    let buffer_mb = NetworkEndian::read_u32(&body[24..28]);
    let n_buffers = NetworkEndian::read_u32(&body[28..32]);
    let capabilities = NetworkEndian::read_u32(&body[32..36]);
    let actions = NetworkEndian::read_u32(&body[36..40]);
    let miss_send_len = NetworkEndian::read_u16(&body[40..42]);
    let tail = &body[DATA_HELLO_FIXED_LEN..];
    let ports = super::phy_port::parse_all(tail)?;
    Ok(DataHello {
        datapath_id,
        n_exact,
        n_mac_only,
        n_compression,
        n_general,
        buffer_mb,
        n_buffers,
        capabilities,
        actions,
        miss_send_len,
        ports,
    })
}

fn parse_packet_in(body: &[u8]) -> Result<PacketIn> {
    require_bytes(body, 10)?;
    Ok(PacketIn {
        buffer_id: NetworkEndian::read_u32(&body[0..4]),
        total_len: NetworkEndian::read_u16(&body[4..6]),
        in_port: NetworkEndian::read_u16(&body[6..8]),
        reason: PacketInReason::from_u8(body[8])?,
        data: body[10..].to_vec(),
    })
}

fn parse_packet_out(body: &[u8]) -> Result<PacketOut> {
    require_bytes(body, 8)?;
    let buffer_id = NetworkEndian::read_u32(&body[0..4]);
    let in_port = NetworkEndian::read_u16(&body[4..6]);
    let out_port = NetworkEndian::read_u16(&body[6..8]);
    let tail_bytes = &body[8..];
    let tail = if buffer_id == NO_BUFFER {
        PacketOutTail::Data(tail_bytes.to_vec())
    } else {
        PacketOutTail::Actions(action::parse_all(tail_bytes)?)
    };
    Ok(PacketOut {
        buffer_id,
        in_port,
        out_port,
        tail,
    })
}

const FLOW_MOD_FIXED_LEN: usize = MATCH_LEN + 2 + 2 + 4 + 4;

fn parse_flow_mod(body: &[u8]) -> Result<FlowMod> {
    require_bytes(body, FLOW_MOD_FIXED_LEN)?;
    let matches = Match::parse(&body[0..MATCH_LEN])?;
    let mut off = MATCH_LEN;
    let command = FlowModCommand::from_u16(NetworkEndian::read_u16(&body[off..off + 2]))?;
    off += 2;
    let max_idle = NetworkEndian::read_u16(&body[off..off + 2]);
    off += 2;
    let buffer_id = NetworkEndian::read_u32(&body[off..off + 4]);
    off += 4;
    let group_id = NetworkEndian::read_u32(&body[off..off + 4]);
    off += 4;
    let actions = action::parse_all(&body[off..])?;
    Ok(FlowMod {
        matches,
        command,
        max_idle,
        buffer_id,
        group_id,
        actions,
    })
}

const FLOW_EXPIRED_FIXED_LEN: usize = MATCH_LEN + 4 + 8 + 8;

fn parse_flow_expired(body: &[u8]) -> Result<FlowExpired> {
    require_bytes(body, FLOW_EXPIRED_FIXED_LEN)?;
    let matches = Match::parse(&body[0..MATCH_LEN])?;
    let mut off = MATCH_LEN;
    let duration = NetworkEndian::read_u32(&body[off..off + 4]);
    off += 4;
    let packet_count = NetworkEndian::read_u64(&body[off..off + 8]);
    off += 8;
    let byte_count = NetworkEndian::read_u64(&body[off..off + 8]);
    Ok(FlowExpired {
        matches,
        duration,
        packet_count,
        byte_count,
    })
}

pub const TABLE_LEN: usize = 32 + 2 + 8 + 8;

fn parse_table(body: &[u8]) -> Result<Table> {
    require_bytes(body, TABLE_LEN)?;
    let raw_name = &body[0..32];
    let nul = raw_name.iter().position(|&b| b == 0).unwrap_or(raw_name.len());
    let name = String::from_utf8_lossy(&raw_name[..nul]).into_owned();
    let table_id = NetworkEndian::read_u16(&body[32..34]);
    let n_flows = NetworkEndian::read_u64(&body[34..42]);
    let max_flows = NetworkEndian::read_u64(&body[42..50]);
    Ok(Table {
        name,
        table_id,
        n_flows,
        max_flows,
    })
}

fn write_table(t: &Table, buf: &mut Buffer) {
    buf.put_fixed(t.name.as_bytes(), 32);
    buf.put_u16(t.table_id);
    buf.put_u64(t.n_flows);
    buf.put_u64(t.max_flows);
}

fn parse_tables(body: &[u8]) -> Result<Vec<Table>> {
    if body.len() % TABLE_LEN != 0 {
        return Err(Error::BadAlignment);
    }
    body.chunks(TABLE_LEN).map(parse_table).collect()
}

fn parse_port_status(body: &[u8]) -> Result<PortStatus> {
    require_bytes(body, 4 + PHY_PORT_LEN)?;
    let reason = PortStatusReason::from_u8(body[0])?;
    let desc = PhyPort::parse(&body[4..4 + PHY_PORT_LEN])?;
    Ok(PortStatus { reason, desc })
}

fn parse_flow_stat_request(body: &[u8]) -> Result<FlowStatRequest> {
    require_bytes(body, MATCH_LEN + 4)?;
    let matches = Match::parse(&body[0..MATCH_LEN])?;
    let stat_type = match body[MATCH_LEN] {
        0 => FlowStatType::Individual,
        1 => FlowStatType::Aggregate,
        other => return Err(Error::BadType(other)),
    };
    Ok(FlowStatRequest { matches, stat_type })
}

const FLOW_STATS_LEN: usize = MATCH_LEN + 4 + 8 + 8;

fn parse_flow_stats(body: &[u8]) -> Result<Vec<FlowStats>> {
    if body.len() % FLOW_STATS_LEN != 0 {
        return Err(Error::BadAlignment);
    }
    body.chunks(FLOW_STATS_LEN)
        .map(|chunk| {
            let matches = Match::parse(&chunk[0..MATCH_LEN])?;
            let mut off = MATCH_LEN;
            let duration = NetworkEndian::read_u32(&chunk[off..off + 4]);
            off += 4;
            let packet_count = NetworkEndian::read_u64(&chunk[off..off + 8]);
            off += 8;
            let byte_count = NetworkEndian::read_u64(&chunk[off..off + 8]);
            Ok(FlowStats {
                matches,
                duration,
                packet_count,
                byte_count,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_and_decodes_a_flow_mod_with_one_action() {
        let m = Message::FlowMod(FlowMod {
            matches: Match::exact(1, [2, 0, 0, 0, 0, 1], [2, 0, 0, 0, 0, 2]),
            command: FlowModCommand::Add,
            max_idle: 60,
            buffer_id: NO_BUFFER,
            group_id: 0,
            actions: vec![Action::Output {
                port: 2,
                max_len: 0,
            }],
        });
        let buf = m.encode(7);
        assert_eq!(buf.len(), HEADER_LEN + FLOW_MOD_FIXED_LEN + action::ACTION_LEN);
        let (header, parsed) = Message::parse(buf.as_slice()).unwrap();
        assert_eq!(header.length as usize, buf.len());
        assert_eq!(header.xid, 7);
        assert_eq!(parsed, m);
    }

    #[test]
    fn packet_in_data_starts_two_bytes_after_the_ten_byte_prefix() {
        let m = Message::PacketIn(PacketIn {
            buffer_id: 7,
            total_len: 64,
            in_port: 3,
            reason: PacketInReason::NoMatch,
            data: vec![0xaa; 14],
        });
        let buf = m.encode(1);
        // header(8) + prefix(10) == 18, which is not 4-aligned by itself,
        // but the two pad bytes inside the 10-byte prefix put the
        // 14-byte frame at offset 18 -- an 18 % 4 == 2 offset relative to
        // the start of the IP header inside that frame is the property
        // under test (the frame's own 14-byte ethernet header absorbs it).
        assert_eq!(buf.len(), 8 + 10 + 14);
        let (_, parsed) = Message::parse(buf.as_slice()).unwrap();
        assert_eq!(parsed, m);
    }

    #[test]
    fn flow_stat_reply_terminates_on_empty_list() {
        let m = Message::FlowStatReply(vec![]);
        let buf = m.encode(1);
        let (_, parsed) = Message::parse(buf.as_slice()).unwrap();
        assert_eq!(parsed, Message::FlowStatReply(vec![]));
    }

    #[test]
    fn rejects_length_shorter_than_fixed_prefix() {
        let mut buf = Buffer::new();
        let header = Header::new(MessageType::FlowMod, 1);
        header.write(&mut buf);
        buf.patch_u16(2, 9); // shorter than header + anything useful
        assert!(Message::parse(buf.as_slice()).is_err());
    }
}
