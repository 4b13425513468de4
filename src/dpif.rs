//! A handle to a single kernel datapath via generic netlink. Request/reply
//! transactions, optional multicast subscription for asynchronous
//! packet-in/flow-expired delivery, and multi-message flow/table dumps.

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::netlink::msg::{
    self, parse_attrs, parse_genlmsg_header, patch_nlmsg_len, put_attr, put_attr_u32,
    start_genl_message, NlmFlags, NlmsgHeader, GENLMSG_HDR_LEN, NLMSG_HDR_LEN,
};
use crate::netlink::policy::{self, AttrSpec};
use crate::netlink::socket::{resolve_family_id, NetlinkSocket};
use crate::ofp::{self, Header, Message, OFP_MAXLEN};

/// The generic-netlink family name the local datapath kernel module
/// registers under.
pub const DP_GENL_FAMILY_NAME: &str = "openflow";

mod cmd {
    pub const ADD_DP: u8 = 1;
    pub const DEL_DP: u8 = 2;
    pub const QUERY_DP: u8 = 3;
    pub const SHOW_DP: u8 = 4;
    pub const ADD_PORT: u8 = 5;
    pub const DEL_PORT: u8 = 6;
    pub const QUERY_TABLE: u8 = 7;
    pub const QUERY_FLOW: u8 = 8;
    pub const OPENFLOW: u8 = 9;
    pub const BENCHMARK_NL: u8 = 10;
}

mod attr {
    pub const DP_IDX: u16 = 1;
    pub const MC_GROUP: u16 = 2;
    pub const PORTNAME: u16 = 3;
    pub const OPENFLOW: u16 = 4;
    pub const NUMTABLES: u16 = 5;
    pub const TABLE: u16 = 6;
    pub const NUMFLOWS: u16 = 7;
    pub const FLOW: u16 = 8;
    pub const NPACKETS: u16 = 9;
    pub const PSIZE: u16 = 10;
    pub const DP_INFO: u16 = 11;
    pub const TABLEIDX: u16 = 12;
}

/// Information returned by `Dpif::show`.
pub type DpInfo = crate::ofp::message::DataHello;

pub struct Dpif {
    sock: NetlinkSocket,
    dp_idx: i32,
    family_id: u16,
}

impl Dpif {
    /// Opens a handle to `dp_idx`. When `subscribe` is set, also joins the
    /// datapath's multicast group so `recv_openflow` can observe
    /// asynchronously published packet-in / flow-expired messages.
    pub fn open(dp_idx: i32, subscribe: bool) -> Result<Dpif> {
        let mut sock = NetlinkSocket::open()?;
        let family_id = resolve_family_id(&mut sock, DP_GENL_FAMILY_NAME)?;
        let mut dpif = Dpif {
            sock,
            dp_idx,
            family_id,
        };
        if subscribe {
            let group = dpif.query_mc_group()?;
            dpif.sock.join_multicast_group(group)?;
        }
        Ok(dpif)
    }

    /// The socket's raw fd, for callers (e.g. the netlink vconn carrier)
    /// that need to drive their own poll loop around this handle.
    pub fn raw_fd(&self) -> std::os::fd::RawFd {
        self.sock.raw_fd()
    }

    fn query_mc_group(&mut self) -> Result<u32> {
        let reply = self.transact_raw(cmd::QUERY_DP, &[])?;
        let parsed = self.parse_reply(&reply, &[AttrSpec::fixed(attr::MC_GROUP, 4, true)])?;
        Ok(u32::from_ne_bytes(parsed[0].unwrap().try_into().unwrap()))
    }

    fn start_request(&mut self, command: u8, flags: NlmFlags) -> (Buffer, u32) {
        let seq = self.sock.next_seq();
        let mut buf = Buffer::new();
        start_genl_message(&mut buf, self.family_id, flags, seq, self.sock.pid(), command, 1);
        put_attr_u32(&mut buf, attr::DP_IDX, self.dp_idx as u32);
        (buf, seq)
    }

    /// Sends `command` with `attrs` already appended to the request and
    /// reads back the single matching reply, skipping over any
    /// `NLMSG_ERROR` acks whose error code is 0 (a bare ack for a command
    /// that set `NLM_F_ACK`).
    fn transact_raw(&mut self, command: u8, extra: &[(u16, Vec<u8>)]) -> Result<Buffer> {
        let (mut buf, seq) = self.start_request(command, NlmFlags::REQUEST);
        for (ty, val) in extra {
            put_attr(&mut buf, *ty, val);
        }
        patch_nlmsg_len(&mut buf);
        self.sock.send(buf.as_slice())?;
        self.read_matching_reply(seq)
    }

    /// Management commands (`add_dp`/`del_dp`/`add_port`/`del_port`) expect
    /// only an ack, not a data reply.
    fn transact_ack(&mut self, command: u8, extra: &[(u16, Vec<u8>)]) -> Result<()> {
        let (mut buf, seq) = self.start_request(command, NlmFlags::REQUEST | NlmFlags::ACK);
        for (ty, val) in extra {
            put_attr(&mut buf, *ty, val);
        }
        patch_nlmsg_len(&mut buf);
        self.sock.send(buf.as_slice())?;
        loop {
            let reply = self.sock.recv()?;
            let header = NlmsgHeader::parse(reply.as_slice())?;
            if header.seq != seq {
                continue;
            }
            if header.msg_type == msg::NLMSG_ERROR {
                let err = crate::netlink::socket::parse_nlmsgerr(&reply.as_slice()[NLMSG_HDR_LEN..]);
                return match err {
                    Error::Netlink(0) => Ok(()),
                    other => Err(other),
                };
            }
            return Err(Error::MismatchedReply);
        }
    }

    fn read_matching_reply(&mut self, seq: u32) -> Result<Buffer> {
        loop {
            let reply = match self.sock.recv() {
                Err(Error::Errno(nix::errno::Errno::ENOBUFS)) => continue,
                other => other?,
            };
            let header = NlmsgHeader::parse(reply.as_slice())?;
            if header.seq != seq {
                continue;
            }
            if header.msg_type == msg::NLMSG_ERROR {
                let err = crate::netlink::socket::parse_nlmsgerr(&reply.as_slice()[NLMSG_HDR_LEN..]);
                return Err(err);
            }
            return Ok(reply);
        }
    }

    fn parse_reply<'a>(&self, reply: &'a Buffer, policy: &[AttrSpec]) -> Result<Vec<Option<&'a [u8]>>> {
        let header = NlmsgHeader::parse(reply.as_slice())?;
        let body = &reply.as_slice()[NLMSG_HDR_LEN..header.len as usize];
        let _genl = parse_genlmsg_header(body)?;
        let attrs = parse_attrs(&body[GENLMSG_HDR_LEN..])?;
        policy::parse(&attrs, policy)
    }

    /// Sends an OpenFlow message to the datapath, splicing the buffer in
    /// without copying it (fixed prefix + payload + pad, three iovecs).
    pub fn send_openflow(&mut self, payload: &[u8]) -> Result<()> {
        let seq = self.sock.next_seq();
        let mut prefix = Buffer::new();
        start_genl_message(
            &mut prefix,
            self.family_id,
            NlmFlags::REQUEST,
            seq,
            self.sock.pid(),
            cmd::OPENFLOW,
            1,
        );
        put_attr_u32(&mut prefix, attr::DP_IDX, self.dp_idx as u32);
        let attr_total_len = (4 + payload.len()) as u16;
        prefix.put_bytes(&attr_total_len.to_ne_bytes());
        prefix.put_bytes(&attr::OPENFLOW.to_ne_bytes());
        let pad_len = (4 - (payload.len() % 4)) % 4;
        let total_len = prefix.len() + payload.len() + pad_len;
        prefix.patch_bytes(0, &(total_len as u32).to_ne_bytes());
        let pad = [0u8; 4];
        self.sock
            .send_spliced(prefix.as_slice(), payload, &pad[..pad_len])
    }

    /// Reads one asynchronously or synchronously delivered OpenFlow
    /// message, retrying past netlink overrun and error-reply noise as
    /// documented for `recv_openflow`.
    pub fn recv_openflow(&mut self) -> Result<Buffer> {
        loop {
            let reply = match self.sock.recv() {
                Err(Error::Errno(nix::errno::Errno::ENOBUFS)) => continue,
                other => other?,
            };
            let header = NlmsgHeader::parse(reply.as_slice())?;
            if header.msg_type == msg::NLMSG_ERROR {
                continue;
            }
            let body = &reply.as_slice()[NLMSG_HDR_LEN..header.len as usize];
            let genl = parse_genlmsg_header(body)?;
            if genl.cmd != cmd::OPENFLOW {
                continue;
            }
            let attrs = parse_attrs(&body[GENLMSG_HDR_LEN..])?;
            let policy = [
                AttrSpec::fixed(attr::DP_IDX, 4, true),
                AttrSpec::bounded(attr::OPENFLOW, ofp::HEADER_LEN, OFP_MAXLEN, true),
            ];
            let parsed = policy::parse(&attrs, &policy)?;
            let dp_idx = i32::from_ne_bytes(parsed[0].unwrap().try_into().unwrap());
            if dp_idx != self.dp_idx {
                continue;
            }
            let payload = parsed[1].unwrap();
            let ofp_header = Header::parse(payload)?;
            let mut out = payload.to_vec();
            out.truncate(ofp_header.length as usize);
            return Ok(Buffer::from_vec(out));
        }
    }

    /// Blocks until a reply to `request` (a complete OpenFlow buffer)
    /// arrives, correlated by the netlink sequence number, not the
    /// OpenFlow `xid` (the datapath only ever has one transaction in
    /// flight per handle).
    pub fn transact(&mut self, request: &[u8]) -> Result<Buffer> {
        self.send_openflow(request)?;
        self.recv_openflow()
    }

    pub fn add_dp(&mut self) -> Result<()> {
        self.transact_ack(cmd::ADD_DP, &[])
    }

    pub fn del_dp(&mut self) -> Result<()> {
        self.transact_ack(cmd::DEL_DP, &[])
    }

    pub fn add_port(&mut self, name: &str) -> Result<()> {
        self.transact_ack(cmd::ADD_PORT, &[(attr::PORTNAME, portname_value(name))])
    }

    pub fn del_port(&mut self, name: &str) -> Result<()> {
        self.transact_ack(cmd::DEL_PORT, &[(attr::PORTNAME, portname_value(name))])
    }

    pub fn show(&mut self) -> Result<DpInfo> {
        let reply = self.transact_raw(cmd::SHOW_DP, &[])?;
        let policy = [AttrSpec::bounded(attr::DP_INFO, ofp::HEADER_LEN, OFP_MAXLEN, true)];
        let parsed = self.parse_reply(&reply, &policy)?;
        let payload = parsed[0].unwrap();
        let (_, message) = Message::parse(payload)?;
        match message {
            Message::DataHello(hello) => Ok(hello),
            _ => Err(Error::BadType(0)),
        }
    }

    /// Fire-and-forget: requests `num_packets` synthetic packets of
    /// `packet_size` bytes from the datapath's benchmarking path. No reply
    /// is awaited.
    pub fn benchmark_nl(&mut self, num_packets: u32, packet_size: u32) -> Result<()> {
        let (mut buf, _seq) = self.start_request(cmd::BENCHMARK_NL, NlmFlags::REQUEST);
        put_attr_u32(&mut buf, attr::NPACKETS, num_packets);
        put_attr_u32(&mut buf, attr::PSIZE, packet_size);
        patch_nlmsg_len(&mut buf);
        self.sock.send(buf.as_slice())
    }

    /// Requests every flow matching `filter` (or every flow, when `filter`
    /// is `None`) from `table`, reading reply messages until an empty
    /// (`NUMFLOWS == 0`) reply signals the dump is complete.
    pub fn dump_flows(
        &mut self,
        table: u16,
        filter: Option<crate::ofp::Match>,
    ) -> Result<Vec<crate::ofp::message::FlowStats>> {
        let request = Message::FlowStatRequest(crate::ofp::message::FlowStatRequest {
            matches: filter.unwrap_or_else(crate::ofp::Match::wildcard_all),
            stat_type: crate::ofp::message::FlowStatType::Individual,
        })
        .encode(0);
        let (mut buf, seq) = self.start_request(cmd::QUERY_FLOW, NlmFlags::REQUEST);
        buf.put_bytes(&((4 + 2) as u16).to_ne_bytes());
        buf.put_bytes(&attr::TABLEIDX.to_ne_bytes());
        buf.put_u16(table);
        buf.put_zeros(2);
        let attr_total_len = (4 + request.len()) as u16;
        buf.put_bytes(&attr_total_len.to_ne_bytes());
        buf.put_bytes(&attr::FLOW.to_ne_bytes());
        buf.put_bytes(request.as_slice());
        let pad = (4 - (request.len() % 4)) % 4;
        buf.put_zeros(pad);
        patch_nlmsg_len(&mut buf);
        self.sock.send(buf.as_slice())?;

        let mut out = Vec::new();
        loop {
            let reply = self.read_matching_reply(seq)?;
            let policy = [
                AttrSpec::fixed(attr::NUMFLOWS, 4, true),
                AttrSpec::bounded(attr::FLOW, 0, usize::MAX, false),
            ];
            let parsed = self.parse_reply(&reply, &policy)?;
            let n = u32::from_ne_bytes(parsed[0].unwrap().try_into().unwrap());
            if n == 0 {
                break;
            }
            let flow_bytes = parsed[1].unwrap_or(&[]);
            let (_, message) = Message::parse(flow_bytes)?;
            match message {
                Message::FlowStatReply(flows) => out.extend(flows),
                _ => return Err(Error::BadType(0)),
            }
        }
        Ok(out)
    }

    pub fn dump_tables(&mut self) -> Result<Vec<crate::ofp::message::Table>> {
        let (mut buf, seq) = self.start_request(cmd::QUERY_TABLE, NlmFlags::REQUEST);
        patch_nlmsg_len(&mut buf);
        self.sock.send(buf.as_slice())?;

        let mut out = Vec::new();
        loop {
            let reply = self.read_matching_reply(seq)?;
            let policy = [
                AttrSpec::fixed(attr::NUMTABLES, 4, true),
                AttrSpec::bounded(attr::TABLE, 0, usize::MAX, false),
            ];
            let parsed = self.parse_reply(&reply, &policy)?;
            let n = u32::from_ne_bytes(parsed[0].unwrap().try_into().unwrap());
            if n == 0 {
                break;
            }
            let table_bytes = parsed[1].unwrap_or(&[]);
            if table_bytes.len() % crate::ofp::message::TABLE_LEN != 0 {
                return Err(Error::BadAlignment);
            }
            for chunk in table_bytes.chunks(crate::ofp::message::TABLE_LEN) {
                // Table records here are bare wire records, not full
                // OpenFlow messages, so they're decoded field-by-field
                // rather than through `Message::parse`.
                out.push(decode_table_record(chunk)?);
            }
        }
        Ok(out)
    }
}

fn portname_value(name: &str) -> Vec<u8> {
    let mut bytes = name.as_bytes().to_vec();
    bytes.push(0);
    bytes
}

fn decode_table_record(chunk: &[u8]) -> Result<crate::ofp::message::Table> {
    use byteorder::{ByteOrder, NetworkEndian};
    let raw_name = &chunk[0..32];
    let nul = raw_name.iter().position(|&b| b == 0).unwrap_or(raw_name.len());
    let name = String::from_utf8_lossy(&raw_name[..nul]).into_owned();
    Ok(crate::ofp::message::Table {
        name,
        table_id: NetworkEndian::read_u16(&chunk[32..34]),
        n_flows: NetworkEndian::read_u64(&chunk[34..42]),
        max_flows: NetworkEndian::read_u64(&chunk[42..50]),
    })
}
