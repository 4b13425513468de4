//! A bare generic-netlink socket: open, bind, send, receive. `Dpif` and the
//! netlink vconn carrier both build on this rather than talking to
//! `nix`/`libc` directly.

use std::io::{IoSlice, IoSliceMut};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::sync::OnceLock;

use nix::sys::socket::{
    bind, recvmsg, sendmsg, socket, AddressFamily, MsgFlags, NetlinkAddr, SockFlag, SockProtocol,
    SockType,
};

use crate::buffer::Buffer;
use crate::error::{Error, Result};

use super::msg::{
    parse_attrs, parse_genlmsg_header, put_attr_str, start_genl_message, NlmFlags, NlmsgHeader,
    GENLMSG_HDR_LEN, NLMSG_HDR_LEN,
};
use super::policy::{self, AttrSpec};

const GENL_ID_CTRL: u16 = 0x10;
const CTRL_CMD_GETFAMILY: u8 = 3;
const CTRL_ATTR_FAMILY_ID: u16 = 1;
const CTRL_ATTR_FAMILY_NAME: u16 = 2;
const GENL_VERSION: u8 = 1;

/// Minimum receive buffer size for a dpif socket; large flow/table dumps
/// must not be silently dropped by a too-small kernel-side socket buffer.
pub const MIN_RCVBUF: usize = 4 * 1024 * 1024;

pub struct NetlinkSocket {
    fd: OwnedFd,
    pid: u32,
    seq: u32,
}

impl NetlinkSocket {
    pub fn open() -> Result<NetlinkSocket> {
        let fd = socket(
            AddressFamily::Netlink,
            SockType::Raw,
            SockFlag::empty(),
            SockProtocol::NetlinkGeneric,
        )?;
        let pid = std::process::id();
        bind(fd.as_raw_fd(), &NetlinkAddr::new(pid, 0))?;
        set_rcvbuf(fd.as_raw_fd(), MIN_RCVBUF)?;
        Ok(NetlinkSocket { fd, pid, seq: 1 })
    }

    pub fn raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    pub fn next_seq(&mut self) -> u32 {
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);
        seq
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Joins a generic-netlink multicast group so the socket starts
    /// receiving its asynchronous publications (packet-in, flow-expired).
    /// `nix` has no typed wrapper for `NETLINK_ADD_MEMBERSHIP`; it is a
    /// plain integer option at `SOL_NETLINK`, set directly via `libc`.
    pub fn join_multicast_group(&self, group: u32) -> Result<()> {
        let group = group as libc::c_int;
        let rc = unsafe {
            libc::setsockopt(
                self.fd.as_raw_fd(),
                libc::SOL_NETLINK,
                libc::NETLINK_ADD_MEMBERSHIP,
                &group as *const _ as *const libc::c_void,
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if rc != 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }
        Ok(())
    }

    /// Sends a fully built buffer in one `sendmsg` call.
    pub fn send(&self, buf: &[u8]) -> Result<()> {
        let iov = [IoSlice::new(buf)];
        sendmsg::<NetlinkAddr>(self.fd.as_raw_fd(), &iov, &[], MsgFlags::empty(), None)?;
        Ok(())
    }

    /// Sends a message assembled from three pieces without copying the
    /// middle one: a fixed prefix (header + attribute header up to the
    /// embedded payload), the payload itself, and zero padding up to the
    /// next 4-byte boundary. Mirrors the original's scatter/gather
    /// `sendmsg` used to splice an OpenFlow message into a netlink
    /// attribute.
    pub fn send_spliced(&self, prefix: &[u8], payload: &[u8], pad: &[u8]) -> Result<()> {
        let iov = [
            IoSlice::new(prefix),
            IoSlice::new(payload),
            IoSlice::new(pad),
        ];
        sendmsg::<NetlinkAddr>(self.fd.as_raw_fd(), &iov, &[], MsgFlags::empty(), None)?;
        Ok(())
    }

    /// Receives one netlink message into a fresh buffer. `ENOBUFS`
    /// (overrun) is surfaced as `Error::Errno`; callers that want the
    /// "silently retry" policy from `dpif`'s `recv_openflow` should loop on
    /// that specific errno themselves (see `dpif::recv_openflow`).
    pub fn recv(&self) -> Result<Buffer> {
        let mut storage = vec![0u8; 64 * 1024];
        let mut iov = [IoSliceMut::new(&mut storage)];
        let msg = recvmsg::<NetlinkAddr>(self.fd.as_raw_fd(), &mut iov, None, MsgFlags::empty())?;
        let n = msg.bytes;
        storage.truncate(n);
        Ok(Buffer::from_vec(storage))
    }
}

/// Requests at least `size` bytes of kernel-side receive buffer so large
/// flow/table dumps don't get silently dropped on overrun.
fn set_rcvbuf(fd: RawFd, size: usize) -> Result<()> {
    let borrowed = unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) };
    nix::sys::socket::setsockopt(&borrowed, nix::sys::socket::sockopt::RcvBuf, &size)?;
    Ok(())
}

static FAMILY_ID_CACHE: OnceLock<u16> = OnceLock::new();

/// Resolves (and caches, process-wide) the numeric family id for
/// `DP_GENL_FAMILY_NAME` by querying the kernel's generic-netlink
/// controller family. Safe to call repeatedly; only the first caller
/// actually hits the wire.
pub fn resolve_family_id(sock: &mut NetlinkSocket, family_name: &str) -> Result<u16> {
    if let Some(&id) = FAMILY_ID_CACHE.get() {
        return Ok(id);
    }
    let seq = sock.next_seq();
    let mut buf = Buffer::new();
    start_genl_message(
        &mut buf,
        GENL_ID_CTRL,
        NlmFlags::REQUEST,
        seq,
        sock.pid(),
        CTRL_CMD_GETFAMILY,
        GENL_VERSION,
    );
    put_attr_str(&mut buf, CTRL_ATTR_FAMILY_NAME, family_name);
    super::msg::patch_nlmsg_len(&mut buf);
    sock.send(buf.as_slice())?;

    let reply = sock.recv()?;
    let header = NlmsgHeader::parse(reply.as_slice())?;
    if header.seq != seq {
        return Err(Error::MismatchedReply);
    }
    if header.msg_type == super::msg::NLMSG_ERROR {
        return Err(parse_nlmsgerr(&reply.as_slice()[NLMSG_HDR_LEN..]));
    }
    let body = &reply.as_slice()[NLMSG_HDR_LEN..header.len as usize];
    let _genl = parse_genlmsg_header(body)?;
    let attrs = parse_attrs(&body[GENLMSG_HDR_LEN..])?;
    let policy = [AttrSpec::fixed(CTRL_ATTR_FAMILY_ID, 2, true)];
    let parsed = policy::parse(&attrs, &policy)?;
    let id_bytes = parsed[0].ok_or(Error::AttrMissing {
        index: CTRL_ATTR_FAMILY_ID,
    })?;
    let id = u16::from_ne_bytes([id_bytes[0], id_bytes[1]]);
    let _ = FAMILY_ID_CACHE.set(id);
    Ok(id)
}

pub fn parse_nlmsgerr(body: &[u8]) -> Error {
    if body.len() < 4 {
        return Error::Netlink(0);
    }
    let errno = i32::from_ne_bytes([body[0], body[1], body[2], body[3]]);
    Error::Netlink(errno)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nlmsgerr_payload_is_read_as_native_i32() {
        let bytes = (-2i32).to_ne_bytes();
        match parse_nlmsgerr(&bytes) {
            Error::Netlink(-2) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }
}
