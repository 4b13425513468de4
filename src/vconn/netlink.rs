//! Netlink carrier: delivers OpenFlow messages over the same
//! generic-netlink transport `dpif` uses, but through the `send`/`recv`
//! vconn contract rather than `dpif`'s request/reply/dump surface.

use crate::buffer::Buffer;
use crate::dpif::Dpif;
use crate::error::{Error, Result};

use super::{PollHint, Want};

pub struct NetlinkCarrier {
    dpif: Dpif,
}

impl NetlinkCarrier {
    /// `args` is `"<dp_idx>[:subscribe]"`.
    pub fn open(args: &str) -> Result<NetlinkCarrier> {
        let (idx_str, subscribe) = match args.split_once(':') {
            Some((idx, "subscribe")) => (idx, true),
            Some((idx, _)) => (idx, false),
            None => (args, false),
        };
        let dp_idx: i32 = idx_str
            .parse()
            .map_err(|_| Error::Fatal(format!("bad nl vconn dp_idx {idx_str:?}")))?;
        Ok(NetlinkCarrier {
            dpif: Dpif::open(dp_idx, subscribe)?,
        })
    }

    pub fn send(&mut self, buf: Buffer) -> std::result::Result<(), (Error, Buffer)> {
        match self.dpif.send_openflow(buf.as_slice()) {
            Ok(()) => Ok(()),
            Err(e) => Err((e, buf)),
        }
    }

    pub fn recv(&mut self) -> Result<Buffer> {
        self.dpif.recv_openflow()
    }

    pub fn prepoll(&mut self, _want: Want) -> PollHint {
        PollHint::WaitOnFd(self.dpif.raw_fd(), nix::poll::PollFlags::POLLIN)
    }

    pub fn postpoll(&mut self, revents: nix::poll::PollFlags) -> nix::poll::PollFlags {
        revents
    }
}
