//! Polymorphic transport abstraction over concrete OpenFlow carriers.
//!
//! A [`Vconn`] is either active (implements `send`/`recv`) or, via
//! [`PassiveVconn`], listens and yields new active vconns through `accept`.
//! Dispatch is a closed enum rather than a trait object: the carrier set
//! (TCP, netlink, optionally TLS) is fixed at compile time, so an enum
//! avoids object-safety ceremony for no real flexibility gained.

pub mod netlink;
pub mod ptcp;
pub mod tcp;
#[cfg(feature = "tls")]
pub mod tls;

use crate::buffer::Buffer;
use crate::error::{Error, Result};

bitflags::bitflags! {
    /// Readiness a caller is interested in before it next calls
    /// `send`/`recv`/`accept`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Want: u8 {
        const ACCEPT = 1 << 0;
        const RECV   = 1 << 1;
        const SEND   = 1 << 2;
    }
}

/// Returned by `prepoll`. Some carriers (TLS with already-decrypted bytes
/// queued) can be ready for `recv` with nothing to observe on the raw fd;
/// `Immediate` tells the caller to skip the poll wait and retry straight
/// away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollHint {
    WaitOnFd(std::os::fd::RawFd, nix::poll::PollFlags),
    Immediate,
}

/// An active, bidirectional OpenFlow carrier.
pub enum Vconn {
    Tcp(tcp::TcpCarrier),
    Netlink(netlink::NetlinkCarrier),
    #[cfg(feature = "tls")]
    Tls(tls::TlsCarrier),
}

impl Vconn {
    /// Transfers `buf` into the carrier on success. On failure (including
    /// `Again`) the caller gets `buf` back so it can retry.
    pub fn send(&mut self, buf: Buffer) -> std::result::Result<(), (Error, Buffer)> {
        match self {
            Vconn::Tcp(c) => c.send(buf),
            Vconn::Netlink(c) => c.send(buf),
            #[cfg(feature = "tls")]
            Vconn::Tls(c) => c.send(buf),
        }
    }

    pub fn recv(&mut self) -> Result<Buffer> {
        match self {
            Vconn::Tcp(c) => c.recv(),
            Vconn::Netlink(c) => c.recv(),
            #[cfg(feature = "tls")]
            Vconn::Tls(c) => c.recv(),
        }
    }

    pub fn prepoll(&mut self, want: Want) -> PollHint {
        match self {
            Vconn::Tcp(c) => c.prepoll(want),
            Vconn::Netlink(c) => c.prepoll(want),
            #[cfg(feature = "tls")]
            Vconn::Tls(c) => c.prepoll(want),
        }
    }

    pub fn postpoll(&mut self, revents: nix::poll::PollFlags) -> nix::poll::PollFlags {
        match self {
            Vconn::Tcp(c) => c.postpoll(revents),
            Vconn::Netlink(c) => c.postpoll(revents),
            #[cfg(feature = "tls")]
            Vconn::Tls(c) => c.postpoll(revents),
        }
    }

    /// Blocks (via poll) until `send` can make progress, then sends.
    pub fn send_wait(&mut self, mut buf: Buffer) -> Result<()> {
        loop {
            match self.send(buf) {
                Ok(()) => return Ok(()),
                Err((Error::Again, returned)) => {
                    buf = returned;
                    wait_for(self.prepoll(Want::SEND))?;
                }
                Err((e, _)) => return Err(e),
            }
        }
    }
}

/// A listening carrier. Yields new [`Vconn`]s via `accept`.
pub enum PassiveVconn {
    Ptcp(ptcp::PtcpCarrier),
}

impl PassiveVconn {
    pub fn accept(&mut self) -> Result<Vconn> {
        match self {
            PassiveVconn::Ptcp(c) => c.accept().map(Vconn::Tcp),
        }
    }

    pub fn prepoll(&mut self) -> PollHint {
        match self {
            PassiveVconn::Ptcp(c) => c.prepoll(),
        }
    }
}

fn wait_for(hint: PollHint) -> Result<()> {
    use nix::poll::{poll, PollFd, PollTimeout};
    match hint {
        PollHint::Immediate => Ok(()),
        PollHint::WaitOnFd(fd, events) => {
            let borrowed = unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) };
            let mut fds = [PollFd::new(&borrowed, events)];
            poll(&mut fds, PollTimeout::NONE)?;
            Ok(())
        }
    }
}

/// `"type:args"` — the name grammar every vconn is opened with. `type` is
/// one of `tcp`, `ptcp`, `nl`, `ssl`, `pssl`; `args` is carrier-specific and
/// kept as a raw string, parsed by the carrier itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target<'a> {
    pub kind: &'a str,
    pub args: &'a str,
}

impl<'a> Target<'a> {
    pub fn parse(name: &'a str) -> Result<Target<'a>> {
        match name.split_once(':') {
            Some((kind, args)) => Ok(Target { kind, args }),
            None => Err(Error::Fatal(format!(
                "malformed vconn name {name:?}: expected \"type:args\""
            ))),
        }
    }
}

pub const DEFAULT_TCP_PORT: u16 = 975;
pub const DEFAULT_TLS_PORT: u16 = 976;

pub fn vconn_open(name: &str) -> Result<Vconn> {
    let target = Target::parse(name)?;
    match target.kind {
        "tcp" => tcp::TcpCarrier::open(target.args).map(Vconn::Tcp),
        "nl" => netlink::NetlinkCarrier::open(target.args).map(Vconn::Netlink),
        #[cfg(feature = "tls")]
        "ssl" => tls::TlsCarrier::open(target.args).map(Vconn::Tls),
        other => Err(Error::Fatal(format!("unknown vconn type {other:?}"))),
    }
}

pub fn vconn_open_passive(name: &str) -> Result<PassiveVconn> {
    let target = Target::parse(name)?;
    match target.kind {
        "ptcp" => ptcp::PtcpCarrier::open(target.args).map(PassiveVconn::Ptcp),
        other => Err(Error::Fatal(format!("unknown passive vconn type {other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_first_colon_only() {
        let t = Target::parse("tcp:10.0.0.1:975").unwrap();
        assert_eq!(t.kind, "tcp");
        assert_eq!(t.args, "10.0.0.1:975");
    }

    #[test]
    fn rejects_a_name_with_no_colon() {
        assert!(Target::parse("tcp").is_err());
    }
}
