//! Passive TCP carrier: a listening socket that yields active TCP carriers.

use std::net::TcpListener;
use std::os::fd::{AsRawFd, RawFd};

use crate::error::{Error, Result};

use super::tcp::TcpCarrier;
use super::PollHint;

pub struct PtcpCarrier {
    listener: TcpListener,
}

impl PtcpCarrier {
    /// `args` is an optional port, defaulting to the standard OpenFlow TCP
    /// port when empty (`"ptcp:"` listens on the default port on all
    /// interfaces).
    pub fn open(args: &str) -> Result<PtcpCarrier> {
        let port = if args.is_empty() {
            super::DEFAULT_TCP_PORT
        } else {
            args.parse()
                .map_err(|_| Error::Fatal(format!("bad ptcp port {args:?}")))?
        };
        let listener = TcpListener::bind(("0.0.0.0", port))?;
        listener.set_nonblocking(true)?;
        Ok(PtcpCarrier { listener })
    }

    pub fn accept(&mut self) -> Result<TcpCarrier> {
        match self.listener.accept() {
            Ok((stream, _addr)) => TcpCarrier::from_stream(stream),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(Error::Again),
            Err(e) => Err(e.into()),
        }
    }

    pub fn prepoll(&mut self) -> PollHint {
        PollHint::WaitOnFd(self.raw_fd(), nix::poll::PollFlags::POLLIN)
    }

    fn raw_fd(&self) -> RawFd {
        self.listener.as_raw_fd()
    }
}
