//! Active TCP carrier. Reassembly follows the same shape as the teacher's
//! pcap-ng block reader: buffer until a full 8-byte header is available,
//! inspect the declared length, then keep buffering until the whole frame
//! has arrived before handing it to the caller.

use std::io::{self, BufRead, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::os::fd::{AsRawFd, RawFd};

use buf_redux::policy::MinBuffered;
use buf_redux::BufReader;

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::ofp::header::{peek_length, HEADER_LEN};

use super::{PollHint, Want, DEFAULT_TCP_PORT};

pub struct TcpCarrier {
    reader: BufReader<TcpStream, MinBuffered>,
}

impl TcpCarrier {
    pub fn open(args: &str) -> Result<TcpCarrier> {
        let addr = parse_host_port(args, DEFAULT_TCP_PORT)?;
        let stream = TcpStream::connect(addr.as_str())?;
        Self::from_stream(stream)
    }

    pub fn from_stream(stream: TcpStream) -> Result<TcpCarrier> {
        stream.set_nonblocking(true)?;
        let reader = BufReader::with_capacity(8 * 1024, stream)
            .set_policy(MinBuffered(HEADER_LEN));
        Ok(TcpCarrier { reader })
    }

    pub fn send(&mut self, buf: Buffer) -> std::result::Result<(), (Error, Buffer)> {
        match self.reader.get_mut().write_all(buf.as_slice()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Err((Error::Again, buf)),
            Err(e) => Err((Error::Io(e), buf)),
        }
    }

    pub fn recv(&mut self) -> Result<Buffer> {
        let avail = match self.reader.fill_buf() {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Err(Error::Again),
            Err(e) => return Err(e.into()),
        };
        if avail.is_empty() {
            return Err(Error::Eof);
        }
        if avail.len() < HEADER_LEN {
            return Err(Error::Again);
        }
        let needed = peek_length(avail)?;
        if avail.len() < needed {
            // The min-buffered policy is satisfied by a bare header once one
            // has arrived, so fill_buf won't pull any further bytes on its
            // own; raise the threshold to the full frame length now that
            // it's known, or this never gets past a partial message.
            self.reader.policy_mut().0 = needed;
            return Err(Error::Again);
        }
        let frame = avail[..needed].to_vec();
        self.reader.consume(needed);
        self.reader.policy_mut().0 = HEADER_LEN;
        Ok(Buffer::from_vec(frame))
    }

    pub fn prepoll(&mut self, want: Want) -> PollHint {
        let mut events = nix::poll::PollFlags::empty();
        if want.contains(Want::RECV) {
            events |= nix::poll::PollFlags::POLLIN;
        }
        if want.contains(Want::SEND) {
            events |= nix::poll::PollFlags::POLLOUT;
        }
        PollHint::WaitOnFd(self.raw_fd(), events)
    }

    pub fn postpoll(&mut self, revents: nix::poll::PollFlags) -> nix::poll::PollFlags {
        revents
    }

    fn raw_fd(&self) -> RawFd {
        self.reader.get_ref().as_raw_fd()
    }
}

/// Splits `host[:port]`, defaulting the port when absent. Kept separate
/// from `ToSocketAddrs` resolution so a bare host without a port doesn't
/// need a trailing `:` from the caller.
fn parse_host_port(args: &str, default_port: u16) -> Result<String> {
    if args.is_empty() {
        return Err(Error::Fatal("tcp vconn requires a host".into()));
    }
    let addr = if args.contains(':') {
        args.to_string()
    } else {
        format!("{args}:{default_port}")
    };
    // Validate it resolves at all; the actual connect redoes resolution
    // (ToSocketAddrs doesn't give us a single cached SocketAddr to reuse
    // across a retry loop without holding a resolver future alive).
    addr.to_socket_addrs()
        .map_err(|e| Error::Fatal(format!("bad tcp vconn address {args:?}: {e}")))?;
    Ok(addr)
}
