//! Optional TLS carrier (behind the `tls` feature). Certificate/key loading
//! is external — the caller constructs the `rustls` connection and this
//! module only drives its non-blocking record I/O and maps engine state
//! onto poll interest, exactly the split described for `prepoll`/`postpoll`
//! on a TLS vconn.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::os::fd::{AsRawFd, RawFd};

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::ofp::header::{peek_length, HEADER_LEN};

use super::{PollHint, Want, DEFAULT_TLS_PORT};

/// Rustls gives client and server connections distinct concrete types with
/// no shared trait object; both deref to `ConnectionCommon` and expose the
/// same method names, so a small enum with per-arm dispatch stands in for
/// what would otherwise be a trait object.
enum Role {
    Client(rustls::ClientConnection),
    Server(rustls::ServerConnection),
}

macro_rules! role_dispatch {
    ($self:expr, $method:ident($($arg:expr),*)) => {
        match $self {
            Role::Client(c) => c.$method($($arg),*),
            Role::Server(c) => c.$method($($arg),*),
        }
    };
}

impl Role {
    fn wants_read(&self) -> bool {
        role_dispatch!(self, wants_read())
    }
    fn wants_write(&self) -> bool {
        role_dispatch!(self, wants_write())
    }
    fn write_tls(&mut self, sock: &mut TcpStream) -> io::Result<usize> {
        role_dispatch!(self, write_tls(sock))
    }
    fn read_tls(&mut self, sock: &mut TcpStream) -> io::Result<usize> {
        role_dispatch!(self, read_tls(sock))
    }
    fn process_new_packets(&mut self) -> std::result::Result<rustls::IoState, rustls::Error> {
        role_dispatch!(self, process_new_packets())
    }
    fn reader(&mut self) -> rustls::Reader<'_> {
        role_dispatch!(self, reader())
    }
    fn writer(&mut self) -> rustls::Writer<'_> {
        role_dispatch!(self, writer())
    }
}

pub struct TlsCarrier {
    conn: Role,
    sock: TcpStream,
    plain: Vec<u8>,
}

impl TlsCarrier {
    /// `args` is `host[:port]`, same grammar as the plain TCP carrier. The
    /// caller supplies an already-configured `ClientConnection` via
    /// `open_with`; `open` alone can't produce one without certificate
    /// material, which is out of scope here.
    pub fn open(_args: &str) -> Result<TlsCarrier> {
        Err(Error::Fatal(
            "tls vconn requires an application-supplied rustls::ClientConnection; use TlsCarrier::from_client".into(),
        ))
    }

    pub fn from_client(conn: rustls::ClientConnection, args: &str) -> Result<TlsCarrier> {
        let addr = if args.contains(':') {
            args.to_string()
        } else {
            format!("{args}:{DEFAULT_TLS_PORT}")
        };
        let mut addrs = addr
            .to_socket_addrs()
            .map_err(|e| Error::Fatal(format!("bad ssl vconn address {args:?}: {e}")))?;
        let sock_addr = addrs
            .next()
            .ok_or_else(|| Error::Fatal(format!("no address for {args:?}")))?;
        let sock = TcpStream::connect(sock_addr)?;
        sock.set_nonblocking(true)?;
        Ok(TlsCarrier {
            conn: Role::Client(conn),
            sock,
            plain: Vec::new(),
        })
    }

    pub fn from_server(conn: rustls::ServerConnection, sock: TcpStream) -> Result<TlsCarrier> {
        sock.set_nonblocking(true)?;
        Ok(TlsCarrier {
            conn: Role::Server(conn),
            sock,
            plain: Vec::new(),
        })
    }

    /// Pumps the raw TLS record layer: reads ciphertext off the socket when
    /// available, writes any pending ciphertext, and folds newly decrypted
    /// bytes into `self.plain`. Returns `Again` only when nothing could be
    /// made to progress right now.
    fn pump(&mut self) -> Result<()> {
        let mut progressed = false;
        if self.conn.wants_write() {
            match self.conn.write_tls(&mut self.sock) {
                Ok(_) => progressed = true,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(e.into()),
            }
        }
        if self.conn.wants_read() {
            match self.conn.read_tls(&mut self.sock) {
                Ok(0) => return Err(Error::Eof),
                Ok(_) => {
                    progressed = true;
                    self.conn
                        .process_new_packets()
                        .map_err(|e| Error::Fatal(format!("tls error: {e}")))?;
                    let mut tmp = [0u8; 4096];
                    loop {
                        match self.conn.reader().read(&mut tmp) {
                            Ok(0) => break,
                            Ok(n) => self.plain.extend_from_slice(&tmp[..n]),
                            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                            Err(e) => return Err(e.into()),
                        }
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(e.into()),
            }
        }
        if progressed {
            Ok(())
        } else {
            Err(Error::Again)
        }
    }

    pub fn send(&mut self, buf: Buffer) -> std::result::Result<(), (Error, Buffer)> {
        if let Err(e) = self.conn.writer().write_all(buf.as_slice()) {
            return Err((Error::Io(e), buf));
        }
        match self.conn.write_tls(&mut self.sock) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()), // flushed later by pump/prepoll
            Err(e) => Err((Error::Io(e), buf)),
        }
    }

    pub fn recv(&mut self) -> Result<Buffer> {
        if self.plain.len() < HEADER_LEN {
            match self.pump() {
                Ok(()) => {}
                Err(Error::Again) if !self.plain.is_empty() => {}
                Err(e) => return Err(e),
            }
        }
        if self.plain.len() < HEADER_LEN {
            return Err(Error::Again);
        }
        let needed = peek_length(&self.plain)?;
        if self.plain.len() < needed {
            return Err(Error::Again);
        }
        let frame: Vec<u8> = self.plain.drain(..needed).collect();
        Ok(Buffer::from_vec(frame))
    }

    /// Translates current TLS engine state into poll interest: the engine
    /// may need to write before it can read (handshake), or may already
    /// have plaintext queued (`Immediate`, skip the wait).
    pub fn prepoll(&mut self, want: Want) -> PollHint {
        if !self.plain.is_empty() && want.contains(Want::RECV) {
            return PollHint::Immediate;
        }
        let mut events = nix::poll::PollFlags::empty();
        if self.conn.wants_read() {
            events |= nix::poll::PollFlags::POLLIN;
        }
        if self.conn.wants_write() {
            events |= nix::poll::PollFlags::POLLOUT;
        }
        PollHint::WaitOnFd(self.raw_fd(), events)
    }

    pub fn postpoll(&mut self, revents: nix::poll::PollFlags) -> nix::poll::PollFlags {
        revents
    }

    fn raw_fd(&self) -> RawFd {
        self.sock.as_raw_fd()
    }
}
