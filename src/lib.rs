/*!
A user-space library for speaking OpenFlow 1.0 to a kernel datapath over
generic netlink, and for carrying OpenFlow over other transports (TCP,
optionally TLS).

This crate owns the wire codec (`ofp`), the generic-netlink framing layer
(`netlink`), the datapath request/reply/dump channel built on it (`dpif`),
a transport-polymorphic connection abstraction (`vconn`) and its concrete
carriers, and a credentialed control socket (`control`) for adjusting the
in-process log level table (`logging`) at runtime.

The library is single-threaded and non-blocking throughout: callers drive
their own poll loop around `prepoll`/`postpoll` hints, except at the few
documented blocking points (`Dpif::transact`, `*_wait` helpers).
*/

pub mod buffer;
pub mod control;
pub mod dpif;
pub mod error;
pub mod logging;
pub mod netlink;
pub mod ofp;
pub mod vconn;

pub use buffer::Buffer;
pub use dpif::Dpif;
pub use error::{Error, Result};
pub use ofp::{Header, Match, Message, OFP_VERSION};
pub use vconn::{vconn_open, vconn_open_passive, PassiveVconn, Vconn};
