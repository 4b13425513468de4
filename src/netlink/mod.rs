//! Generic-netlink message framing: header/attribute TLV construction and
//! parsing, and a policy table for validating attributes by index.

pub mod msg;
pub mod policy;
pub mod socket;

pub use msg::{NlmFlags, NlmsgHeader};
pub use policy::AttrSpec;
pub use socket::NetlinkSocket;
