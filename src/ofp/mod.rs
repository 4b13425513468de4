//! The OpenFlow 1.0 wire codec: header, match, action, port description,
//! the 15-message tagged union, and a handful of hardcoded message
//! builders.

pub mod action;
pub mod builders;
pub mod header;
pub mod match_;
pub mod message;
pub mod phy_port;

pub use action::Action;
pub use header::{peek_length, Header, MessageType, HEADER_LEN, OFP_MAXLEN, OFP_VERSION};
pub use match_::{Match, Wildcards};
pub use message::Message;
pub use phy_port::PhyPort;
