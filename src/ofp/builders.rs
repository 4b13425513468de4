//! Convenience constructors for a handful of hardcoded, commonly needed
//! messages. These encode fixed policy choices (e.g. always exact-match,
//! always a 60-second idle timeout) rather than exposing every field —
//! callers who need something else build a `Message::FlowMod` directly.

use crate::buffer::Buffer;

use super::action::Action;
use super::match_::Match;
use super::message::{FlowMod, FlowModCommand, Message, PacketOut, PacketOutTail, NO_BUFFER};

/// An exact-match, permanent-ish (60s idle) flow that sends matching
/// packets out a single port.
pub fn make_add_simple_flow(matches: Match, buffer_id: u32, out_port: u16, xid: u32) -> Buffer {
    let msg = Message::FlowMod(FlowMod {
        matches: Match {
            wildcards: crate::ofp::match_::Wildcards::empty(),
            ..matches
        },
        command: FlowModCommand::Add,
        max_idle: 60,
        buffer_id,
        group_id: 0,
        actions: vec![Action::Output {
            port: out_port,
            max_len: 0,
        }],
    });
    msg.encode(xid)
}

/// Tells the datapath to forward a packet it already buffered (`buffer_id`
/// from a prior `PacketIn`) out the given actions.
pub fn make_buffered_packet_out(
    buffer_id: u32,
    in_port: u16,
    actions: Vec<Action>,
    xid: u32,
) -> Buffer {
    debug_assert_ne!(buffer_id, NO_BUFFER, "use make_unbuffered_packet_out for raw data");
    let msg = Message::PacketOut(PacketOut {
        buffer_id,
        in_port,
        out_port: 0,
        tail: PacketOutTail::Actions(actions),
    });
    msg.encode(xid)
}

/// Sends a packet the controller already has bytes for (no buffer_id on the
/// datapath side); the full frame rides along as the tail.
pub fn make_unbuffered_packet_out(in_port: u16, data: Vec<u8>, xid: u32) -> Buffer {
    let msg = Message::PacketOut(PacketOut {
        buffer_id: NO_BUFFER,
        in_port,
        out_port: 0,
        tail: PacketOutTail::Data(data),
    });
    msg.encode(xid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ofp::message::Message as M;

    #[test]
    fn simple_flow_is_exact_match_with_one_output_action() {
        let m = Match::exact(1, [0; 6], [0; 6]);
        let buf = make_add_simple_flow(m, NO_BUFFER, 5, 1);
        let (_, parsed) = M::parse(buf.as_slice()).unwrap();
        match parsed {
            M::FlowMod(fm) => {
                assert!(fm.matches.wildcards.is_empty());
                assert_eq!(fm.max_idle, 60);
                assert_eq!(fm.actions.len(), 1);
            }
            _ => panic!("expected FlowMod"),
        }
    }

    #[test]
    fn unbuffered_packet_out_carries_raw_data() {
        let buf = make_unbuffered_packet_out(1, vec![1, 2, 3], 9);
        let (_, parsed) = M::parse(buf.as_slice()).unwrap();
        match parsed {
            M::PacketOut(po) => assert_eq!(po.tail, PacketOutTail::Data(vec![1, 2, 3])),
            _ => panic!("expected PacketOut"),
        }
    }
}
