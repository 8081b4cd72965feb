use crate::node::Node;
use crate::prelude::*;
use crate::tcp_utils::TcpPacket;
use crate::utils::DEFAULT_TTL;

///A sent segment waiting to be acknowledged. Lives in the connection's sent
///queue until the cumulative ack covers it or the connection dies.
#[derive(Debug)]
pub struct Retransmitter {
    pub pkt: TcpPacket,
    pub first_seq: u32,
    pub len: u32,
    pub retried: u32,
    pub sent: Instant,
    pub acked: bool,
}

impl Retransmitter {
    pub fn new(pkt: TcpPacket) -> Retransmitter {
        let first_seq = pkt.header.sequence_number;
        let len = pkt.payload.len() as u32;
        Retransmitter {
            pkt,
            first_seq,
            len,
            retried: 0,
            sent: Instant::now(),
            acked: false,
        }
    }
    ///One past the last sequence number this segment covers
    pub fn end_seq(&self) -> u32 {
        self.first_seq.wrapping_add(self.len)
    }
    ///Puts the segment back on the wire right now
    pub fn execute(&mut self, node: &Node) {
        node.send(
            6,
            self.pkt.serialize(),
            DEFAULT_TTL,
            self.pkt.src_addr,
            self.pkt.dst_addr,
        );
        self.sent = Instant::now();
    }
}
