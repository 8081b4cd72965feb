use crate::node::Node;
use crate::prelude::*;
use crate::utils::{internet_checksum, Packet, DEFAULT_TTL, RIP_ENTRY_TIMEOUT};
use byteorder::{ByteOrder, NetworkEndian};
use log::debug;

pub const ECHO_REPLY: u8 = 0;
pub const ECHO_REQUEST: u8 = 8;
pub const TIME_EXCEEDED: u8 = 11;

///The slice of ICMP we speak: an 8-byte header (type, code, checksum, four
///bytes of padding) and a payload. The checksum covers the header.
#[derive(Debug, Clone, PartialEq)]
pub struct IcmpPacket {
    pub typ: u8,
    pub code: u8,
    pub checksum: u16,
    pub data: Vec<u8>,
}

impl IcmpPacket {
    pub fn new(typ: u8, code: u8, data: Vec<u8>) -> IcmpPacket {
        let mut pack = IcmpPacket {
            typ,
            code,
            checksum: 0,
            data,
        };
        pack.checksum = pack.compute_checksum();
        pack
    }
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = vec![0u8; 8];
        buf[0] = self.typ;
        buf[1] = self.code;
        NetworkEndian::write_u16(&mut buf[2..4], self.checksum);
        buf.extend_from_slice(&self.data);
        buf
    }
    pub fn deserialize(data: &[u8]) -> Result<IcmpPacket> {
        if data.len() < 4 {
            return Err(Error::new(ErrorKind::InvalidData, "short icmp packet"));
        }
        Ok(IcmpPacket {
            typ: data[0],
            code: data[1],
            checksum: NetworkEndian::read_u16(&data[2..4]),
            data: if data.len() > 8 {
                data[8..].to_vec()
            } else {
                Vec::new()
            },
        })
    }
    fn compute_checksum(&self) -> u16 {
        let mut header = self.serialize();
        header.truncate(8);
        header[2] = 0;
        header[3] = 0;
        internet_checksum(&header)
    }
    pub fn verify_checksum(&self) -> bool {
        let mut header = self.serialize();
        header.truncate(8);
        internet_checksum(&header) == 0
    }
}

///Protocol 1 handler. Echo requests get a reply with the endpoints swapped;
///echo replies and expired echo requests (inside a Time Exceeded) are hop
///reports for whichever traceroute is listening.
pub fn icmp_handler(node: &Node, pack: Packet, _link_id: usize) -> Result<()> {
    let icmp = IcmpPacket::deserialize(&pack.data)?;
    if !icmp.verify_checksum() {
        return Err(Error::new(ErrorKind::InvalidData, "invalid icmp checksum"));
    }
    match icmp.typ {
        ECHO_REQUEST => {
            send_echo_reply(node, pack.dst(), pack.src());
        }
        ECHO_REPLY => {
            node.notify_hop(pack.src());
        }
        TIME_EXCEEDED => {
            //Payload is the first 28 bytes of the doomed packet: its IP
            //header plus the head of its own payload
            if icmp.data.len() >= 28 {
                let expired = IcmpPacket::deserialize(&icmp.data[20..])?;
                if expired.typ == ECHO_REQUEST {
                    node.notify_hop(pack.src());
                }
            }
        }
        typ => debug!("unhandled icmp type {typ}"),
    }
    Ok(())
}

///Walks toward `dst` with TTLs 1..=16, collecting one hop report per probe.
///Each probe waits up to the RIP entry timeout before giving up.
pub fn traceroute(node: &Node, dst: Ipv4Addr) {
    let Some((_, entry)) = node.routing_table.match_route(dst, 32) else {
        println!("Traceroute unable to reach vip");
        return;
    };
    let src = node.interfaces[entry.iface].addr;
    let mut hops = vec![src];
    let local = node.interfaces.iter().any(|iface| iface.addr == dst);
    let mut timed_out = false;
    if !local {
        let reports = node.icmp_rx.lock().unwrap();
        while reports.try_recv().is_ok() {} //Drop stale hop reports
        for ttl in 1..=DEFAULT_TTL {
            send_echo_request(node, src, dst, ttl);
            match reports.recv_timeout(RIP_ENTRY_TIMEOUT) {
                Ok(hop) => {
                    hops.push(hop);
                    if hop == dst {
                        break;
                    }
                }
                Err(_) => {
                    timed_out = true;
                    break;
                }
            }
        }
    }
    println!("Traceroute from {src} to {dst}");
    for (i, hop) in hops.iter().enumerate() {
        println!("{} {}", i + 1, hop);
    }
    if timed_out {
        println!("Traceroute timed out");
    } else {
        println!("Traceroute finished in {} hops", hops.len());
    }
}

fn send_echo_request(node: &Node, src: Ipv4Addr, dst: Ipv4Addr, ttl: u8) {
    let pack = IcmpPacket::new(ECHO_REQUEST, 0, Vec::new());
    node.send(1, pack.serialize(), ttl, src, dst);
}

fn send_echo_reply(node: &Node, src: Ipv4Addr, dst: Ipv4Addr) {
    let pack = IcmpPacket::new(ECHO_REPLY, 0, Vec::new());
    node.send(1, pack.serialize(), DEFAULT_TTL, src, dst);
}

///The Time Exceeded we send back when a TTL dies in our hands carries the
///first 28 bytes of the original packet.
pub fn send_time_exceeded(node: &Node, src: Ipv4Addr, dst: Ipv4Addr, original: &Packet) {
    let wire = original.serialize();
    if wire.len() < 28 {
        return;
    }
    let pack = IcmpPacket::new(TIME_EXCEEDED, 0, wire[..28].to_vec());
    node.send(1, pack.serialize(), DEFAULT_TTL, src, dst);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn icmp_codec_round_trips() {
        let pack = IcmpPacket::new(ECHO_REQUEST, 0, b"ping payload".to_vec());
        let parsed = IcmpPacket::deserialize(&pack.serialize()).unwrap();
        assert_eq!(parsed, pack);
        assert!(parsed.verify_checksum());
    }

    #[test]
    fn corrupted_header_fails_checksum() {
        let pack = IcmpPacket::new(ECHO_REPLY, 0, Vec::new());
        let mut wire = pack.serialize();
        wire[0] ^= 0x01;
        let parsed = IcmpPacket::deserialize(&wire).unwrap();
        assert!(!parsed.verify_checksum());
    }

    #[test]
    fn short_packets_are_rejected() {
        assert!(IcmpPacket::deserialize(&[11, 0]).is_err());
    }

    #[test]
    fn time_exceeded_embeds_the_original_header() {
        let original = Packet::new(
            1,
            IcmpPacket::new(ECHO_REQUEST, 0, Vec::new()).serialize(),
            1,
            "10.0.0.1".parse().unwrap(),
            "10.0.0.9".parse().unwrap(),
        );
        let wire = original.serialize();
        assert!(wire.len() >= 28);
        let te = IcmpPacket::new(TIME_EXCEEDED, 0, wire[..28].to_vec());
        //The embedded bytes start with the original IP header; 20 bytes in
        //sits the expired echo request
        let embedded = IcmpPacket::deserialize(&te.data[20..]).unwrap();
        assert_eq!(embedded.typ, ECHO_REQUEST);
    }
}
