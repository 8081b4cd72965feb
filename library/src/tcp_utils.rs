use crate::prelude::*;
use crate::utils::Packet;

//TCP flag bits, wire order
pub type TcpFlags = u16;
pub const F_FIN: TcpFlags = 1 << 0;
pub const F_SYN: TcpFlags = 1 << 1;
pub const F_RST: TcpFlags = 1 << 2;
pub const F_PSH: TcpFlags = 1 << 3;
pub const F_ACK: TcpFlags = 1 << 4;
pub const F_URG: TcpFlags = 1 << 5;
pub const F_ECE: TcpFlags = 1 << 6;
pub const F_CWR: TcpFlags = 1 << 7;
pub const F_NS: TcpFlags = 1 << 8;

///A TCP segment with the addresses it travels between; the addresses feed the
///pseudo-header checksum and tell the IP layer where to take it.
#[derive(Debug, Clone)]
pub struct TcpPacket {
    pub src_addr: Ipv4Addr,
    pub dst_addr: Ipv4Addr,
    pub header: TcpHeader,
    pub payload: Vec<u8>,
}

impl TcpPacket {
    ///Serializes into the payload of an IP packet
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.header.header_len() + self.payload.len());
        buf.extend_from_slice(&self.header.to_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }
    ///Parses a TCP segment out of a whole IP packet
    pub fn deserialize(pack: &Packet) -> Result<TcpPacket> {
        let (header, payload) = TcpHeader::from_slice(&pack.data)
            .map_err(|_| Error::new(ErrorKind::InvalidData, "malformed tcp header"))?;
        Ok(TcpPacket {
            src_addr: pack.src(),
            dst_addr: pack.dst(),
            header,
            payload: payload.to_vec(),
        })
    }
    pub fn flags(&self) -> TcpFlags {
        header_flags(&self.header)
    }
    pub fn is_syn(&self) -> bool {
        self.header.syn
    }
    pub fn is_ack(&self) -> bool {
        self.header.ack
    }
    pub fn is_fin(&self) -> bool {
        self.header.fin
    }
    pub fn is_rst(&self) -> bool {
        self.header.rst
    }
}

pub fn set_flags(head: &mut TcpHeader, flags: TcpFlags) {
    head.fin = flags & F_FIN != 0;
    head.syn = flags & F_SYN != 0;
    head.rst = flags & F_RST != 0;
    head.psh = flags & F_PSH != 0;
    head.ack = flags & F_ACK != 0;
    head.urg = flags & F_URG != 0;
    head.ece = flags & F_ECE != 0;
    head.cwr = flags & F_CWR != 0;
    head.ns = flags & F_NS != 0;
}

pub fn header_flags(head: &TcpHeader) -> TcpFlags {
    let mut flags = 0;
    for (bit, set) in [
        (F_FIN, head.fin),
        (F_SYN, head.syn),
        (F_RST, head.rst),
        (F_PSH, head.psh),
        (F_ACK, head.ack),
        (F_URG, head.urg),
        (F_ECE, head.ece),
        (F_CWR, head.cwr),
        (F_NS, head.ns),
    ] {
        if set {
            flags |= bit;
        }
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::DEFAULT_TTL;

    #[test]
    fn flags_round_trip() {
        let mut head = TcpHeader::new(1000, 2000, 42, 500);
        set_flags(&mut head, F_SYN | F_ACK);
        assert_eq!(header_flags(&head), F_SYN | F_ACK);
        assert!(head.syn && head.ack && !head.fin);
        set_flags(&mut head, F_FIN | F_ACK | F_NS);
        assert_eq!(header_flags(&head), F_FIN | F_ACK | F_NS);
    }

    #[test]
    fn segment_survives_an_ip_round_trip() {
        let src: Ipv4Addr = "10.0.0.1".parse().unwrap();
        let dst: Ipv4Addr = "10.0.0.2".parse().unwrap();
        let mut header = TcpHeader::new(5000, 6000, 12345, 4096);
        header.acknowledgment_number = 999;
        set_flags(&mut header, F_ACK | F_PSH);
        let payload = b"hello there".to_vec();
        header.checksum = header
            .calc_checksum_ipv4_raw(src.octets(), dst.octets(), &payload)
            .unwrap();
        let tcp = TcpPacket {
            src_addr: src,
            dst_addr: dst,
            header: header.clone(),
            payload: payload.clone(),
        };
        let ip = Packet::new(6, tcp.serialize(), DEFAULT_TTL, src, dst);
        let wire = ip.serialize();
        let parsed_ip = Packet::deserialize(&wire).unwrap();
        let parsed = TcpPacket::deserialize(&parsed_ip).unwrap();
        assert_eq!(parsed.header, header);
        assert_eq!(parsed.payload, payload);
        assert_eq!(parsed.src_addr, src);
        assert_eq!(parsed.dst_addr, dst);
        //The pseudo-header checksum carried across intact
        let recomputed = parsed
            .header
            .calc_checksum_ipv4_raw(src.octets(), dst.octets(), &parsed.payload)
            .unwrap();
        assert_eq!(recomputed, parsed.header.checksum);
    }
}
