use crate::prelude::*;
use byteorder::{ByteOrder, NetworkEndian};

pub const MAX_RIP_ENTRIES: u16 = 64;
pub const INFINITY: u32 = 16;
pub const DEFAULT_TTL: u8 = 16; //Same as RIP infinity, per the handout
pub const RIP_UPDATE_COOLDOWN: Duration = Duration::from_secs(5);
pub const RIP_ENTRY_TIMEOUT: Duration = Duration::from_secs(12);
pub const RIP_SWEEP_TICK: Duration = Duration::from_millis(250);

pub const MAX_FRAME_SIZE: usize = 65536;
pub const MAX_PACKET_SIZE: u32 = 1024;
pub const MIN_PACKET_SIZE: usize = 20;

pub const TCP_WINDOW_SIZE: u32 = 32768; //Must stay a power of two
pub const TCP_TIME_WAIT_DURATION: Duration = Duration::from_secs(10);
pub const TCP_SYN_TIMEOUT_DURATION: Duration = Duration::from_millis(500);
pub const TCP_ZWP_UPDATE_DURATION: Duration = Duration::from_millis(25);
pub const TCP_ZWP_WAIT_DURATION: Duration = Duration::from_millis(25);
pub const TCP_MAX_RETRIES: u32 = 3;

pub const DEFAULT_RTO: Duration = Duration::from_millis(100);
//SRTT constants, all in nanoseconds
pub const SRTT_INITIAL_GUESS: f64 = 1e6;
pub const SRTT_ALPHA: f64 = 0.9;
pub const SRTT_BETA: f64 = 1.5;
pub const SRTT_MIN: f64 = 1e6;
pub const SRTT_MAX: f64 = 500e6;

///An IPv4 packet: header plus payload. Headers we emit always carry version 4,
///IHL 5 and no options.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub header: Ipv4Header,
    pub data: Vec<u8>,
}

impl Packet {
    pub fn new(proto: u8, data: Vec<u8>, ttl: u8, src: Ipv4Addr, dst: Ipv4Addr) -> Packet {
        let mut header = Ipv4Header {
            source: src.octets(),
            destination: dst.octets(),
            time_to_live: ttl,
            total_len: Ipv4Header::MIN_LEN_U16 + (data.len() as u16),
            protocol: proto.into(),
            ..Default::default()
        };
        header.header_checksum = header.calc_header_checksum();
        Packet { header, data }
    }
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.header.header_len() + self.data.len());
        self.header
            .write(&mut buf)
            .expect("writing into a Vec cannot fail");
        buf.extend_from_slice(&self.data);
        buf
    }
    pub fn deserialize(buf: &[u8]) -> Result<Packet> {
        let (header, rest) = Ipv4Header::from_slice(buf)
            .map_err(|_| Error::new(ErrorKind::InvalidData, "malformed ipv4 header"))?;
        let len = (header.total_len as usize).saturating_sub(Ipv4Header::MIN_LEN);
        if rest.len() < len {
            return Err(Error::new(ErrorKind::InvalidData, "truncated ipv4 packet"));
        }
        Ok(Packet {
            header,
            data: rest[..len].to_vec(),
        })
    }
    ///Recomputes the header checksum and compares it against the one on the wire
    pub fn verify_checksum(&self) -> bool {
        self.header.header_checksum == self.header.calc_header_checksum()
    }
    pub fn src(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.header.source)
    }
    pub fn dst(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.header.destination)
    }
}

///16-bit one's complement sum with end-around carry, complemented. Odd-length
///input is summed as if padded with one zero byte.
pub fn internet_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut chunks = data.chunks_exact(2);
    for word in &mut chunks {
        sum += u32::from(NetworkEndian::read_u16(word));
    }
    if let [last] = chunks.remainder() {
        sum += u32::from(*last) << 8;
    }
    while sum > 0xffff {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

///A valid netmask is a run of ones followed by a run of zeros
pub fn valid_mask(mask: u32) -> bool {
    mask.leading_ones() + mask.trailing_zeros() == 32
}

pub fn mask_len(mask: u32) -> u8 {
    mask.count_ones() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_of_checksummed_region_is_zero() {
        let mut data = vec![
            0x45, 0x00, 0x00, 0x28, 0x1c, 0x46, 0x40, 0x00, 0x40, 0x06, 0, 0, 0xac, 0x10, 0x0a,
            0x63, 0xac, 0x10, 0x0a, 0x0c,
        ];
        let csum = internet_checksum(&data);
        NetworkEndian::write_u16(&mut data[10..12], csum);
        assert_eq!(internet_checksum(&data), 0);
    }

    #[test]
    fn checksum_detects_bit_flips() {
        let mut data = vec![
            0x45, 0x00, 0x00, 0x28, 0x1c, 0x46, 0x40, 0x00, 0x40, 0x06, 0, 0, 0xac, 0x10, 0x0a,
            0x63, 0xac, 0x10, 0x0a, 0x0c,
        ];
        let csum = internet_checksum(&data);
        NetworkEndian::write_u16(&mut data[10..12], csum);
        for byte in 0..data.len() {
            let mut corrupted = data.clone();
            corrupted[byte] ^= 0x04;
            assert_ne!(
                internet_checksum(&corrupted),
                0,
                "flip in byte {byte} went undetected"
            );
        }
    }

    #[test]
    fn checksum_pads_odd_length() {
        assert_eq!(internet_checksum(&[0xab]), internet_checksum(&[0xab, 0x00]));
    }

    #[test]
    fn packet_codec_round_trips() {
        let pack = Packet::new(
            6,
            b"some payload".to_vec(),
            16,
            "10.0.0.1".parse().unwrap(),
            "10.0.0.2".parse().unwrap(),
        );
        let wire = pack.serialize();
        let parsed = Packet::deserialize(&wire).unwrap();
        assert_eq!(parsed, pack);
        assert!(parsed.verify_checksum());
    }

    #[test]
    fn corrupted_header_fails_verification() {
        let pack = Packet::new(
            0,
            b"x".to_vec(),
            16,
            "1.2.3.4".parse().unwrap(),
            "5.6.7.8".parse().unwrap(),
        );
        let mut wire = pack.serialize();
        wire[8] ^= 0xff; //ttl byte
        let parsed = Packet::deserialize(&wire).unwrap();
        assert!(!parsed.verify_checksum());
    }

    #[test]
    fn short_packet_is_rejected() {
        assert!(Packet::deserialize(&[0u8; 10]).is_err());
    }

    #[test]
    fn mask_helpers() {
        assert!(valid_mask(0xffff_ff00));
        assert!(valid_mask(0xffff_ffff));
        assert!(valid_mask(0));
        assert!(!valid_mask(0xff00_ff00));
        assert_eq!(mask_len(0xffff_ff00), 24);
        assert_eq!(mask_len(0xffff_ffff), 32);
    }
}
