use crate::prelude::*;
use crate::utils::Packet;
use log::debug;

///One point-to-point link: our VIP, the peer's VIP, and the UDP endpoint that
///stands in for the wire. All interfaces of a node share its UDP socket; an
///interface is told apart on receive by the peer's UDP port.
#[derive(Debug)]
pub struct Interface {
    pub addr: Ipv4Addr,
    pub remote: Ipv4Addr,
    pub udp_target: SocketAddr,
    pub udp_port: u16,
    enabled: AtomicBool,
}

impl Interface {
    pub fn new(addr: Ipv4Addr, remote: Ipv4Addr, udp_target: SocketAddr, udp_port: u16) -> Interface {
        Interface {
            addr,
            remote,
            udp_target,
            udp_port,
            enabled: AtomicBool::new(true), //Interfaces always start up
        }
    }
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
    pub fn set_enabled(&self, up: bool) {
        self.enabled.store(up, Ordering::SeqCst);
    }
    ///Send gate: a disabled interface silently eats the packet
    pub fn send(&self, sock: &UdpSocket, pack: &Packet) {
        if !self.is_enabled() {
            return;
        }
        if let Err(e) = sock.send_to(&pack.serialize(), self.udp_target) {
            debug!("udp send to {} failed: {e}", self.udp_target);
        }
    }
}
