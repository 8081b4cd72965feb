use crate::config::LinkConfig;
use crate::interface::Interface;
use crate::prelude::*;
use crate::route::{RouteEntry, RoutingTable};
use crate::utils::{self, Packet, DEFAULT_TTL};
use crate::{icmp, rip};
use log::{debug, warn};
use std::net::ToSocketAddrs;

///A registered upper-layer protocol. Handlers get the node, the packet, and
///the index of the interface it arrived on.
pub type ProtocolHandler = Box<dyn Fn(&Node, Packet, usize) -> Result<()> + Send + Sync>;

///One virtual host/router: the UDP socket standing in for all its links, the
///interfaces hanging off it, and the routing table.
pub struct Node {
    pub udp_sock: UdpSocket,
    pub interfaces: Vec<Interface>,
    pub routing_table: RoutingTable,
    handlers: RwLock<HashMap<u8, ProtocolHandler>>,
    pub(crate) icmp_tx: Sender<Ipv4Addr>,
    pub(crate) icmp_rx: Mutex<Receiver<Ipv4Addr>>,
    aggregate: AtomicBool,
}

impl Node {
    ///Builds a node from a parsed link file: binds the UDP socket, creates an
    ///interface per link, and installs each local VIP as a cost-0 /32 route.
    ///ICMP and RIP handlers come preregistered.
    pub fn new(config: LinkConfig) -> Result<Node> {
        let udp_sock = UdpSocket::bind((config.host.as_str(), config.udp_port))?;
        let routing_table = RoutingTable::new();
        let mut interfaces = Vec::new();
        for link in &config.links {
            let udp_target = (link.peer_host.as_str(), link.peer_port)
                .to_socket_addrs()?
                .next()
                .ok_or_else(|| {
                    Error::new(ErrorKind::AddrNotAvailable, "cannot resolve peer endpoint")
                })?;
            routing_table.set_route(
                Ipv4Net::new(link.local_vip, 32).unwrap(),
                RouteEntry::local(interfaces.len()),
            );
            interfaces.push(Interface::new(
                link.local_vip,
                link.peer_vip,
                udp_target,
                link.peer_port,
            ));
        }
        let (icmp_tx, icmp_rx) = channel();
        let node = Node {
            udp_sock,
            interfaces,
            routing_table,
            handlers: RwLock::new(HashMap::new()),
            icmp_tx,
            icmp_rx: Mutex::new(icmp_rx),
            aggregate: AtomicBool::new(false),
        };
        node.register_handler(1, Box::new(icmp::icmp_handler));
        node.register_handler(200, Box::new(rip::rip_handler));
        Ok(node)
    }

    pub fn register_handler(&self, proto: u8, handler: ProtocolHandler) {
        self.handlers.write().unwrap().insert(proto, handler);
    }

    pub fn set_aggregate(&self, flag: bool) {
        self.aggregate.store(flag, Ordering::SeqCst);
    }
    pub fn aggregate(&self) -> bool {
        self.aggregate.load(Ordering::SeqCst)
    }

    ///Spawns the node's long-running workers: the UDP listener, the RIP
    ///update cycle, and the route aging sweep.
    pub fn run(self: &Arc<Node>) {
        let node = Arc::clone(self);
        thread::spawn(move || node.handle_udp_listen());
        let node = Arc::clone(self);
        thread::spawn(move || rip::send_rip_updates(&node));
        let node = Arc::clone(self);
        thread::spawn(move || rip::run_table_sweep(&node));
    }

    ///The receive path. Short datagrams, unknown senders, disabled
    ///interfaces, and bad checksums are dropped without comment; packets for
    ///one of our VIPs go to the protocol handler; everything else is
    ///forwarded.
    fn handle_udp_listen(&self) {
        let mut buf = [0u8; utils::MAX_FRAME_SIZE];
        loop {
            let (n, sender) = match self.udp_sock.recv_from(&mut buf) {
                Ok(recvd) => recvd,
                Err(e) => {
                    warn!("udp recv failed: {e}");
                    return;
                }
            };
            if n < utils::MIN_PACKET_SIZE {
                continue;
            }
            let Ok(pack) = Packet::deserialize(&buf[..n]) else { continue };
            debug!("received packet for {} from {sender}", pack.dst());
            let Some(link_id) = self
                .interfaces
                .iter()
                .position(|iface| iface.udp_port == sender.port())
            else {
                continue;
            };
            if !self.interfaces[link_id].is_enabled() {
                continue;
            }
            if !pack.verify_checksum() {
                continue;
            }
            let dst = pack.dst();
            if self.interfaces.iter().any(|iface| iface.addr == dst) {
                let proto = pack.header.protocol.0;
                let handlers = self.handlers.read().unwrap();
                match handlers.get(&proto) {
                    Some(handler) => {
                        if let Err(e) = handler(self, pack, link_id) {
                            debug!("handler for protocol {proto} failed: {e}");
                        }
                    }
                    None => debug!("no handler for protocol {proto}, dropping"),
                }
            } else {
                self.forward(pack);
            }
        }
    }

    ///Decrement TTL and pass the packet along; a TTL that hits zero earns the
    ///sender an ICMP Time Exceeded instead.
    fn forward(&self, mut pack: Packet) {
        pack.header.time_to_live = pack.header.time_to_live.saturating_sub(1);
        if pack.header.time_to_live == 0 {
            let src = pack.src();
            let Some((_, entry)) = self.routing_table.match_route(src, 32) else {
                //No way to tell them; the loss stays our secret
                return;
            };
            let local = self.interfaces[entry.iface].addr;
            icmp::send_time_exceeded(self, local, src, &pack);
            return;
        }
        pack.header.header_checksum = pack.header.calc_header_checksum();
        self.send_packet(pack);
    }

    pub fn send(&self, proto: u8, data: Vec<u8>, ttl: u8, src: Ipv4Addr, dst: Ipv4Addr) {
        self.send_packet(Packet::new(proto, data, ttl, src, dst));
    }

    ///Routes a finished packet out the interface the table picks for it
    pub fn send_packet(&self, pack: Packet) {
        let dst = pack.dst();
        match self.routing_table.match_route(dst, 32) {
            Some((_, entry)) => {
                debug!("sending packet to {dst} via interface {}", entry.iface);
                self.interfaces[entry.iface].send(&self.udp_sock, &pack);
            }
            None => debug!("no route to {dst}, dropping"),
        }
    }

    ///Builds a test/data packet sourced from the chosen interface and ships it
    pub fn send_data(&self, dst: Ipv4Addr, proto: u8, payload: Vec<u8>) {
        let Some((_, entry)) = self.routing_table.match_route(dst, 32) else {
            debug!("no route to {dst}, dropping");
            return;
        };
        let iface = &self.interfaces[entry.iface];
        let pack = Packet::new(proto, payload, DEFAULT_TTL, iface.addr, dst);
        iface.send(&self.udp_sock, &pack);
    }

    ///Disable an interface. Routes through it are poisoned, deleted, and the
    ///deletions advertised to whoever can still hear us.
    pub fn interface_down(&self, inum: usize) -> Result<()> {
        if inum >= self.interfaces.len() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "index exceeds number of interfaces",
            ));
        }
        let deleted = self.routing_table.remove_via_interface(inum);
        self.interfaces[inum].set_enabled(false);
        if !deleted.is_empty() {
            rip::send_triggered_update(self, &deleted);
        }
        Ok(())
    }

    ///Re-enable an interface and re-announce its local route
    pub fn interface_up(&self, inum: usize) -> Result<()> {
        if inum >= self.interfaces.len() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "index exceeds number of interfaces",
            ));
        }
        self.interfaces[inum].set_enabled(true);
        let net = Ipv4Net::new(self.interfaces[inum].addr, 32).unwrap();
        let entry = RouteEntry::local(inum);
        self.routing_table.set_route(net, entry);
        rip::send_triggered_update(self, &[rip::RipRoute::from_entry(&net, &entry)]);
        Ok(())
    }

    ///The first enabled interface's VIP; what sockets bind to by default
    pub fn get_open_addr(&self) -> Ipv4Addr {
        self.interfaces
            .iter()
            .find(|iface| iface.is_enabled())
            .map(|iface| iface.addr)
            .unwrap_or(Ipv4Addr::UNSPECIFIED)
    }

    pub(crate) fn notify_hop(&self, hop: Ipv4Addr) {
        let _ = self.icmp_tx.send(hop);
    }

    pub fn list_interfaces(&self) {
        println!("id\trem\t\tloc\t\tstate");
        for (i, iface) in self.interfaces.iter().enumerate() {
            let state = if iface.is_enabled() { "up" } else { "down" };
            println!("{}\t{}\t{}\t{}", i, iface.remote, iface.addr, state);
        }
    }

    pub fn list_routes(&self) {
        println!("cost\tdst\t\tloc");
        for (net, entry) in self.routing_table.snapshot() {
            println!(
                "{}\t{}/{}\t{}",
                entry.cost,
                net.addr(),
                net.prefix_len(),
                self.interfaces[entry.iface].addr
            );
        }
    }
}
