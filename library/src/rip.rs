use crate::node::Node;
use crate::prelude::*;
use crate::route::{match_route_on, RouteEntry};
use crate::utils::{
    Packet, DEFAULT_TTL, INFINITY, MAX_RIP_ENTRIES, RIP_SWEEP_TICK, RIP_UPDATE_COOLDOWN,
};
use byteorder::{ByteOrder, NetworkEndian};
use log::debug;

pub const RIP_REQUEST: u16 = 1;
pub const RIP_RESPONSE: u16 = 2;

///One advertised route on the wire: cost, network address, netmask
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RipRoute {
    pub cost: u32,
    pub address: u32,
    pub mask: u32,
}

impl RipRoute {
    pub fn from_entry(net: &Ipv4Net, entry: &RouteEntry) -> RipRoute {
        RipRoute {
            cost: entry.cost,
            address: u32::from(net.addr()),
            mask: u32::from(net.netmask()),
        }
    }
    pub fn poisoned(net: &Ipv4Net) -> RipRoute {
        RipRoute {
            cost: INFINITY,
            address: u32::from(net.addr()),
            mask: u32::from(net.netmask()),
        }
    }
    ///The advertised prefix, if the mask is contiguous
    pub fn net(&self) -> Option<Ipv4Net> {
        Ipv4Net::with_netmask(Ipv4Addr::from(self.address), Ipv4Addr::from(self.mask))
            .ok()
            .map(|net| net.trunc())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RipMsg {
    pub command: u16,
    pub routes: Vec<RipRoute>,
}

impl RipMsg {
    pub fn request() -> RipMsg {
        RipMsg {
            command: RIP_REQUEST,
            routes: Vec::new(),
        }
    }
    pub fn response(routes: Vec<RipRoute>) -> RipMsg {
        RipMsg {
            command: RIP_RESPONSE,
            routes,
        }
    }
}

///Wire format: [cmd:u16][n:u16] then n x [cost:u32][addr:u32][mask:u32],
///big-endian throughout. At most MAX_RIP_ENTRIES entries go out.
pub fn serialize_rip(msg: &RipMsg) -> Vec<u8> {
    let count = cmp::min(msg.routes.len(), MAX_RIP_ENTRIES as usize);
    let mut buf = vec![0u8; 4 + 12 * count];
    NetworkEndian::write_u16(&mut buf[0..2], msg.command);
    NetworkEndian::write_u16(&mut buf[2..4], count as u16);
    for (i, route) in msg.routes.iter().take(count).enumerate() {
        let off = 4 + i * 12;
        NetworkEndian::write_u32(&mut buf[off..off + 4], route.cost);
        NetworkEndian::write_u32(&mut buf[off + 4..off + 8], route.address);
        NetworkEndian::write_u32(&mut buf[off + 8..off + 12], route.mask);
    }
    buf
}

pub fn deserialize_rip(data: &[u8]) -> Result<RipMsg> {
    if data.len() < 4 {
        return Err(Error::new(ErrorKind::InvalidData, "short rip message"));
    }
    let command = NetworkEndian::read_u16(&data[0..2]);
    let count = NetworkEndian::read_u16(&data[2..4]);
    if count > MAX_RIP_ENTRIES {
        return Err(Error::new(ErrorKind::InvalidData, "too many entries"));
    }
    let needed = 4 + 12 * count as usize;
    if data.len() < needed {
        return Err(Error::new(ErrorKind::InvalidData, "truncated rip message"));
    }
    let mut routes = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        let off = 4 + i * 12;
        routes.push(RipRoute {
            cost: NetworkEndian::read_u32(&data[off..off + 4]),
            address: NetworkEndian::read_u32(&data[off + 4..off + 8]),
            mask: NetworkEndian::read_u32(&data[off + 8..off + 12]),
        });
    }
    Ok(RipMsg { command, routes })
}

///Protocol 200 handler. Requests get our table unicast back on the receiving
///interface; responses are ingested and any resulting diff goes out as a
///triggered update.
pub fn rip_handler(node: &Node, pack: Packet, link_id: usize) -> Result<()> {
    let msg = deserialize_rip(&pack.data)?;
    match msg.command {
        RIP_REQUEST => {
            let iface = &node.interfaces[link_id];
            let resp = RipMsg::response(table_entries(node));
            let out = Packet::new(200, serialize_rip(&resp), DEFAULT_TTL, iface.addr, iface.remote);
            iface.send(&node.udp_sock, &out);
            Ok(())
        }
        RIP_RESPONSE => {
            let mut diff = ingest(node, &msg, link_id);
            if !diff.is_empty() {
                if node.aggregate() {
                    diff = node.routing_table.aggregate_routes(diff);
                }
                send_triggered_update(node, &diff);
            }
            Ok(())
        }
        cmd => Err(Error::new(
            ErrorKind::InvalidData,
            format!("invalid rip command {cmd}"),
        )),
    }
}

///Applies one response to the table and returns the installed/changed entries.
///The whole message is processed under a single write acquisition.
fn ingest(node: &Node, msg: &RipMsg, link_id: usize) -> Vec<RipRoute> {
    let mut diff = Vec::new();
    let mut map = node.routing_table.write_map();
    for route in &msg.routes {
        let Some(net) = route.net() else {
            debug!("ignoring rip entry with invalid mask {:#010x}", route.mask);
            continue;
        };
        let cost = cmp::min(route.cost.saturating_add(1), INFINITY);
        let advertised = Ipv4Addr::from(route.address);
        match match_route_on(&map, advertised, net.prefix_len()) {
            None => {
                //Brand new route; unreachable ones aren't worth installing
                if cost >= INFINITY {
                    continue;
                }
                let entry = RouteEntry::learned(link_id, cost);
                map.insert(net, entry);
                diff.push(RipRoute::from_entry(&net, &entry));
            }
            Some((_, existing)) if existing.cost == 0 => {
                //Directly attached; a neighbor can't know better
            }
            Some((_, existing))
                if cost < existing.cost || (cost > existing.cost && link_id == existing.iface) =>
            {
                //Better path, or our current next hop got worse
                if cost >= INFINITY {
                    map.remove(&net);
                    continue;
                }
                let entry = RouteEntry::learned(link_id, cost);
                map.insert(net, entry);
                diff.push(RipRoute::from_entry(&net, &entry));
            }
            Some((matched, existing)) if existing.iface == link_id => {
                //Unchanged and refreshed by its own next hop
                if let Some(entry) = map.get_mut(&matched) {
                    *entry = RouteEntry::learned(entry.iface, entry.cost);
                }
            }
            Some(_) => {} //A worse path from elsewhere; ignore
        }
    }
    diff
}

///Everything in the table, locals included
fn table_entries(node: &Node) -> Vec<RipRoute> {
    node.routing_table
        .snapshot()
        .iter()
        .map(|(net, entry)| RipRoute::from_entry(net, entry))
        .collect()
}

///Split horizon with poison reverse: entries routed out the interface they
///would be advertised on go out at cost infinity. Cost-0 locals are exempt.
fn apply_poison(node: &Node, iface: usize, routes: &mut [RipRoute]) {
    let map = node.routing_table.read_map();
    for route in routes.iter_mut() {
        if route.cost == 0 {
            continue;
        }
        let Some(net) = route.net() else { continue };
        if let Some(entry) = map.get(&net) {
            if entry.iface == iface {
                route.cost = INFINITY;
            }
        }
    }
}

///Startup plus the periodic cycle: one request per interface so neighbors
///answer with their tables, an immediate full response, then a full response
///every update period.
pub fn send_rip_updates(node: &Node) {
    //Give the other nodes in the network a moment to come up
    thread::sleep(Duration::from_millis(100));
    send_rip_request(node);
    send_rip_update(node);
    loop {
        thread::sleep(RIP_UPDATE_COOLDOWN);
        send_rip_update(node);
    }
}

fn send_rip_request(node: &Node) {
    let data = serialize_rip(&RipMsg::request());
    for iface in &node.interfaces {
        let pack = Packet::new(200, data.clone(), DEFAULT_TTL, iface.addr, iface.remote);
        iface.send(&node.udp_sock, &pack);
    }
}

fn send_rip_update(node: &Node) {
    for (i, iface) in node.interfaces.iter().enumerate() {
        let mut routes = table_entries(node);
        apply_poison(node, i, &mut routes);
        let pack = Packet::new(
            200,
            serialize_rip(&RipMsg::response(routes)),
            DEFAULT_TTL,
            iface.addr,
            iface.remote,
        );
        iface.send(&node.udp_sock, &pack);
    }
}

///Out-of-schedule advertisement of a diff, subject to the same split-horizon
///treatment as the periodic updates. Callers must not hold the table lock.
pub fn send_triggered_update(node: &Node, entries: &[RipRoute]) {
    for (i, iface) in node.interfaces.iter().enumerate() {
        let mut routes = entries.to_vec();
        apply_poison(node, i, &mut routes);
        let pack = Packet::new(
            200,
            serialize_rip(&RipMsg::response(routes)),
            DEFAULT_TTL,
            iface.addr,
            iface.remote,
        );
        iface.send(&node.udp_sock, &pack);
    }
}

///Aging worker: deletes routes whose deadline passed and advertises each
///deletion at cost infinity.
pub fn run_table_sweep(node: &Node) {
    loop {
        thread::sleep(RIP_SWEEP_TICK);
        let expired = node.routing_table.take_expired();
        if !expired.is_empty() {
            send_triggered_update(node, &expired);
        }
    }
}
