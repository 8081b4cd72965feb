use crate::prelude::*;
use crate::rip::RipRoute;
use crate::utils::RIP_ENTRY_TIMEOUT;
use log::debug;
use std::collections::VecDeque;

///One row of the routing table. Cost 0 marks a directly attached prefix and
///never carries a deadline; learned routes die unless refreshed in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteEntry {
    pub iface: usize,
    pub cost: u32,
    pub expires_at: Option<Instant>,
}

impl RouteEntry {
    pub fn local(iface: usize) -> RouteEntry {
        RouteEntry {
            iface,
            cost: 0,
            expires_at: None,
        }
    }
    pub fn learned(iface: usize, cost: u32) -> RouteEntry {
        RouteEntry {
            iface,
            cost,
            expires_at: Some(Instant::now() + RIP_ENTRY_TIMEOUT),
        }
    }
}

///Prefix table with longest-prefix match. One writer at a time; `match_route`
///and the update senders read under a shared lock.
#[derive(Debug)]
pub struct RoutingTable {
    map: RwLock<HashMap<Ipv4Net, RouteEntry>>,
}

impl RoutingTable {
    pub fn new() -> RoutingTable {
        RoutingTable {
            map: RwLock::new(HashMap::new()),
        }
    }
    pub fn snapshot(&self) -> Vec<(Ipv4Net, RouteEntry)> {
        self.map
            .read()
            .unwrap()
            .iter()
            .map(|(net, entry)| (*net, *entry))
            .collect()
    }
    pub fn set_route(&self, net: Ipv4Net, entry: RouteEntry) {
        debug!("setting route {net} with cost {}", entry.cost);
        self.map.write().unwrap().insert(net.trunc(), entry);
    }
    ///Longest-prefix match among prefixes no longer than `max_len`
    pub fn match_route(&self, addr: Ipv4Addr, max_len: u8) -> Option<(Ipv4Net, RouteEntry)> {
        let map = self.map.read().unwrap();
        match_route_on(&map, addr, max_len)
    }
    pub(crate) fn read_map(&self) -> RwLockReadGuard<HashMap<Ipv4Net, RouteEntry>> {
        self.map.read().unwrap()
    }
    pub(crate) fn write_map(&self) -> RwLockWriteGuard<HashMap<Ipv4Net, RouteEntry>> {
        self.map.write().unwrap()
    }
    ///Rips out every entry whose next hop is the given interface; returns the
    ///victims as poisoned wire entries so the caller can advertise the loss.
    pub fn remove_via_interface(&self, iface: usize) -> Vec<RipRoute> {
        let mut map = self.map.write().unwrap();
        let dead: Vec<Ipv4Net> = map
            .iter()
            .filter(|(_, entry)| entry.iface == iface)
            .map(|(net, _)| *net)
            .collect();
        dead.iter()
            .map(|net| {
                map.remove(net);
                RipRoute::poisoned(net)
            })
            .collect()
    }
    ///Removes entries whose deadline has passed, returning them poisoned
    pub fn take_expired(&self) -> Vec<RipRoute> {
        let now = Instant::now();
        let mut map = self.map.write().unwrap();
        let dead: Vec<Ipv4Net> = map
            .iter()
            .filter(|(_, entry)| entry.expires_at.map_or(false, |at| at <= now))
            .map(|(net, _)| *net)
            .collect();
        dead.iter()
            .map(|net| {
                debug!("expiring route {net}");
                map.remove(net);
                RipRoute::poisoned(net)
            })
            .collect()
    }
    ///Sibling-merge aggregation. Walks the diff, and wherever a route's
    ///sibling prefix is present with the same interface and cost, replaces the
    ///pair with their parent prefix and requeues the parent so merges can
    ///cascade. Directly attached (cost 0) prefixes are left alone. Returns the
    ///diff filtered down to entries that still exist.
    pub fn aggregate_routes(&self, new_entries: Vec<RipRoute>) -> Vec<RipRoute> {
        let mut map = self.map.write().unwrap();
        let mut queue: VecDeque<RipRoute> = new_entries.iter().copied().collect();
        let mut all = new_entries;
        while let Some(entry) = queue.pop_front() {
            let Some(net) = entry.net() else { continue };
            let len = net.prefix_len();
            if len == 0 {
                continue;
            }
            let Some(current) = map.get(&net).copied() else { continue };
            if current.cost == 0 {
                continue;
            }
            //The sibling differs from us in exactly the lowest mask bit
            let bit = 1u32 << (32 - len);
            let sibling_addr = (u32::from(net.addr()) & u32::from(net.netmask())) ^ bit;
            let sibling = Ipv4Net::new(Ipv4Addr::from(sibling_addr), len).unwrap();
            let Some(sib) = map.get(&sibling).copied() else { continue };
            if sib.cost != current.cost || sib.iface != current.iface || sib.cost == 0 {
                continue;
            }
            let parent_mask = u32::from(net.netmask()) << 1;
            let parent_addr = u32::from(net.addr()) & parent_mask;
            let parent = Ipv4Net::new(Ipv4Addr::from(parent_addr), len - 1).unwrap();
            if let Some(existing) = map.get(&parent).copied() {
                let may_replace = current.cost < existing.cost
                    || (current.cost == existing.cost && current.iface == existing.iface);
                if !may_replace {
                    continue;
                }
            }
            let merged = RouteEntry::learned(current.iface, current.cost);
            debug!("merging {net} and {sibling} into {parent}");
            map.insert(parent, merged);
            map.remove(&net);
            map.remove(&sibling);
            let rip = RipRoute {
                cost: merged.cost,
                address: parent_addr,
                mask: parent_mask,
            };
            queue.push_back(rip);
            all.push(rip);
        }
        all.retain(|entry| entry.net().map_or(false, |net| map.contains_key(&net)));
        all
    }
}

pub(crate) fn match_route_on(
    map: &HashMap<Ipv4Net, RouteEntry>,
    addr: Ipv4Addr,
    max_len: u8,
) -> Option<(Ipv4Net, RouteEntry)> {
    let mut best: Option<(Ipv4Net, RouteEntry)> = None;
    for (net, entry) in map {
        if net.contains(&addr) && net.prefix_len() <= max_len {
            match best {
                Some((b, _)) if b.prefix_len() >= net.prefix_len() => {}
                _ => best = Some((*net, *entry)),
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(s: &str) -> Ipv4Net {
        s.parse().unwrap()
    }

    #[test]
    fn longest_prefix_wins() {
        let table = RoutingTable::new();
        table.set_route(net("10.0.0.0/8"), RouteEntry::learned(0, 3));
        table.set_route(net("10.1.0.0/16"), RouteEntry::learned(1, 2));
        table.set_route(net("10.1.2.0/24"), RouteEntry::learned(2, 1));
        let addr: Ipv4Addr = "10.1.2.3".parse().unwrap();
        assert_eq!(table.match_route(addr, 32).unwrap().0, net("10.1.2.0/24"));
        assert_eq!(table.match_route(addr, 16).unwrap().0, net("10.1.0.0/16"));
        assert_eq!(table.match_route(addr, 8).unwrap().0, net("10.0.0.0/8"));
        let other: Ipv4Addr = "10.9.9.9".parse().unwrap();
        assert_eq!(table.match_route(other, 32).unwrap().0, net("10.0.0.0/8"));
        assert!(table.match_route("192.168.0.1".parse().unwrap(), 32).is_none());
    }

    #[test]
    fn expired_entries_are_collected_poisoned() {
        let table = RoutingTable::new();
        let mut entry = RouteEntry::learned(0, 2);
        entry.expires_at = Some(Instant::now() - Duration::from_millis(1));
        table.set_route(net("10.2.0.0/16"), entry);
        table.set_route(net("10.3.0.0/16"), RouteEntry::learned(0, 2));
        let dead = table.take_expired();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].cost, crate::utils::INFINITY);
        assert_eq!(dead[0].address, u32::from("10.2.0.0".parse::<Ipv4Addr>().unwrap()));
        assert!(table.match_route("10.2.1.1".parse().unwrap(), 32).is_none());
        assert!(table.match_route("10.3.1.1".parse().unwrap(), 32).is_some());
    }

    #[test]
    fn local_routes_never_expire() {
        let table = RoutingTable::new();
        table.set_route(net("10.0.0.1/32"), RouteEntry::local(0));
        assert!(table.take_expired().is_empty());
    }

    #[test]
    fn siblings_merge_into_parent() {
        let table = RoutingTable::new();
        table.set_route(net("10.4.0.0/16"), RouteEntry::learned(1, 2));
        table.set_route(net("10.5.0.0/16"), RouteEntry::learned(1, 2));
        let diff = vec![RipRoute {
            cost: 2,
            address: u32::from("10.4.0.0".parse::<Ipv4Addr>().unwrap()),
            mask: 0xffff_0000,
        }];
        let merged = table.aggregate_routes(diff);
        //Children replaced by the /15 parent, which covers the same addresses
        assert!(merged.iter().any(|r| r.mask == 0xfffe_0000));
        let snapshot = table.snapshot();
        assert_eq!(snapshot.len(), 1);
        let (parent, entry) = snapshot[0];
        assert_eq!(parent, net("10.4.0.0/15"));
        assert_eq!(entry.cost, 2);
        assert_eq!(entry.iface, 1);
        assert!(parent.contains(&"10.4.1.1".parse::<Ipv4Addr>().unwrap()));
        assert!(parent.contains(&"10.5.1.1".parse::<Ipv4Addr>().unwrap()));
    }

    #[test]
    fn merges_cascade_upward() {
        let table = RoutingTable::new();
        table.set_route(net("10.4.0.0/16"), RouteEntry::learned(1, 2));
        table.set_route(net("10.5.0.0/16"), RouteEntry::learned(1, 2));
        table.set_route(net("10.6.0.0/15"), RouteEntry::learned(1, 2));
        let diff = vec![RipRoute {
            cost: 2,
            address: u32::from("10.4.0.0".parse::<Ipv4Addr>().unwrap()),
            mask: 0xffff_0000,
        }];
        table.aggregate_routes(diff);
        let snapshot = table.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].0, net("10.4.0.0/14"));
    }

    #[test]
    fn mismatched_siblings_stay_put() {
        let table = RoutingTable::new();
        table.set_route(net("10.4.0.0/16"), RouteEntry::learned(1, 2));
        table.set_route(net("10.5.0.0/16"), RouteEntry::learned(2, 2)); //different interface
        let diff = vec![RipRoute {
            cost: 2,
            address: u32::from("10.4.0.0".parse::<Ipv4Addr>().unwrap()),
            mask: 0xffff_0000,
        }];
        table.aggregate_routes(diff);
        assert_eq!(table.snapshot().len(), 2);
    }

    #[test]
    fn local_routes_do_not_aggregate() {
        let table = RoutingTable::new();
        table.set_route(net("10.0.0.0/32"), RouteEntry::local(0));
        table.set_route(net("10.0.0.1/32"), RouteEntry::local(0));
        let diff = vec![RipRoute {
            cost: 0,
            address: u32::from("10.0.0.0".parse::<Ipv4Addr>().unwrap()),
            mask: 0xffff_ffff,
        }];
        table.aggregate_routes(diff);
        assert_eq!(table.snapshot().len(), 2);
    }

    #[test]
    fn interface_removal_poisons_entries() {
        let table = RoutingTable::new();
        table.set_route(net("10.1.0.0/16"), RouteEntry::learned(0, 1));
        table.set_route(net("10.2.0.0/16"), RouteEntry::learned(1, 1));
        let dead = table.remove_via_interface(0);
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].cost, crate::utils::INFINITY);
        assert_eq!(table.snapshot().len(), 1);
    }
}
