//Multi-node scenarios over loopback UDP: routing convergence, link
//administration, and TCP streams between two virtual hosts.

use library::config::{LinkConfig, LinkEntry};
use library::conn::TcpState;
use library::driver::TcpDriver;
use library::node::Node;
use library::utils::INFINITY;
use std::net::{Ipv4Addr, UdpSocket};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

///Grab n distinct UDP ports the OS considers free right now
fn reserve_ports(n: usize) -> Vec<u16> {
    let socks: Vec<UdpSocket> = (0..n)
        .map(|_| UdpSocket::bind("127.0.0.1:0").unwrap())
        .collect();
    socks
        .iter()
        .map(|sock| sock.local_addr().unwrap().port())
        .collect()
}

fn start_node(port: u16, links: &[(u16, &str, &str)]) -> Arc<Node> {
    let config = LinkConfig {
        host: "127.0.0.1".to_string(),
        udp_port: port,
        links: links
            .iter()
            .map(|(peer_port, local, peer)| LinkEntry {
                peer_host: "127.0.0.1".to_string(),
                peer_port: *peer_port,
                local_vip: local.parse().unwrap(),
                peer_vip: peer.parse().unwrap(),
            })
            .collect(),
    };
    let node = Arc::new(Node::new(config).unwrap());
    node.run();
    node
}

fn wait_for(cond: impl Fn() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(50));
    }
    false
}

fn vip(s: &str) -> Ipv4Addr {
    s.parse().unwrap()
}

#[test]
fn rip_converges_across_a_line() {
    let ports = reserve_ports(3);
    let (pa, pb, pc) = (ports[0], ports[1], ports[2]);
    let node_a = start_node(pa, &[(pb, "10.1.0.1", "10.1.0.2")]);
    let node_b = start_node(pb, &[(pa, "10.1.0.2", "10.1.0.1"), (pc, "10.2.0.1", "10.2.0.2")]);
    let node_c = start_node(pc, &[(pb, "10.2.0.2", "10.2.0.1")]);

    //B sits one hop from each end
    assert!(wait_for(
        || {
            node_b
                .routing_table
                .match_route(vip("10.1.0.1"), 32)
                .map_or(false, |(_, entry)| entry.cost == 1)
        },
        Duration::from_secs(10),
    ));
    //A reaches C's far interface through B at cost 2
    assert!(wait_for(
        || {
            node_a
                .routing_table
                .match_route(vip("10.2.0.2"), 32)
                .map_or(false, |(_, entry)| entry.cost == 2 && entry.iface == 0)
        },
        Duration::from_secs(10),
    ));
    //And symmetrically
    assert!(wait_for(
        || {
            node_c
                .routing_table
                .match_route(vip("10.1.0.1"), 32)
                .map_or(false, |(_, entry)| entry.cost == 2)
        },
        Duration::from_secs(10),
    ));
}

#[test]
fn interface_down_drops_local_routes_immediately() {
    let ports = reserve_ports(2);
    let node_a = start_node(ports[0], &[(ports[1], "10.3.0.1", "10.3.0.2")]);
    let node_b = start_node(ports[1], &[(ports[0], "10.3.0.2", "10.3.0.1")]);

    assert!(wait_for(
        || node_a.routing_table.match_route(vip("10.3.0.2"), 32).is_some(),
        Duration::from_secs(10),
    ));
    let _ = node_b; //stays up; only A's side goes down
    node_a.interface_down(0).unwrap();
    //Everything riding interface 0 is gone, our own /32 included. The local
    //route cannot come back on its own: the neighbor only ever advertises it
    //poison-reversed.
    assert!(node_a.routing_table.match_route(vip("10.3.0.1"), 32).is_none());
    //Bringing it back restores the local route
    node_a.interface_up(0).unwrap();
    let (_, entry) = node_a.routing_table.match_route(vip("10.3.0.1"), 32).unwrap();
    assert_eq!(entry.cost, 0);
}

#[test]
fn silent_neighbor_routes_age_out() {
    let ports = reserve_ports(2);
    let node_a = start_node(ports[0], &[(ports[1], "10.4.0.1", "10.4.0.2")]);
    let node_b = start_node(ports[1], &[(ports[0], "10.4.0.2", "10.4.0.1")]);

    assert!(wait_for(
        || {
            node_a
                .routing_table
                .match_route(vip("10.4.0.2"), 32)
                .map_or(false, |(_, entry)| entry.cost == 1)
        },
        Duration::from_secs(10),
    ));
    //B goes quiet; its advertisement stops being refreshed and dies
    node_b.interface_down(0).unwrap();
    assert!(wait_for(
        || {
            match node_a.routing_table.match_route(vip("10.4.0.2"), 32) {
                None => true,
                Some((_, entry)) => entry.cost >= INFINITY,
            }
        },
        Duration::from_secs(16),
    ));
}

fn two_hosts() -> (Arc<Node>, Arc<Node>, Arc<TcpDriver>, Arc<TcpDriver>) {
    let ports = reserve_ports(2);
    let node_a = start_node(ports[0], &[(ports[1], "10.0.0.1", "10.0.0.2")]);
    let node_b = start_node(ports[1], &[(ports[0], "10.0.0.2", "10.0.0.1")]);
    let driver_a = TcpDriver::new(Arc::clone(&node_a));
    let driver_b = TcpDriver::new(Arc::clone(&node_b));
    //Both directions must be routable before anyone dials
    assert!(wait_for(
        || {
            node_a.routing_table.match_route(vip("10.0.0.2"), 32).is_some()
                && node_b.routing_table.match_route(vip("10.0.0.1"), 32).is_some()
        },
        Duration::from_secs(10),
    ));
    (node_a, node_b, driver_a, driver_b)
}

#[test]
fn tcp_handshake_data_and_teardown() {
    let (_node_a, _node_b, driver_a, driver_b) = two_hosts();
    let listener = driver_a.listen(vip("10.0.0.1"), 5000).unwrap();
    let (sid_tx, sid_rx) = mpsc::channel();
    thread::spawn(move || {
        let sid = listener.accept().unwrap();
        sid_tx.send(sid).unwrap();
    });

    let client = driver_b
        .connect(vip("10.0.0.2"), 1024, vip("10.0.0.1"), 5000)
        .unwrap();
    assert_eq!(client.state(), TcpState::Established);
    let sid = sid_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    let server = driver_a.get_conn_socket(sid).unwrap();
    assert!(wait_for(
        || server.state() == TcpState::Established,
        Duration::from_secs(2),
    ));

    client.write(b"HELLO").unwrap();
    let data = server.read(5, true).unwrap();
    assert_eq!(data, b"HELLO");

    client.close();
    assert!(wait_for(
        || server.state() == TcpState::CloseWait,
        Duration::from_secs(3),
    ));
    server.close();
    assert!(wait_for(
        || server.state() == TcpState::Closed,
        Duration::from_secs(3),
    ));
    assert!(wait_for(
        || client.state() == TcpState::TimeWait,
        Duration::from_secs(3),
    ));
}

#[test]
fn bulk_transfer_through_a_stalled_window() {
    let (_node_a, _node_b, driver_a, driver_b) = two_hosts();
    let listener = driver_a.listen(vip("10.0.0.1"), 6000).unwrap();
    let (sid_tx, sid_rx) = mpsc::channel();
    thread::spawn(move || {
        let sid = listener.accept().unwrap();
        sid_tx.send(sid).unwrap();
    });

    let client = driver_b
        .connect(vip("10.0.0.2"), 2048, vip("10.0.0.1"), 6000)
        .unwrap();
    let sid = sid_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    let server = driver_a.get_conn_socket(sid).unwrap();

    //More than the receive window, so the sender has to probe its way through
    let payload: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
    let to_send = payload.clone();
    let writer = thread::spawn(move || {
        assert_eq!(client.write(&to_send).unwrap() as usize, to_send.len());
        client.close();
    });

    //Stall before reading so the window really closes
    thread::sleep(Duration::from_millis(500));
    let mut received = Vec::new();
    while received.len() < payload.len() {
        match server.read((payload.len() - received.len()) as u32, true) {
            Ok(chunk) => received.extend_from_slice(&chunk),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => panic!("read failed: {e}"),
        }
    }
    assert_eq!(received.len(), payload.len());
    assert_eq!(received, payload);
    writer.join().unwrap();
}

#[test]
fn duplicate_listen_is_refused() {
    let (node_a, _node_b, driver_a, _driver_b) = two_hosts();
    let _listener = driver_a.listen(node_a.get_open_addr(), 7000).unwrap();
    let err = driver_a.listen(node_a.get_open_addr(), 7000).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::AddrInUse);
}

#[test]
fn connect_to_nowhere_times_out() {
    let (_node_a, _node_b, _driver_a, driver_b) = two_hosts();
    //No listener on that port anywhere
    let err = driver_b
        .connect(vip("10.0.0.2"), 3000, vip("10.0.0.1"), 9999)
        .unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);
}
