use crate::conn::{ConnId, ConnectionSocket, TcpState};
use crate::listener::ListenerSocket;
use crate::node::Node;
use crate::prelude::*;
use crate::tcp_utils::TcpPacket;
use crate::utils::Packet;

struct Tables {
    conns: HashMap<ConnId, (Arc<ConnectionSocket>, Sender<TcpPacket>)>,
    listeners: HashMap<ConnId, (Arc<ListenerSocket>, Sender<TcpPacket>)>,
    sockets: Vec<ConnId>,
}

///The "OS" of the TCP stack: owns the connection, listener, and socket
///descriptor tables, and demultiplexes inbound segments by 4-tuple. It
///registers itself with the IP node as the protocol 6 handler.
pub struct TcpDriver {
    node: Arc<Node>,
    next_port: AtomicU16,
    tables: Mutex<Tables>,
}

impl TcpDriver {
    pub fn new(node: Arc<Node>) -> Arc<TcpDriver> {
        let driver = Arc::new(TcpDriver {
            node,
            next_port: AtomicU16::new(1024),
            tables: Mutex::new(Tables {
                conns: HashMap::new(),
                listeners: HashMap::new(),
                sockets: Vec::new(),
            }),
        });
        //The node outlives us only at teardown; a dead weak pointer just
        //means the packet has nowhere to go
        let weak = Arc::downgrade(&driver);
        driver.node.register_handler(
            6,
            Box::new(move |_node, pack, link_id| match weak.upgrade() {
                Some(driver) => driver.tcp_handler(pack, link_id),
                None => Ok(()),
            }),
        );
        driver
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    ///Ephemeral local ports for active opens, handed out in order
    pub fn next_ephemeral_port(&self) -> u16 {
        self.next_port.fetch_add(1, Ordering::SeqCst)
    }

    ///Inbound demux: exact 4-tuple first, then the wildcard listener key
    fn tcp_handler(&self, pack: Packet, _link_id: usize) -> Result<()> {
        let pkt = TcpPacket::deserialize(&pack)?;
        let id = ConnId {
            local_addr: pkt.dst_addr,
            local_port: pkt.header.destination_port,
            remote_addr: pkt.src_addr,
            remote_port: pkt.header.source_port,
        };
        let tables = self.tables.lock().unwrap();
        if let Some((_, mailbox)) = tables.conns.get(&id) {
            let _ = mailbox.send(pkt);
            return Ok(());
        }
        let listener_id = ConnId {
            remote_addr: Ipv4Addr::UNSPECIFIED,
            remote_port: 0,
            ..id
        };
        if let Some((_, mailbox)) = tables.listeners.get(&listener_id) {
            let _ = mailbox.send(pkt);
            return Ok(());
        }
        Err(Error::new(
            ErrorKind::NotConnected,
            "no connection or open listener found",
        ))
    }

    ///Active open. Binds the connection, then runs the SYN handshake; a
    ///handshake that never completes surfaces as a timeout.
    pub fn connect(
        self: &Arc<Self>,
        local_addr: Ipv4Addr,
        local_port: u16,
        remote_addr: Ipv4Addr,
        remote_port: u16,
    ) -> Result<Arc<ConnectionSocket>> {
        let (conn, mailbox_tx) = ConnectionSocket::new(
            Arc::clone(&self.node),
            local_addr,
            local_port,
            remote_addr,
            remote_port,
            TcpState::SynSent,
            None,
        );
        self.bind_connection(conn.id(), Arc::clone(&conn), mailbox_tx);
        self.create_socket(conn.id());
        conn.start_handshake()?;
        Ok(conn)
    }

    ///Passive open; at most one listener per (addr, port)
    pub fn listen(self: &Arc<Self>, addr: Ipv4Addr, port: u16) -> Result<Arc<ListenerSocket>> {
        let id = ConnId {
            local_addr: addr,
            local_port: port,
            remote_addr: Ipv4Addr::UNSPECIFIED,
            remote_port: 0,
        };
        if self.tables.lock().unwrap().listeners.contains_key(&id) {
            return Err(Error::new(
                ErrorKind::AddrInUse,
                "port already being listened on",
            ));
        }
        let (listener, mailbox_tx) = ListenerSocket::new(self, addr, port);
        self.tables
            .lock()
            .unwrap()
            .listeners
            .insert(id, (Arc::clone(&listener), mailbox_tx));
        self.create_socket(id);
        Ok(listener)
    }

    pub(crate) fn bind_connection(
        &self,
        id: ConnId,
        conn: Arc<ConnectionSocket>,
        mailbox: Sender<TcpPacket>,
    ) {
        self.tables.lock().unwrap().conns.insert(id, (conn, mailbox));
    }

    pub(crate) fn remove_listener(&self, id: ConnId) {
        self.tables.lock().unwrap().listeners.remove(&id);
    }

    ///Hands out the lowest socket descriptor whose old owner is gone,
    ///growing the table when every slot is still taken.
    pub(crate) fn create_socket(&self, id: ConnId) -> usize {
        let mut tables = self.tables.lock().unwrap();
        for sk in 0..tables.sockets.len() {
            let held = tables.sockets[sk];
            if tables.conns.contains_key(&held) || tables.listeners.contains_key(&held) {
                continue;
            }
            tables.sockets[sk] = id;
            return sk;
        }
        tables.sockets.push(id);
        tables.sockets.len() - 1
    }

    pub fn get_conn_socket(&self, sock_id: usize) -> Option<Arc<ConnectionSocket>> {
        let tables = self.tables.lock().unwrap();
        let id = tables.sockets.get(sock_id)?;
        tables.conns.get(id).map(|(conn, _)| Arc::clone(conn))
    }

    ///One line per socket descriptor, for `ls`
    pub fn list_sockets(&self) {
        println!("socket\tlocal-addr\tport\t\tdst-addr\tport\tstatus");
        println!("--------------------------------------------------------------");
        let tables = self.tables.lock().unwrap();
        for (sk, id) in tables.sockets.iter().enumerate() {
            if let Some((conn, _)) = tables.conns.get(id) {
                println!(
                    "{}\t{}\t{}\t\t{}\t{}\t{}",
                    sk, id.local_addr, id.local_port, id.remote_addr, id.remote_port,
                    conn.state()
                );
            }
            if tables.listeners.contains_key(id) {
                println!(
                    "{}\t{}\t\t{}\t\t{}\t\t{}\tLISTEN",
                    sk,
                    Ipv4Addr::UNSPECIFIED,
                    id.local_port,
                    id.remote_addr,
                    id.remote_port
                );
            }
        }
    }
}
