use crate::conn::{ConnId, ConnectionSocket, TcpState};
use crate::driver::TcpDriver;
use crate::prelude::*;
use crate::tcp_utils::TcpPacket;
use log::debug;
use std::fmt;

///A passive-open socket. Its mailbox worker mints a connection for every SYN
///that lands on the port; connections report back through the ready channel
///once their handshake finishes, where `accept` picks them up.
pub struct ListenerSocket {
    pub addr: Ipv4Addr,
    pub port: u16,
    driver: Weak<TcpDriver>,
    ready_rx: Mutex<Receiver<Arc<ConnectionSocket>>>,
    ready_tx: Sender<Arc<ConnectionSocket>>,
}

impl fmt::Debug for ListenerSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerSocket")
            .field("addr", &self.addr)
            .field("port", &self.port)
            .finish()
    }
}

impl ListenerSocket {
    pub(crate) fn new(
        driver: &Arc<TcpDriver>,
        addr: Ipv4Addr,
        port: u16,
    ) -> (Arc<ListenerSocket>, Sender<TcpPacket>) {
        let (ready_tx, ready_rx) = channel();
        let (mailbox_tx, mailbox_rx) = channel();
        let listener = Arc::new(ListenerSocket {
            addr,
            port,
            driver: Arc::downgrade(driver),
            ready_rx: Mutex::new(ready_rx),
            ready_tx,
        });
        let slf = Arc::clone(&listener);
        thread::spawn(move || slf.receive_thread(mailbox_rx));
        (listener, mailbox_tx)
    }

    pub(crate) fn id(&self) -> ConnId {
        ConnId {
            local_addr: self.addr,
            local_port: self.port,
            remote_addr: Ipv4Addr::UNSPECIFIED,
            remote_port: 0,
        }
    }

    ///Blocks until a handshake completes, then binds the new connection to a
    ///fresh socket descriptor.
    pub fn accept(&self) -> Result<usize> {
        let conn = self
            .ready_rx
            .lock()
            .unwrap()
            .recv()
            .map_err(|_| Error::new(ErrorKind::BrokenPipe, "listener closed"))?;
        let driver = self
            .driver
            .upgrade()
            .ok_or_else(|| Error::new(ErrorKind::NotConnected, "driver has gone away"))?;
        Ok(driver.create_socket(conn.id()))
    }

    ///Unregisters the listener; its mailbox worker winds down once the
    ///driver's sender is gone.
    pub fn close(&self) {
        if let Some(driver) = self.driver.upgrade() {
            driver.remove_listener(self.id());
        }
    }

    fn receive_thread(&self, mailbox: Receiver<TcpPacket>) {
        for pkt in mailbox.iter() {
            if !pkt.is_syn() {
                continue;
            }
            let Some(driver) = self.driver.upgrade() else { return };
            let (conn, mailbox_tx) = ConnectionSocket::new(
                Arc::clone(driver.node()),
                pkt.dst_addr,
                pkt.header.destination_port,
                pkt.src_addr,
                pkt.header.source_port,
                TcpState::Listen,
                Some(self.ready_tx.clone()),
            );
            driver.bind_connection(conn.id(), Arc::clone(&conn), mailbox_tx);
            conn.state_machine(&pkt);
        }
        debug!("listener on port {} shut down", self.port);
    }
}
