use crate::circ_buff::CircBuff;
use crate::node::Node;
use crate::prelude::*;
use crate::retransmit::Retransmitter;
use crate::srtt::Srtt;
use crate::tcp_utils::*;
use crate::utils::*;
use log::debug;
use std::collections::VecDeque;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpState {
    Listen,
    SynSent,
    SynRcvd,
    Established,
    FinWait1,
    FinWait2,
    CloseWait,
    Closing,
    LastAck,
    TimeWait,
    Closed,
}

impl fmt::Display for TcpState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            TcpState::Listen => "LISTEN",
            TcpState::SynSent => "SYN_SENT",
            TcpState::SynRcvd => "SYN_RCVD",
            TcpState::Established => "ESTABLISHED",
            TcpState::FinWait1 => "FIN_WAIT_1",
            TcpState::FinWait2 => "FIN_WAIT_2",
            TcpState::CloseWait => "CLOSE_WAIT",
            TcpState::Closing => "CLOSING",
            TcpState::LastAck => "LAST_ACK",
            TcpState::TimeWait => "TIME_WAIT",
            TcpState::Closed => "CLOSED",
        };
        write!(f, "{name}")
    }
}

///The 4-tuple identifying a connection; listeners pin the remote half to zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId {
    pub local_addr: Ipv4Addr,
    pub local_port: u16,
    pub remote_addr: Ipv4Addr,
    pub remote_port: u16,
}

///Which half of the connection to shut down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownKind {
    Read,
    Write,
    Both,
}

///An ack is new iff it sits strictly past `curr_ack` and no further than
///`seq_num`, judged in wrapping sequence space.
pub(crate) fn ack_advances(curr_ack: u32, pkt_ack: u32, seq_num: u32) -> bool {
    let advance = pkt_ack.wrapping_sub(curr_ack);
    advance != 0 && advance <= seq_num.wrapping_sub(curr_ack)
}

///a <= b under the half-window interpretation of sequence space
pub(crate) fn seq_leq(a: u32, b: u32) -> bool {
    b.wrapping_sub(a) < (1 << 31)
}

///How much of the advertised window is still unclaimed by in-flight bytes.
///A window the in-flight data has already filled (or overrun) counts as
///closed; an ack sitting past `curr_seq` means nothing is outstanding.
pub(crate) fn window_room(win: u32, curr_seq: u32, acked: u32) -> u32 {
    let inflight = curr_seq.wrapping_sub(acked);
    if inflight >= (1 << 31) {
        win
    } else {
        win.saturating_sub(inflight)
    }
}

///A FIN sits after whatever payload rides in the same segment
fn fin_seq(pkt: &TcpPacket) -> u32 {
    pkt.header
        .sequence_number
        .wrapping_add(pkt.payload.len() as u32)
}

///One TCP connection. Three workers run per connection: the send pump drains
///the send queue under the sliding window (probing when the window closes),
///the receive pump applies inbound segments to the buffer and the state
///machine, and the retransmit worker wakes every RTO to resend the oldest
///unacked segment.
pub struct ConnectionSocket {
    pub local_addr: Ipv4Addr,
    pub local_port: u16,
    pub remote_addr: Ipv4Addr,
    pub remote_port: u16,

    state: Mutex<TcpState>,
    node: Arc<Node>,
    send_queue_tx: Sender<TcpPacket>,
    ready_conns: Option<Sender<Arc<ConnectionSocket>>>,

    sent_buffer: Mutex<VecDeque<Retransmitter>>,
    srtt: Mutex<Srtt>,

    seq_num: AtomicU32,    //next byte we'll send
    remote_win: AtomicU32, //last advertised window
    remote_ack: AtomicU32, //highest cumulative ack seen
    dup_acks: AtomicU32,

    recv_buffer: CircBuff,

    can_read: AtomicBool,
    can_write: AtomicBool,
    write_shut: AtomicBool,
    write_lock: Mutex<()>,
    write_ready: Condvar,
}

impl fmt::Debug for ConnectionSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSocket")
            .field("local_addr", &self.local_addr)
            .field("local_port", &self.local_port)
            .field("remote_addr", &self.remote_addr)
            .field("remote_port", &self.remote_port)
            .finish()
    }
}

impl ConnectionSocket {
    ///Builds a connection in the given state and starts its three workers.
    ///Returns the socket and the mailbox sender the driver delivers into.
    pub(crate) fn new(
        node: Arc<Node>,
        local_addr: Ipv4Addr,
        local_port: u16,
        remote_addr: Ipv4Addr,
        remote_port: u16,
        state: TcpState,
        ready_conns: Option<Sender<Arc<ConnectionSocket>>>,
    ) -> (Arc<ConnectionSocket>, Sender<TcpPacket>) {
        let (send_queue_tx, send_queue_rx) = channel();
        let (mailbox_tx, mailbox_rx) = channel();
        let sock = Arc::new(ConnectionSocket {
            local_addr,
            local_port,
            remote_addr,
            remote_port,
            state: Mutex::new(state),
            node,
            send_queue_tx,
            ready_conns,
            sent_buffer: Mutex::new(VecDeque::new()),
            srtt: Mutex::new(Srtt::new(
                SRTT_INITIAL_GUESS,
                SRTT_ALPHA,
                SRTT_BETA,
                SRTT_MIN,
                SRTT_MAX,
            )),
            seq_num: AtomicU32::new(rand::thread_rng().gen::<u32>()),
            remote_win: AtomicU32::new(0),
            remote_ack: AtomicU32::new(0),
            dup_acks: AtomicU32::new(0),
            recv_buffer: CircBuff::new(TCP_WINDOW_SIZE),
            can_read: AtomicBool::new(true),
            can_write: AtomicBool::new(false),
            write_shut: AtomicBool::new(false),
            write_lock: Mutex::new(()),
            write_ready: Condvar::new(),
        });
        let slf = Arc::clone(&sock);
        thread::spawn(move || slf.send_thread(send_queue_rx));
        let slf = Arc::clone(&sock);
        thread::spawn(move || slf.receive_thread(mailbox_rx));
        let slf = Arc::clone(&sock);
        thread::spawn(move || slf.retransmit_thread());
        (sock, mailbox_tx)
    }

    pub fn id(&self) -> ConnId {
        ConnId {
            local_addr: self.local_addr,
            local_port: self.local_port,
            remote_addr: self.remote_addr,
            remote_port: self.remote_port,
        }
    }

    pub fn state(&self) -> TcpState {
        *self.state.lock().unwrap()
    }

    //
    //BUILDING AND SENDING SEGMENTS
    //

    ///Stamps a segment with the current ack and window from the receive buffer
    fn new_tcp_packet(&self, payload: Vec<u8>, flags: TcpFlags, seq_num: u32) -> TcpPacket {
        let ack_num = self.recv_buffer.get_ack_num();
        let window = cmp::min(self.recv_buffer.get_window_size(), u16::MAX as u32) as u16;
        let mut header = TcpHeader::new(self.local_port, self.remote_port, seq_num, window);
        header.acknowledgment_number = ack_num;
        set_flags(&mut header, flags);
        header.checksum = header
            .calc_checksum_ipv4_raw(self.local_addr.octets(), self.remote_addr.octets(), &payload)
            .expect("segment fits the checksum length limit");
        TcpPacket {
            src_addr: self.local_addr,
            dst_addr: self.remote_addr,
            header,
            payload,
        }
    }

    fn send_raw(&self, pkt: &TcpPacket) {
        self.node
            .send(6, pkt.serialize(), DEFAULT_TTL, pkt.src_addr, pkt.dst_addr);
    }

    ///Control segment that skips the send queue and is never retransmitted
    fn send_control_msg_manually(&self, flags: TcpFlags, seq_num: u32, inc: bool) {
        let pkt = self.new_tcp_packet(Vec::new(), flags, seq_num);
        self.send_raw(&pkt);
        if inc {
            self.seq_num.fetch_add(1, Ordering::SeqCst);
        }
    }

    ///Control segment routed through the send pump like data
    fn send_control_msg(&self, flags: TcpFlags, inc: bool) {
        let pkt = self.new_tcp_packet(Vec::new(), flags, self.seq_num.load(Ordering::SeqCst));
        let _ = self.send_queue_tx.send(pkt);
        if inc {
            self.seq_num.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn send_ack(&self) {
        let pkt = self.new_tcp_packet(Vec::new(), F_ACK, self.seq_num.load(Ordering::SeqCst));
        self.send_raw(&pkt);
    }

    fn initiate_rto(&self, pkt: TcpPacket) {
        self.sent_buffer
            .lock()
            .unwrap()
            .push_back(Retransmitter::new(pkt));
    }

    //
    //ACTIVE OPEN
    //

    ///Sends the opening SYN and retries it every interval until the state
    ///machine moves us off SYN_SENT, giving up after the last retry.
    pub(crate) fn start_handshake(&self) -> Result<()> {
        let seq = self.seq_num.load(Ordering::SeqCst);
        self.send_control_msg_manually(F_SYN, seq, true);
        let mut tries = 1;
        while tries <= TCP_MAX_RETRIES {
            thread::sleep(TCP_SYN_TIMEOUT_DURATION);
            {
                let state = self.state.lock().unwrap();
                if *state != TcpState::SynSent {
                    return Ok(());
                }
            }
            tries += 1;
            self.send_control_msg_manually(F_SYN, seq, false);
        }
        Err(Error::new(ErrorKind::TimedOut, "syn timeout"))
    }

    ///Passive-side SYN|ACK retry, alive only while the state stays SYN_RCVD
    fn syn_ack_retry(&self, seq: u32) {
        let mut tries = 1;
        while tries <= TCP_MAX_RETRIES {
            thread::sleep(TCP_SYN_TIMEOUT_DURATION);
            {
                let state = self.state.lock().unwrap();
                if *state != TcpState::SynRcvd {
                    return;
                }
            }
            tries += 1;
            self.send_control_msg_manually(F_SYN | F_ACK, seq, false);
        }
        debug!("syn|ack retries exhausted for {}:{}", self.remote_addr, self.remote_port);
    }

    //
    //PER-CONNECTION WORKERS
    //

    ///Sliding-window transmit. Each queued segment ships immediately if the
    ///advertised window has room past what is already in flight; otherwise we
    ///probe with single bytes until the window reopens and then ship whatever
    ///fits. Control segments (no payload) bypass the window check.
    fn send_thread(self: Arc<Self>, send_queue: Receiver<TcpPacket>) {
        for pkt in send_queue.iter() {
            let to_send = pkt.payload.len() as u32;
            if to_send == 0 {
                self.send_raw(&pkt);
                self.initiate_rto(pkt);
                continue;
            }
            let mut curr_seq = pkt.header.sequence_number;
            let last_acked = self.remote_ack.load(Ordering::SeqCst);
            let last_win = self.remote_win.load(Ordering::SeqCst);
            let available = window_room(last_win, curr_seq, last_acked);
            if available <= to_send {
                let mut zwp_sent: u32 = 0;
                while zwp_sent < to_send {
                    //One byte to coax a window update out of them
                    let probe =
                        self.new_tcp_packet(vec![pkt.payload[zwp_sent as usize]], F_ACK, curr_seq);
                    self.send_raw(&probe);
                    thread::sleep(TCP_ZWP_UPDATE_DURATION);
                    let acked = self.remote_ack.load(Ordering::SeqCst);
                    let win = self.remote_win.load(Ordering::SeqCst);
                    let room = window_room(win, curr_seq, acked);
                    let can_send = cmp::min(room, to_send - zwp_sent);
                    if can_send > 0 {
                        //The probe byte counted; a fragment carries any rest
                        if can_send > 1 {
                            let frag = self.new_tcp_packet(
                                pkt.payload
                                    [(zwp_sent + 1) as usize..(zwp_sent + can_send) as usize]
                                    .to_vec(),
                                F_ACK,
                                curr_seq.wrapping_add(1),
                            );
                            self.send_raw(&frag);
                            self.initiate_rto(frag);
                        }
                        curr_seq = curr_seq.wrapping_add(can_send);
                        zwp_sent += can_send;
                    }
                    thread::sleep(TCP_ZWP_WAIT_DURATION);
                }
            } else {
                self.send_raw(&pkt);
                self.initiate_rto(pkt);
            }
        }
    }

    ///Single consumer of the mailbox: data lands in the receive buffer and is
    ///acked, then the segment drives the state machine, in arrival order.
    fn receive_thread(self: Arc<Self>, mailbox: Receiver<TcpPacket>) {
        for pkt in mailbox.iter() {
            if !pkt.payload.is_empty() {
                self.recv_buffer
                    .push_data(pkt.header.sequence_number, &pkt.payload);
                self.send_ack();
            }
            self.state_machine(&pkt);
            if *self.state.lock().unwrap() == TcpState::Closed {
                break;
            }
        }
    }

    ///Wakes every RTO, drops acked segments off the head of the sent queue,
    ///and resends the first unacked one, rotating it to the tail.
    fn retransmit_thread(self: Arc<Self>) {
        loop {
            let rto = self.srtt.lock().unwrap().get_rto();
            let rto = if rto.is_zero() { DEFAULT_RTO } else { rto };
            thread::sleep(rto);
            {
                let mut sent = self.sent_buffer.lock().unwrap();
                while let Some(mut rt) = sent.pop_front() {
                    if rt.acked {
                        continue;
                    }
                    rt.execute(&self.node);
                    rt.retried += 1;
                    sent.push_back(rt);
                    break;
                }
            }
            if *self.state.lock().unwrap() == TcpState::Closed
                && self.sent_buffer.lock().unwrap().is_empty()
            {
                break;
            }
        }
    }

    //
    //THE STATE MACHINE
    //

    ///Every inbound segment first updates the ack/window bookkeeping, retires
    ///covered retransmitters, counts duplicate acks (third one triggers fast
    ///retransmit), and only then drives the per-state transition.
    pub(crate) fn state_machine(self: &Arc<Self>, pkt: &TcpPacket) {
        let curr_ack = self.remote_ack.load(Ordering::SeqCst);
        let seq_num = self.seq_num.load(Ordering::SeqCst);
        let pkt_ack = pkt.header.acknowledgment_number;
        let pkt_win = pkt.header.window_size as u32;

        if pkt.is_rst() {
            *self.state.lock().unwrap() = TcpState::Closed;
            let _guard = self.write_lock.lock().unwrap();
            self.write_shut.store(true, Ordering::SeqCst);
            self.write_ready.notify_all();
            return;
        }

        if curr_ack == 0 || ack_advances(curr_ack, pkt_ack, seq_num) {
            self.remote_ack.store(pkt_ack, Ordering::SeqCst);
            self.remote_win.store(pkt_win, Ordering::SeqCst);
            self.dup_acks.store(0, Ordering::SeqCst);
        }
        {
            let mut sent = self.sent_buffer.lock().unwrap();
            for rt in sent.iter_mut() {
                if !rt.acked && seq_leq(rt.end_seq(), pkt_ack) {
                    rt.acked = true;
                    if rt.retried == 0 {
                        //Only unambiguous samples feed the estimator
                        self.srtt
                            .lock()
                            .unwrap()
                            .add_point(rt.sent.elapsed().as_nanos() as f64);
                    }
                }
            }
        }
        if pkt_ack == curr_ack {
            self.dup_acks.fetch_add(1, Ordering::SeqCst);
            //Duplicate acks still carry window updates (persist probes)
            if pkt_win > self.remote_win.load(Ordering::SeqCst) {
                self.remote_win.store(pkt_win, Ordering::SeqCst);
            }
        }
        if self.dup_acks.load(Ordering::SeqCst) == 3 {
            self.dup_acks.fetch_add(1, Ordering::SeqCst);
            let mut sent = self.sent_buffer.lock().unwrap();
            for rt in sent.iter_mut() {
                if pkt_ack == rt.first_seq {
                    debug!("fast retransmit of seq {pkt_ack}");
                    rt.execute(&self.node);
                    break;
                }
            }
        }

        let mut state = self.state.lock().unwrap();
        match *state {
            TcpState::Listen => {
                if pkt.is_syn() {
                    self.recv_buffer
                        .prime(pkt.header.sequence_number.wrapping_add(1));
                    *state = TcpState::SynRcvd;
                    let seq = self.seq_num.load(Ordering::SeqCst);
                    self.send_control_msg_manually(F_SYN | F_ACK, seq, true);
                    let slf = Arc::clone(self);
                    thread::spawn(move || slf.syn_ack_retry(seq));
                }
            }
            TcpState::SynRcvd => {
                if pkt.is_ack() && self.all_acked(pkt) {
                    *state = TcpState::Established;
                    self.open_for_writing();
                    if let Some(ready) = &self.ready_conns {
                        let _ = ready.send(Arc::clone(self));
                    }
                }
            }
            TcpState::SynSent => {
                if pkt.is_syn() && pkt.is_ack() && self.all_acked(pkt) {
                    self.recv_buffer
                        .prime(pkt.header.sequence_number.wrapping_add(1));
                    self.send_ack();
                    *state = TcpState::Established;
                    self.open_for_writing();
                    if let Some(ready) = &self.ready_conns {
                        let _ = ready.send(Arc::clone(self));
                    }
                } else if pkt.is_syn() && !pkt.is_ack() {
                    //Simultaneous open
                    self.recv_buffer
                        .prime(pkt.header.sequence_number.wrapping_add(1));
                    self.send_ack();
                    *state = TcpState::SynRcvd;
                } else {
                    debug!("unexpected flags {:#x} in SYN_SENT", pkt.flags());
                }
            }
            TcpState::Established => {
                if pkt.is_fin() {
                    self.recv_buffer.set_fin(fin_seq(pkt));
                    self.send_ack();
                    *state = TcpState::CloseWait;
                }
            }
            TcpState::FinWait1 => {
                if pkt.is_fin() {
                    self.recv_buffer.set_fin(fin_seq(pkt));
                    *state = TcpState::Closing;
                } else if pkt.is_ack() && self.all_acked(pkt) {
                    *state = TcpState::FinWait2;
                }
            }
            TcpState::FinWait2 => {
                if pkt.is_fin() {
                    self.recv_buffer.set_fin(fin_seq(pkt));
                    self.send_ack();
                    *state = TcpState::TimeWait;
                    self.start_time_wait_timer();
                }
            }
            TcpState::CloseWait => {} //Waiting on the application to close
            TcpState::Closing => {
                if pkt.is_ack() && self.all_acked(pkt) {
                    *state = TcpState::TimeWait;
                    self.start_time_wait_timer();
                }
            }
            TcpState::LastAck => {
                if pkt.is_ack() && self.all_acked(pkt) {
                    *state = TcpState::Closed;
                }
            }
            TcpState::TimeWait => {
                //Their FIN retransmission means our ack got lost; repeat it
                if pkt.is_fin() {
                    self.send_ack();
                }
            }
            TcpState::Closed => {}
        }
    }

    fn all_acked(&self, pkt: &TcpPacket) -> bool {
        pkt.header.acknowledgment_number == self.seq_num.load(Ordering::SeqCst)
    }

    fn open_for_writing(&self) {
        let _guard = self.write_lock.lock().unwrap();
        self.can_write.store(true, Ordering::SeqCst);
        self.write_ready.notify_all();
    }

    fn start_time_wait_timer(self: &Arc<Self>) {
        let slf = Arc::clone(self);
        thread::spawn(move || {
            thread::sleep(TCP_TIME_WAIT_DURATION);
            let mut state = slf.state.lock().unwrap();
            if *state == TcpState::TimeWait {
                *state = TcpState::Closed;
            }
        });
    }

    //
    //THE APPLICATION API
    //

    ///Reads up to `n` bytes. Without `block`, returns immediately with
    ///whatever is ready, possibly nothing; with `block`, keeps pulling until
    ///`n` bytes have accumulated or the stream ends. A shut-down read half
    ///refuses outright.
    pub fn read(&self, n: u32, block: bool) -> Result<Vec<u8>> {
        if !self.can_read.load(Ordering::SeqCst) {
            return Err(Error::new(
                ErrorKind::PermissionDenied,
                "operation not permitted",
            ));
        }
        if !block {
            return self.recv_buffer.try_pull_data(n);
        }
        let mut data = Vec::new();
        while (data.len() as u32) < n {
            match self.recv_buffer.pull_data(n - data.len() as u32) {
                Ok(chunk) => data.extend_from_slice(&chunk),
                Err(e) => {
                    if data.is_empty() {
                        return Err(e);
                    }
                    break;
                }
            }
        }
        Ok(data)
    }

    ///Writes the whole buffer, blocking until the connection can carry data.
    ///Bytes are chunked into segments and handed to the send pump in order.
    pub fn write(&self, buf: &[u8]) -> Result<u32> {
        let len = buf.len() as u32;
        let mut written: u32 = 0;
        while written < len {
            {
                let mut guard = self.write_lock.lock().unwrap();
                while !self.can_write.load(Ordering::SeqCst) {
                    if self.write_shut.load(Ordering::SeqCst) {
                        return Err(Error::new(
                            ErrorKind::PermissionDenied,
                            "socket is shut down for writing",
                        ));
                    }
                    guard = self.write_ready.wait(guard).unwrap();
                }
                if self.write_shut.load(Ordering::SeqCst) {
                    return Err(Error::new(
                        ErrorKind::PermissionDenied,
                        "socket is shut down for writing",
                    ));
                }
                let to_write = cmp::min(len - written, MAX_PACKET_SIZE);
                let pkt = self.new_tcp_packet(
                    buf[written as usize..(written + to_write) as usize].to_vec(),
                    F_ACK,
                    self.seq_num.load(Ordering::SeqCst),
                );
                let _ = self.send_queue_tx.send(pkt);
                self.seq_num.fetch_add(to_write, Ordering::SeqCst);
                written += to_write;
            }
        }
        Ok(written)
    }

    ///The application close path. Where we go depends on where we are.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        match *state {
            TcpState::Established | TcpState::SynRcvd => {
                self.send_control_msg(F_ACK | F_FIN, true);
                *state = TcpState::FinWait1;
            }
            TcpState::CloseWait => {
                self.send_control_msg(F_ACK | F_FIN, true);
                *state = TcpState::LastAck;
            }
            TcpState::SynSent => {
                *state = TcpState::Closed;
            }
            _ => {} //Nobody thinks this connection is open, or close already ran
        }
    }

    pub fn shutdown(&self, kind: ShutdownKind) {
        if matches!(kind, ShutdownKind::Write | ShutdownKind::Both) {
            let _guard = self.write_lock.lock().unwrap();
            self.write_shut.store(true, Ordering::SeqCst);
            self.write_ready.notify_all();
        }
        if matches!(kind, ShutdownKind::Read | ShutdownKind::Both) {
            self.can_read.store(false, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_acks_advance_within_the_window() {
        assert!(ack_advances(100, 150, 200));
        assert!(ack_advances(100, 200, 200));
        assert!(!ack_advances(100, 100, 200)); //duplicate
        assert!(!ack_advances(100, 250, 200)); //past what we sent
        assert!(!ack_advances(100, 50, 200)); //stale
    }

    #[test]
    fn ack_window_survives_sequence_wrap() {
        let curr = u32::MAX - 10;
        let seq = curr.wrapping_add(20);
        assert!(ack_advances(curr, curr.wrapping_add(5), seq));
        assert!(ack_advances(curr, 5, seq)); //wrapped past zero
        assert!(ack_advances(curr, seq, seq));
        assert!(!ack_advances(curr, seq.wrapping_add(1), seq));
        assert!(!ack_advances(curr, curr, seq));
    }

    #[test]
    fn half_window_ordering() {
        assert!(seq_leq(5, 10));
        assert!(seq_leq(10, 10));
        assert!(!seq_leq(10, 5));
        assert!(seq_leq(u32::MAX - 5, 10)); //wrap
        assert!(!seq_leq(10, u32::MAX - 5));
    }

    #[test]
    fn window_room_clamps_at_a_full_window() {
        assert_eq!(window_room(1000, 500, 100), 600);
        assert_eq!(window_room(1000, 1100, 100), 0); //exactly full
        assert_eq!(window_room(1000, 5000, 100), 0); //overrun, not underflow
        assert_eq!(window_room(0, 100, 100), 0);
    }

    #[test]
    fn window_room_survives_sequence_wrap() {
        let acked = u32::MAX - 10;
        assert_eq!(window_room(1000, acked.wrapping_add(500), acked), 500);
        assert_eq!(window_room(100, acked.wrapping_add(500), acked), 0);
        //An ack beyond curr_seq (the probe byte got covered) leaves the
        //whole window open
        assert_eq!(window_room(1000, 100, 101), 1000);
    }
}
