use crate::config::{
    DATA_TIMEOUT, FIN_MAX_RETRY, FIN_TIMEOUT, GBN_WINDOW, MAX_SEG_LEN, MAX_TRANSPORT_CONNECTIONS,
    SENDBUF_POLLING_INTERVAL, SYN_MAX_RETRY, SYN_TIMEOUT,
};
use crate::seg::{SegType, Segment};
use crate::transport::link::{SegmentRx, SegmentTx};
use crate::transport::{TransportError, TransportResult};
use crate::NodeId;
use argon::logging::{self, Logger};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

pub type SockId = usize;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ClientState {
    Closed,
    SynSent,
    Connected,
    FinWait,
}

/// One queued segment and the time of its last transmission. `None` until
/// the window pump first puts it on the wire.
struct SendEntry {
    seg: Segment,
    sent_time: Option<Instant>,
}

/// The Go-Back-N send queue. The front is the oldest unacked segment;
/// entries `[0, unsent)` are in flight, entries from `unsent` on are queued
/// but never transmitted. The in-flight count is therefore `unsent`, and the
/// window bound is `unsent <= GBN_WINDOW`.
struct SendQueue {
    segs: VecDeque<SendEntry>,
    unsent: usize,
}

impl SendQueue {
    #[inline]
    fn new() -> SendQueue {
        SendQueue {
            segs: VecDeque::new(),
            unsent: 0,
        }
    }

    #[inline]
    fn unacked(&self) -> usize {
        self.unsent
    }

    #[inline]
    fn clear(&mut self) {
        self.segs.clear();
        self.unsent = 0;
    }
}

/// Connection state guarded by the TCB state lock.
struct Conn {
    state: ClientState,
    server_port: Option<u16>,
    next_seq: u32,
}

/// Client-side transmission control block. The state lock and its condvar
/// carry the SYN/FIN rendezvous; the queue lock serializes the window pump,
/// the retransmit monitor and ACK-driven pops. Lock order: state before
/// queue, never the other way.
struct ClientTcb {
    client_port: u16,
    conn: Mutex<Conn>,
    signal: Condvar,
    queue: Mutex<SendQueue>,
}

struct ClientCore {
    peer: NodeId,
    tx: SegmentTx,
    tcbs: Mutex<Vec<Option<Arc<ClientTcb>>>>,
    running: AtomicBool,
    log: Logger,
}

/// The client endpoint of the SRT transport. Owns the dispatcher thread
/// reading the segment link and the retransmit monitor that fires the
/// cumulative Go-Back-N timer of every connection.
pub struct SrtClient {
    core: Arc<ClientCore>,
    dispatcher: Option<JoinHandle<()>>,
    monitor: Option<JoinHandle<()>>,
}

impl SrtClient {
    /// All connections of this endpoint terminate at `peer`.
    pub fn new<'a, L: Into<Option<&'a Logger>>>(
        tx: SegmentTx,
        rx: SegmentRx,
        peer: NodeId,
        log: L,
    ) -> SrtClient {
        let core = Arc::new(ClientCore {
            peer,
            tx,
            tcbs: Mutex::new(Vec::new()),
            running: AtomicBool::new(true),
            log: logging::child(log),
        });

        let dispatcher_core = core.clone();
        let dispatcher = thread::spawn(move || dispatcher_core.dispatch_loop(rx));

        let monitor_core = core.clone();
        let monitor = thread::spawn(move || monitor_core.monitor_loop());

        SrtClient {
            core,
            dispatcher: Some(dispatcher),
            monitor: Some(monitor),
        }
    }

    /// Allocates a TCB for `client_port` in Closed state.
    pub fn sock(&self, client_port: u16) -> TransportResult<SockId> {
        let mut tcbs = self.core.tcbs.lock().expect("tcb table lock poisoned");

        if tcbs
            .iter()
            .flatten()
            .any(|tcb| tcb.client_port == client_port)
        {
            return Err(TransportError::SockHandle);
        }

        let tcb = Arc::new(ClientTcb {
            client_port,
            conn: Mutex::new(Conn {
                state: ClientState::Closed,
                server_port: None,
                next_seq: 0,
            }),
            signal: Condvar::new(),
            queue: Mutex::new(SendQueue::new()),
        });

        match tcbs.iter().position(Option::is_none) {
            Some(slot) => {
                tcbs[slot] = Some(tcb);
                Ok(slot)
            }
            None if tcbs.len() < MAX_TRANSPORT_CONNECTIONS => {
                tcbs.push(Some(tcb));
                Ok(tcbs.len() - 1)
            }
            None => Err(TransportError::SockHandle),
        }
    }

    /// Performs the SYN handshake toward `server_port`. Requires Closed.
    pub fn connect(&self, sock: SockId, server_port: u16) -> TransportResult<()> {
        let tcb = self.core.tcb(sock)?;
        let mut conn = tcb.conn.lock().expect("tcb state lock poisoned");

        if conn.state != ClientState::Closed {
            return Err(TransportError::ProtocolState);
        }

        conn.server_port = Some(server_port);
        conn.state = ClientState::SynSent;

        let syn = Segment::control(SegType::Syn, tcb.client_port, server_port, conn.next_seq, 0);

        logging::debug!(self.core.log, "connecting";
                        "context" => "connect",
                        "client_port" => tcb.client_port,
                        "server_port" => server_port);

        self.core
            .handshake(&tcb, conn, syn, ClientState::Connected, SYN_TIMEOUT, SYN_MAX_RETRY)
    }

    /// Segments `buf` and queues it behind the window. Requires Connected.
    pub fn send(&self, sock: SockId, buf: &[u8]) -> TransportResult<()> {
        let tcb = self.core.tcb(sock)?;
        let mut conn = tcb.conn.lock().expect("tcb state lock poisoned");

        if conn.state != ClientState::Connected {
            return Err(TransportError::ProtocolState);
        }

        let server_port = conn.server_port.expect("connected tcb without server port");
        let mut queue = tcb.queue.lock().expect("send queue lock poisoned");

        for chunk in buf.chunks(MAX_SEG_LEN) {
            let seg = Segment::data(tcb.client_port, server_port, conn.next_seq, chunk.to_vec());
            conn.next_seq = conn.next_seq.wrapping_add(chunk.len() as u32);
            queue.segs.push_back(SendEntry {
                seg,
                sent_time: None,
            });
        }

        self.core.pump(&mut queue);
        Ok(())
    }

    /// Performs the FIN teardown. Requires Connected; ends Closed whether
    /// the FINACK arrived or the retries ran out, and the send queue is
    /// drained either way.
    pub fn disconnect(&self, sock: SockId) -> TransportResult<()> {
        let tcb = self.core.tcb(sock)?;
        let mut conn = tcb.conn.lock().expect("tcb state lock poisoned");

        if conn.state != ClientState::Connected {
            return Err(TransportError::ProtocolState);
        }

        let server_port = conn.server_port.expect("connected tcb without server port");
        conn.state = ClientState::FinWait;

        let fin = Segment::control(SegType::Fin, tcb.client_port, server_port, conn.next_seq, 0);

        logging::debug!(self.core.log, "disconnecting";
                        "context" => "disconnect",
                        "client_port" => tcb.client_port,
                        "server_port" => server_port);

        let result = self
            .core
            .handshake(&tcb, conn, fin, ClientState::Closed, FIN_TIMEOUT, FIN_MAX_RETRY);

        tcb.queue.lock().expect("send queue lock poisoned").clear();
        result
    }

    /// Destroys the TCB. Fails without side effect unless it is Closed.
    pub fn close(&self, sock: SockId) -> TransportResult<()> {
        let mut tcbs = self.core.tcbs.lock().expect("tcb table lock poisoned");

        if sock >= tcbs.len() {
            return Err(TransportError::SockHandle);
        }

        let tcb = match &tcbs[sock] {
            Some(tcb) => tcb,
            None => return Err(TransportError::SockHandle),
        };

        let state = tcb.conn.lock().expect("tcb state lock poisoned").state;
        if state != ClientState::Closed {
            return Err(TransportError::ProtocolState);
        }

        tcbs[sock] = None;
        Ok(())
    }

    /// In-flight segment count, for the window tests.
    #[cfg(test)]
    pub(crate) fn unacked(&self, sock: SockId) -> TransportResult<usize> {
        let tcb = self.core.tcb(sock)?;
        let queue = tcb.queue.lock().expect("send queue lock poisoned");
        Ok(queue.unacked())
    }
}

impl Drop for SrtClient {
    fn drop(&mut self) {
        self.core.running.store(false, Ordering::Relaxed);
        self.core.tx.shutdown();

        if let Some(handle) = self.dispatcher.take() {
            drop(handle.join());
        }
        if let Some(handle) = self.monitor.take() {
            drop(handle.join());
        }
    }
}

impl ClientCore {
    fn tcb(&self, sock: SockId) -> TransportResult<Arc<ClientTcb>> {
        let tcbs = self.tcbs.lock().expect("tcb table lock poisoned");

        if sock >= tcbs.len() {
            return Err(TransportError::SockHandle);
        }

        tcbs[sock].clone().ok_or(TransportError::SockHandle)
    }

    fn find(&self, client_port: u16) -> Option<Arc<ClientTcb>> {
        self.tcbs
            .lock()
            .expect("tcb table lock poisoned")
            .iter()
            .flatten()
            .find(|tcb| tcb.client_port == client_port)
            .cloned()
    }

    /// Transmits while the window has room and unsent segments remain,
    /// stamping each transmission time.
    fn pump(&self, queue: &mut SendQueue) {
        while queue.unsent < queue.segs.len() && queue.unsent < GBN_WINDOW {
            let peer = self.peer;
            let entry = &mut queue.segs[queue.unsent];

            if let Err(error) = self.tx.send(peer, &entry.seg) {
                logging::warn!(self.log, "window pump send failed";
                               "context" => "pump",
                               "error" => ?error);
                break;
            }

            entry.sent_time = Some(Instant::now());
            queue.unsent += 1;
        }
    }

    /// Shared SYN/FIN rendezvous: the control segment was composed by the
    /// caller and the TCB moved to the in-between state; this sends it,
    /// then waits for the dispatcher to signal `target`, resending on every
    /// timeout until the retry budget runs out. Exhaustion forces Closed.
    fn handshake(
        &self,
        tcb: &ClientTcb,
        mut conn: MutexGuard<Conn>,
        control: Segment,
        target: ClientState,
        timeout: Duration,
        max_retry: u32,
    ) -> TransportResult<()> {
        let mut attempts: u32 = 1;

        if let Err(error) = self.tx.send(self.peer, &control) {
            conn.state = ClientState::Closed;
            return Err(error.into());
        }

        loop {
            let (guard, wait) = tcb
                .signal
                .wait_timeout(conn, timeout)
                .expect("tcb state lock poisoned");
            conn = guard;

            if conn.state == target {
                return Ok(());
            }

            if wait.timed_out() {
                if attempts >= max_retry {
                    conn.state = ClientState::Closed;

                    logging::warn!(self.log, "handshake retries exhausted";
                                   "context" => "handshake",
                                   "client_port" => tcb.client_port,
                                   "kind" => ?control.kind,
                                   "attempts" => attempts);

                    return Err(TransportError::RetryExhausted);
                }

                attempts += 1;
                if let Err(error) = self.tx.send(self.peer, &control) {
                    conn.state = ClientState::Closed;
                    return Err(error.into());
                }
            }
        }
    }

    fn dispatch_loop(&self, mut rx: SegmentRx) {
        loop {
            match rx.recv() {
                Ok((_, seg)) => self.handle_segment(seg),
                Err(error) => {
                    if self.running.load(Ordering::Relaxed) {
                        logging::warn!(self.log, "segment link down";
                                       "context" => "dispatch",
                                       "error" => ?error);
                    }
                    break;
                }
            }
        }
    }

    fn handle_segment(&self, seg: Segment) {
        let tcb = match self.find(seg.dest_port) {
            Some(tcb) => tcb,
            None => {
                logging::debug!(self.log, "segment for unknown port";
                                "context" => "dispatch",
                                "port" => seg.dest_port);
                return;
            }
        };

        match seg.kind {
            SegType::SynAck => self.handle_synack(&tcb, &seg),
            SegType::FinAck => self.handle_finack(&tcb, &seg),
            SegType::DataAck => self.handle_dataack(&tcb, &seg),
            _ => {
                logging::debug!(self.log, "unexpected segment kind at client";
                                "context" => "dispatch",
                                "kind" => ?seg.kind);
            }
        }
    }

    fn handle_synack(&self, tcb: &ClientTcb, seg: &Segment) {
        let mut conn = tcb.conn.lock().expect("tcb state lock poisoned");

        if conn.server_port == Some(seg.src_port) && conn.state == ClientState::SynSent {
            conn.state = ClientState::Connected;
            tcb.signal.notify_all();

            logging::debug!(self.log, "connected";
                            "context" => "dispatch",
                            "client_port" => tcb.client_port);
        }
    }

    fn handle_finack(&self, tcb: &ClientTcb, seg: &Segment) {
        let mut conn = tcb.conn.lock().expect("tcb state lock poisoned");

        if conn.server_port == Some(seg.src_port) && conn.state == ClientState::FinWait {
            conn.state = ClientState::Closed;
            tcb.signal.notify_all();

            logging::debug!(self.log, "closed";
                            "context" => "dispatch",
                            "client_port" => tcb.client_port);
        }
    }

    /// Cumulative acknowledgement: pops every in-flight segment below the
    /// ack number, then refills the window. Duplicate and stale ACKs fall
    /// through both steps untouched.
    fn handle_dataack(&self, tcb: &ClientTcb, seg: &Segment) {
        let mut queue = tcb.queue.lock().expect("send queue lock poisoned");

        while queue.unsent > 0
            && queue
                .segs
                .front()
                .map_or(false, |entry| entry.seg.seq_num < seg.ack_num)
        {
            queue.segs.pop_front();
            queue.unsent -= 1;
        }

        self.pump(&mut queue);
    }

    /// The retransmit monitor: one thread serving every TCB of the
    /// endpoint. When the oldest in-flight segment of a connection has aged
    /// past `DATA_TIMEOUT`, the whole in-flight span goes out again with
    /// fresh timestamps. One cumulative timer per connection, as Go-Back-N
    /// wants it.
    fn monitor_loop(&self) {
        while self.running.load(Ordering::Relaxed) {
            thread::sleep(SENDBUF_POLLING_INTERVAL);

            let tcbs: Vec<Arc<ClientTcb>> = self
                .tcbs
                .lock()
                .expect("tcb table lock poisoned")
                .iter()
                .flatten()
                .cloned()
                .collect();

            for tcb in tcbs {
                let mut queue = tcb.queue.lock().expect("send queue lock poisoned");

                let expired = queue.unsent > 0
                    && queue.segs[0]
                        .sent_time
                        .map_or(false, |sent| sent.elapsed() > DATA_TIMEOUT);

                if !expired {
                    continue;
                }

                logging::debug!(self.log, "go-back-n retransmit";
                                "context" => "monitor",
                                "client_port" => tcb.client_port,
                                "in_flight" => queue.unsent);

                for i in 0..queue.unsent {
                    let peer = self.peer;
                    let entry = &mut queue.segs[i];

                    if self.tx.send(peer, &entry.seg).is_err() {
                        break;
                    }
                    entry.sent_time = Some(Instant::now());
                }
            }
        }
    }
}
