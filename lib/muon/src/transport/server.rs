use crate::buffer::Buffer;
use crate::config::{CLOSEWAIT_TIMEOUT, MAX_TRANSPORT_CONNECTIONS, RECEIVE_BUF_SIZE, RECVBUF_POLLING_INTERVAL};
use crate::seg::{SegType, Segment};
use crate::transport::link::{SegmentRx, SegmentTx};
use crate::transport::{TransportError, TransportResult};
use crate::NodeId;
use argon::logging::{self, Logger};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::thread::JoinHandle;

pub type SockId = usize;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ServerState {
    Closed,
    Listening,
    Connected,
    CloseWait,
}

/// Connection state guarded by the TCB state lock.
struct Conn {
    state: ServerState,
    client_port: Option<u16>,
    expected_seq: u32,
}

/// Server-side transmission control block. The state lock and its condvar
/// wake `accept`; the inbox lock and its condvar wake `recv`. Lock order:
/// state before inbox, never the other way.
struct ServerTcb {
    server_port: u16,
    conn: Mutex<Conn>,
    signal: Condvar,
    inbox: Mutex<Buffer>,
    inbox_signal: Condvar,
}

struct ServerCore {
    tx: SegmentTx,
    tcbs: Mutex<Vec<Option<Arc<ServerTcb>>>>,
    running: AtomicBool,
    log: Logger,
}

/// The server endpoint of the SRT transport. A single dispatcher thread
/// reads the segment link and drives every TCB: connection acceptance,
/// in-order data admission with cumulative acknowledgement, and teardown
/// through the CloseWait timer.
pub struct SrtServer {
    core: Arc<ServerCore>,
    dispatcher: Option<JoinHandle<()>>,
}

impl SrtServer {
    pub fn new<'a, L: Into<Option<&'a Logger>>>(tx: SegmentTx, rx: SegmentRx, log: L) -> SrtServer {
        let core = Arc::new(ServerCore {
            tx,
            tcbs: Mutex::new(Vec::new()),
            running: AtomicBool::new(true),
            log: logging::child(log),
        });

        let dispatcher_core = core.clone();
        let dispatcher = thread::spawn(move || ServerCore::dispatch_loop(&dispatcher_core, rx));

        SrtServer {
            core,
            dispatcher: Some(dispatcher),
        }
    }

    /// Allocates a TCB for `server_port` in Closed state, with a fresh
    /// receive buffer of `RECEIVE_BUF_SIZE` bytes.
    pub fn sock(&self, server_port: u16) -> TransportResult<SockId> {
        let mut tcbs = self.core.tcbs.lock().expect("tcb table lock poisoned");

        if tcbs
            .iter()
            .flatten()
            .any(|tcb| tcb.server_port == server_port)
        {
            return Err(TransportError::SockHandle);
        }

        let tcb = Arc::new(ServerTcb {
            server_port,
            conn: Mutex::new(Conn {
                state: ServerState::Closed,
                client_port: None,
                expected_seq: 0,
            }),
            signal: Condvar::new(),
            inbox: Mutex::new(Buffer::new(RECEIVE_BUF_SIZE)),
            inbox_signal: Condvar::new(),
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

    /// Moves the TCB to Listening and blocks until a client's SYN has
    /// promoted it to Connected. Requires Closed.
    pub fn accept(&self, sock: SockId) -> TransportResult<()> {
        let tcb = self.core.tcb(sock)?;
        let mut conn = tcb.conn.lock().expect("tcb state lock poisoned");

        if conn.state != ServerState::Closed {
            return Err(TransportError::ProtocolState);
        }

        conn.state = ServerState::Listening;

        logging::debug!(self.core.log, "listening";
                        "context" => "accept",
                        "server_port" => tcb.server_port);

        while conn.state != ServerState::Connected {
            conn = tcb
                .signal
                .wait(conn)
                .expect("tcb state lock poisoned");
        }

        Ok(())
    }

    /// Blocks until `buf.len()` in-order bytes are available, then copies
    /// them out and compacts the receive buffer. Readable while Connected
    /// or CloseWait.
    pub fn recv(&self, sock: SockId, buf: &mut [u8]) -> TransportResult<()> {
        let tcb = self.core.tcb(sock)?;

        loop {
            let state = tcb.conn.lock().expect("tcb state lock poisoned").state;
            match state {
                ServerState::Connected | ServerState::CloseWait => (),
                _ => return Err(TransportError::ProtocolState),
            }

            let mut inbox = tcb.inbox.lock().expect("receive buffer lock poisoned");

            if inbox.drain_into(buf) {
                return Ok(());
            }

            let (guard, _) = tcb
                .inbox_signal
                .wait_timeout(inbox, RECVBUF_POLLING_INTERVAL)
                .expect("receive buffer lock poisoned");
            drop(guard);
        }
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
        if state != ServerState::Closed {
            return Err(TransportError::ProtocolState);
        }

        tcbs[sock] = None;
        Ok(())
    }

    /// Current connection state, for the teardown tests.
    #[cfg(test)]
    pub(crate) fn state(&self, sock: SockId) -> TransportResult<ServerState> {
        let tcb = self.core.tcb(sock)?;
        let state = tcb.conn.lock().expect("tcb state lock poisoned").state;
        Ok(state)
    }
}

impl Drop for SrtServer {
    fn drop(&mut self) {
        self.core.running.store(false, Ordering::Relaxed);
        self.core.tx.shutdown();

        if let Some(handle) = self.dispatcher.take() {
            drop(handle.join());
        }
    }
}

impl ServerCore {
    fn tcb(&self, sock: SockId) -> TransportResult<Arc<ServerTcb>> {
        let tcbs = self.tcbs.lock().expect("tcb table lock poisoned");

        if sock >= tcbs.len() {
            return Err(TransportError::SockHandle);
        }

        tcbs[sock].clone().ok_or(TransportError::SockHandle)
    }

    /// Lookup by the full port pair.
    fn find_pair(&self, client_port: u16, server_port: u16) -> Option<Arc<ServerTcb>> {
        self.tcbs
            .lock()
            .expect("tcb table lock poisoned")
            .iter()
            .flatten()
            .find(|tcb| {
                tcb.server_port == server_port
                    && tcb
                        .conn
                        .lock()
                        .expect("tcb state lock poisoned")
                        .client_port
                        == Some(client_port)
            })
            .cloned()
    }

    /// Lookup by server port alone.
    fn find_port(&self, server_port: u16) -> Option<Arc<ServerTcb>> {
        self.tcbs
            .lock()
            .expect("tcb table lock poisoned")
            .iter()
            .flatten()
            .find(|tcb| tcb.server_port == server_port)
            .cloned()
    }

    fn dispatch_loop(core: &Arc<ServerCore>, mut rx: SegmentRx) {
        loop {
            match rx.recv() {
                Ok((node, seg)) => Self::handle_segment(core, node, seg),
                Err(error) => {
                    if core.running.load(Ordering::Relaxed) {
                        logging::warn!(core.log, "segment link down";
                                       "context" => "dispatch",
                                       "error" => ?error);
                    }
                    break;
                }
            }
        }
    }

    fn handle_segment(core: &Arc<ServerCore>, node: NodeId, seg: Segment) {
        // A first SYN arrives before any TCB has recorded a client port, so
        // the pair lookup misses; falling back to the bare server port is
        // what lets a Listening TCB be found at all.
        let tcb = core
            .find_pair(seg.src_port, seg.dest_port)
            .or_else(|| core.find_port(seg.dest_port));

        let tcb = match tcb {
            Some(tcb) => tcb,
            None => {
                logging::debug!(core.log, "segment for unknown port";
                                "context" => "dispatch",
                                "port" => seg.dest_port);
                return;
            }
        };

        match seg.kind {
            SegType::Syn => core.handle_syn(node, &tcb, &seg),
            SegType::Data => core.handle_data(node, &tcb, &seg),
            SegType::Fin => Self::handle_fin(core, node, &tcb, &seg),
            _ => {
                logging::debug!(core.log, "unexpected segment kind at server";
                                "context" => "dispatch",
                                "kind" => ?seg.kind);
            }
        }
    }

    fn handle_syn(&self, node: NodeId, tcb: &ServerTcb, seg: &Segment) {
        let mut conn = tcb.conn.lock().expect("tcb state lock poisoned");

        match conn.state {
            ServerState::Listening => {
                conn.client_port = Some(seg.src_port);
                conn.expected_seq = seg.seq_num;
                conn.state = ServerState::Connected;
                tcb.signal.notify_all();

                logging::debug!(self.log, "connection accepted";
                                "context" => "dispatch",
                                "server_port" => tcb.server_port,
                                "client_port" => seg.src_port);

                self.reply(node, tcb, &conn, SegType::SynAck);
            }
            // A duplicate SYN means the SYNACK was lost; answer again,
            // change nothing.
            ServerState::Connected => self.reply(node, tcb, &conn, SegType::SynAck),
            _ => {
                logging::debug!(self.log, "syn ignored";
                                "context" => "dispatch",
                                "state" => ?conn.state);
            }
        }
    }

    fn handle_data(&self, node: NodeId, tcb: &ServerTcb, seg: &Segment) {
        let mut conn = tcb.conn.lock().expect("tcb state lock poisoned");

        if conn.state != ServerState::Connected {
            return;
        }

        if seg.seq_num == conn.expected_seq {
            let mut inbox = tcb.inbox.lock().expect("receive buffer lock poisoned");

            if inbox.append(&seg.data) {
                conn.expected_seq = conn.expected_seq.wrapping_add(seg.data.len() as u32);
                tcb.inbox_signal.notify_all();
            } else {
                logging::warn!(self.log, "receive buffer full, data dropped";
                               "context" => "dispatch",
                               "server_port" => tcb.server_port,
                               "seq" => seg.seq_num);
            }
        }

        // Cumulative acknowledgement, sent for accepted, out-of-order and
        // duplicate data alike.
        self.reply(node, tcb, &conn, SegType::DataAck);
    }

    fn handle_fin(core: &Arc<ServerCore>, node: NodeId, tcb_ref: &Arc<ServerTcb>, seg: &Segment) {
        let tcb = &**tcb_ref;
        let mut conn = tcb.conn.lock().expect("tcb state lock poisoned");

        match conn.state {
            ServerState::Connected => {
                conn.state = ServerState::CloseWait;
                core.reply(node, tcb, &conn, SegType::FinAck);

                logging::debug!(core.log, "close wait";
                                "context" => "dispatch",
                                "server_port" => tcb.server_port);

                let timer_core = core.clone();
                let timer_tcb = tcb_ref.clone();
                thread::spawn(move || timer_core.close_wait_timer(&timer_tcb));
            }
            // A duplicate FIN means the FINACK was lost; answer again, the
            // timer stays armed.
            ServerState::CloseWait => core.reply(node, tcb, &conn, SegType::FinAck),
            _ => {
                logging::debug!(core.log, "fin ignored";
                                "context" => "dispatch",
                                "state" => ?conn.state,
                                "seq" => seg.seq_num);
            }
        }
    }

    /// CloseWait expiry: unconditionally back to Closed, dropping whatever
    /// the application never collected.
    fn close_wait_timer(&self, tcb: &ServerTcb) {
        thread::sleep(CLOSEWAIT_TIMEOUT);

        let mut conn = tcb.conn.lock().expect("tcb state lock poisoned");
        if conn.state != ServerState::CloseWait {
            return;
        }

        conn.state = ServerState::Closed;
        conn.client_port = None;
        tcb.inbox
            .lock()
            .expect("receive buffer lock poisoned")
            .clear();
        tcb.signal.notify_all();

        logging::debug!(self.log, "connection closed";
                        "context" => "close_wait",
                        "server_port" => tcb.server_port);
    }

    fn reply(&self, node: NodeId, tcb: &ServerTcb, conn: &Conn, kind: SegType) {
        let client_port = match conn.client_port {
            Some(port) => port,
            None => return,
        };

        let ack = Segment::control(kind, tcb.server_port, client_port, 0, conn.expected_seq);

        if let Err(error) = self.tx.send(node, &ack) {
            logging::warn!(self.log, "reply send failed";
                           "context" => "dispatch",
                           "kind" => ?kind,
                           "error" => ?error);
        }
    }
}
