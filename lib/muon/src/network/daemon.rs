//! The SNP process: connects to the local ON process, broadcasts this
//! node's distance vector on a timer, dispatches incoming packets (deliver
//! up, forward on, or absorb a route update), and serves the local SRT
//! process on `NETWORK_PORT`.

use crate::config::{
    BROADCAST_NODEID, NETWORK_PORT, OVERLAY_PORT, ROUTEUPDATE_INTERVAL,
};
use crate::network::Router;
use crate::pkt::{recv_pkt, send_hop, Packet, PktType, RouteUpdate, MAX_PKT_DATA};
use crate::topology::Topology;
use crate::transport::link::{read_seg_record, write_seg_record};
use crate::NodeId;
use argon::logging::{self, Logger};
use argon::shared::{ErrorUtils, FatalKind, NetError, NetResult};
use std::io::BufReader;
use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Head start the routing plane gets before the transport side is served;
/// a few broadcast rounds are what establish the paths.
const ROUTE_SETTLE_TIME: Duration = Duration::from_secs(15);

/// Runs one SNP process until its links fail. Blocks.
pub fn run<'a, L: Into<Option<&'a Logger>>>(
    topo: &Topology,
    my_ip: Ipv4Addr,
    log: L,
) -> NetResult<()> {
    let log = logging::child(log);
    let router = Arc::new(Router::new(topo, &log));
    let my_id = router.my_node();

    logging::info!(log, "network layer starting";
                   "context" => "run",
                   "node" => my_id,
                   "nodes" => topo.node_count(),
                   "neighbors" => topo.neighbor_count());

    let overlay = TcpStream::connect((my_ip, OVERLAY_PORT))?;
    let overlay_tx = Arc::new(Mutex::new(overlay.try_clone()?));
    let overlay_rx = BufReader::new(overlay);
    let transport_conn: Arc<Mutex<Option<TcpStream>>> = Arc::new(Mutex::new(None));

    {
        let router = router.clone();
        let overlay_tx = overlay_tx.clone();
        let transport_conn = transport_conn.clone();
        let log = log.clone();
        thread::spawn(move || pkt_handler(&router, overlay_rx, &overlay_tx, &transport_conn, &log));
    }

    {
        let router = router.clone();
        let overlay_tx = overlay_tx.clone();
        let log = log.clone();
        thread::spawn(move || route_update_daemon(&router, &overlay_tx, &log));
    }

    logging::info!(log, "waiting for routes to settle"; "context" => "run");
    thread::sleep(ROUTE_SETTLE_TIME);

    serve_transport(&router, &overlay_tx, &transport_conn, &log)
}

/// Broadcasts this node's distance vector every `ROUTEUPDATE_INTERVAL`.
/// Exits when the overlay link stops taking the packets.
fn route_update_daemon(router: &Router, overlay_tx: &Mutex<TcpStream>, log: &Logger) {
    let my_id = router.my_node();

    loop {
        let update = router.build_update();
        let pkt = Packet::new(my_id, BROADCAST_NODEID, PktType::RouteUpdate, update.to_wire());

        let result = {
            let mut tx = overlay_tx.lock().expect("overlay link lock poisoned");
            send_hop(&mut *tx, BROADCAST_NODEID, &pkt)
        };

        if result.has_failed() {
            logging::warn!(log, "route update broadcast failed, daemon exiting";
                           "context" => "route_update");
            break;
        }

        logging::trace!(log, "distance vector broadcast"; "context" => "route_update");
        thread::sleep(ROUTEUPDATE_INTERVAL);
    }
}

/// Handles every packet arriving from the ON process.
fn pkt_handler(
    router: &Router,
    mut overlay_rx: BufReader<TcpStream>,
    overlay_tx: &Mutex<TcpStream>,
    transport_conn: &Mutex<Option<TcpStream>>,
    log: &Logger,
) {
    let my_id = router.my_node();

    loop {
        let pkt = match recv_pkt(&mut overlay_rx) {
            Ok(pkt) => pkt,
            Err(NetError::Fatal(FatalKind::Io(_))) => break,
            Err(error) => {
                logging::warn!(log, "unreadable packet dropped";
                               "context" => "pkt_handler",
                               "error" => ?error);
                continue;
            }
        };

        match pkt.kind {
            PktType::Snp if pkt.dest == my_id => deliver(&pkt, transport_conn, log),
            PktType::Snp => forward(router, &pkt, overlay_tx, log),
            PktType::RouteUpdate => match RouteUpdate::from_wire(&pkt.data) {
                Ok(update) => router.apply_update(pkt.src, &update),
                Err(error) => {
                    logging::warn!(log, "malformed route update dropped";
                                   "context" => "pkt_handler",
                                   "from" => pkt.src,
                                   "error" => ?error);
                }
            },
        }
    }

    logging::warn!(log, "overlay link down"; "context" => "pkt_handler");
}

/// Destination reached: hand the carried segment up to the SRT process.
fn deliver(pkt: &Packet, transport_conn: &Mutex<Option<TcpStream>>, log: &Logger) {
    let mut conn = transport_conn.lock().expect("transport link lock poisoned");

    match conn.as_mut() {
        Some(transport) => {
            if write_seg_record(transport, pkt.src, &pkt.data).has_failed() {
                logging::warn!(log, "segment delivery to transport failed";
                               "context" => "deliver",
                               "src" => pkt.src);
            }
        }
        None => {
            logging::debug!(log, "no transport attached, segment dropped";
                            "context" => "deliver",
                            "src" => pkt.src);
        }
    }
}

/// In transit: consult the routing table and pass the packet along, or
/// drop it when no route is known.
fn forward(router: &Router, pkt: &Packet, overlay_tx: &Mutex<TcpStream>, log: &Logger) {
    let next = match router.next_hop(pkt.dest) {
        Some(next) => next,
        None => {
            logging::warn!(log, "no route to destination, packet dropped";
                           "context" => "forward",
                           "dest" => pkt.dest);
            return;
        }
    };

    let mut tx = overlay_tx.lock().expect("overlay link lock poisoned");
    if send_hop(&mut *tx, next, pkt).has_failed() {
        logging::warn!(log, "forward failed";
                       "context" => "forward",
                       "dest" => pkt.dest,
                       "next" => next);
    }
}

/// Serves one SRT process at a time on `NETWORK_PORT`: every `{dest,
/// segment}` record it sends becomes an SNP packet on its way to the next
/// hop. Goes back to listening when the SRT process disconnects.
fn serve_transport(
    router: &Router,
    overlay_tx: &Mutex<TcpStream>,
    transport_conn: &Mutex<Option<TcpStream>>,
    log: &Logger,
) -> NetResult<()> {
    let my_id = router.my_node();
    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, NETWORK_PORT))?;

    loop {
        logging::info!(log, "waiting for transport process"; "context" => "serve_transport");
        let (stream, _) = listener.accept()?;

        *transport_conn.lock().expect("transport link lock poisoned") = Some(stream.try_clone()?);
        let mut reader = BufReader::new(stream);

        loop {
            let (dest, seg_wire) = match read_seg_record(&mut reader) {
                Ok(record) => record,
                Err(NetError::Fatal(FatalKind::Io(_))) => break,
                Err(error) => {
                    logging::warn!(log, "unreadable record from transport dropped";
                                   "context" => "serve_transport",
                                   "error" => ?error);
                    continue;
                }
            };

            if seg_wire.len() > MAX_PKT_DATA {
                logging::warn!(log, "oversized segment from transport dropped";
                               "context" => "serve_transport",
                               "len" => seg_wire.len());
                continue;
            }

            send_out(router, my_id, dest, seg_wire, overlay_tx, log);
        }

        *transport_conn.lock().expect("transport link lock poisoned") = None;
        logging::info!(log, "transport process detached"; "context" => "serve_transport");
    }
}

fn send_out(
    router: &Router,
    my_id: NodeId,
    dest: NodeId,
    seg_wire: Vec<u8>,
    overlay_tx: &Mutex<TcpStream>,
    log: &Logger,
) {
    let pkt = Packet::new(my_id, dest, PktType::Snp, seg_wire);
    forward(router, &pkt, overlay_tx, log);
}
