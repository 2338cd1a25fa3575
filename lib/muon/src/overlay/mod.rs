//! The ON process engine: the TCP mesh that emulates physical links. It
//! connects to every neighbor with a smaller node ID and accepts from every
//! neighbor with a larger one, which is what keeps two nodes from dialing
//! each other twice. Per-neighbor reader threads hand incoming packets to
//! the local SNP process; the local SNP process hands `{next_hop, packet}`
//! records back for dispatch into the mesh.

pub mod neighbortable;

use crate::config::{BROADCAST_NODEID, CONNECTION_PORT, OVERLAY_PORT};
use crate::pkt::{recv_hop, recv_pkt, send_pkt};
use crate::topology::{node_id_of, Topology};
use argon::logging::{self, Logger};
use argon::shared::{ErrorUtils, FatalKind, NetError, NetResult};
use neighbortable::NeighborTable;
use std::io::BufReader;
use std::net::{IpAddr, Ipv4Addr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// How long and how often to keep redialing a neighbor that has not come
/// up yet.
const CONNECT_RETRY_INTERVAL: Duration = Duration::from_secs(1);
const CONNECT_RETRY_LIMIT: u32 = 60;

/// Runs one ON process until its listening sockets fail. Blocks.
pub fn run<'a, L: Into<Option<&'a Logger>>>(topo: &Topology, log: L) -> NetResult<()> {
    let log = logging::child(log);
    let my_id = topo.my_node();
    let nt = Arc::new(NeighborTable::new(topo)?);
    let snp_conn: Arc<Mutex<Option<TcpStream>>> = Arc::new(Mutex::new(None));

    logging::info!(log, "overlay node initializing";
                   "context" => "run",
                   "node" => my_id,
                   "neighbors" => nt.len());

    // Neighbors with larger IDs dial us; start waiting for them before we
    // dial the smaller ones.
    let greater = nt.iter().filter(|entry| entry.id > my_id).count();
    let accept_handle = {
        let nt = nt.clone();
        let log = log.clone();
        thread::spawn(move || accept_greater_neighbors(&nt, greater, &log))
    };

    for entry in nt.iter().filter(|entry| entry.id < my_id) {
        let stream = dial(entry.ip, &log)?;
        entry.attach(stream);
    }

    accept_handle
        .join()
        .expect("neighbor accept thread panicked")?;

    logging::info!(log, "overlay mesh established"; "context" => "run", "node" => my_id);

    // One reader per neighbor, each forwarding into the local SNP process.
    for entry in nt.iter() {
        if let Some(reader) = entry.reader()? {
            let id = entry.id;
            let snp_conn = snp_conn.clone();
            let log = log.clone();
            thread::spawn(move || neighbor_reader(id, reader, &snp_conn, &log));
        }
    }

    serve_snp(&nt, &snp_conn, &log)
}

/// Accepts exactly `expected` links on `CONNECTION_PORT`, attributing each
/// to the neighbor behind the peer address.
fn accept_greater_neighbors(nt: &NeighborTable, expected: usize, log: &Logger) -> NetResult<()> {
    if expected == 0 {
        return Ok(());
    }

    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, CONNECTION_PORT))?;

    for _ in 0..expected {
        let (stream, peer) = listener.accept()?;

        let id = match peer.ip() {
            IpAddr::V4(ip) => node_id_of(ip),
            IpAddr::V6(_) => {
                logging::warn!(log, "ipv6 peer rejected"; "context" => "accept");
                continue;
            }
        };

        if nt.attach(id, stream) {
            logging::info!(log, "neighbor connected"; "context" => "accept", "node" => id);
        } else {
            logging::warn!(log, "connection from unknown neighbor dropped";
                           "context" => "accept",
                           "node" => id);
        }
    }

    Ok(())
}

fn dial(ip: Ipv4Addr, log: &Logger) -> NetResult<TcpStream> {
    for _ in 0..CONNECT_RETRY_LIMIT {
        match TcpStream::connect((ip, CONNECTION_PORT)) {
            Ok(stream) => {
                logging::info!(log, "neighbor dialed"; "context" => "dial", "ip" => %ip);
                return Ok(stream);
            }
            Err(_) => thread::sleep(CONNECT_RETRY_INTERVAL),
        }
    }

    logging::error!(log, "neighbor unreachable"; "context" => "dial", "ip" => %ip);
    Err(NetError::Fatal(FatalKind::Io(std::io::ErrorKind::TimedOut)))
}

/// Forwards every packet a neighbor sends into the local SNP process;
/// packets arriving while no SNP process is attached are dropped.
fn neighbor_reader(
    id: crate::NodeId,
    stream: TcpStream,
    snp_conn: &Mutex<Option<TcpStream>>,
    log: &Logger,
) {
    let mut reader = BufReader::new(stream);

    loop {
        let pkt = match recv_pkt(&mut reader) {
            Ok(pkt) => pkt,
            Err(NetError::Fatal(FatalKind::Io(_))) => break,
            Err(error) => {
                logging::warn!(log, "unreadable packet from neighbor dropped";
                               "context" => "neighbor_reader",
                               "node" => id,
                               "error" => ?error);
                continue;
            }
        };

        let mut conn = snp_conn.lock().expect("snp link lock poisoned");
        match conn.as_mut() {
            Some(snp) => {
                if send_pkt(snp, &pkt).has_failed() {
                    logging::warn!(log, "forward to snp failed";
                                   "context" => "neighbor_reader",
                                   "node" => id);
                }
            }
            None => {
                logging::debug!(log, "no snp process attached, packet dropped";
                                "context" => "neighbor_reader",
                                "node" => id);
            }
        }
    }

    logging::info!(log, "neighbor link down"; "context" => "neighbor_reader", "node" => id);
}

/// Accepts the local SNP process on `OVERLAY_PORT` and dispatches its
/// `{next_hop, packet}` records into the mesh. A broadcast next hop goes
/// out once per connected neighbor. Re-listens when the SNP process goes
/// away.
fn serve_snp(
    nt: &NeighborTable,
    snp_conn: &Mutex<Option<TcpStream>>,
    log: &Logger,
) -> NetResult<()> {
    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, OVERLAY_PORT))?;

    loop {
        logging::info!(log, "waiting for snp process"; "context" => "serve_snp");
        let (stream, _) = listener.accept()?;

        *snp_conn.lock().expect("snp link lock poisoned") = Some(stream.try_clone()?);
        let mut reader = BufReader::new(stream);

        loop {
            let (next_hop, pkt) = match recv_hop(&mut reader) {
                Ok(record) => record,
                Err(NetError::Fatal(FatalKind::Io(_))) => break,
                Err(error) => {
                    logging::warn!(log, "unreadable record from snp dropped";
                                   "context" => "serve_snp",
                                   "error" => ?error);
                    continue;
                }
            };

            for entry in nt.iter() {
                if entry.id != next_hop && next_hop != BROADCAST_NODEID {
                    continue;
                }

                match entry.send(&pkt) {
                    Ok(()) => (),
                    Err(NetError::Wait) => {
                        logging::debug!(log, "neighbor not connected, packet dropped";
                                        "context" => "serve_snp",
                                        "node" => entry.id);
                    }
                    Err(error) => {
                        logging::warn!(log, "send to neighbor failed";
                                       "context" => "serve_snp",
                                       "node" => entry.id,
                                       "error" => ?error);
                    }
                }
            }
        }

        *snp_conn.lock().expect("snp link lock poisoned") = None;
        logging::info!(log, "snp process detached"; "context" => "serve_snp");
    }
}
