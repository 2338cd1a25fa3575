use crate::pkt::{send_pkt, Packet};
use crate::topology::Topology;
use crate::NodeId;
use argon::shared::{FatalKind, NetError, NetResult};
use std::io;
use std::net::{Ipv4Addr, TcpStream};
use std::sync::Mutex;

/// One neighbor of this node: its identity and, once the mesh is up, the
/// TCP link carrying packets to it.
pub struct NbrEntry {
    pub id: NodeId,
    pub ip: Ipv4Addr,
    conn: Mutex<Option<TcpStream>>,
}

impl NbrEntry {
    /// Hands the entry its established link.
    pub fn attach(&self, stream: TcpStream) {
        *self.conn.lock().expect("neighbor link lock poisoned") = Some(stream);
    }

    /// Drops the link, marking the neighbor down.
    pub fn detach(&self) {
        *self.conn.lock().expect("neighbor link lock poisoned") = None;
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.conn
            .lock()
            .expect("neighbor link lock poisoned")
            .is_some()
    }

    /// Reading half of the link, for the per-neighbor reader thread.
    pub fn reader(&self) -> io::Result<Option<TcpStream>> {
        let conn = self.conn.lock().expect("neighbor link lock poisoned");

        match &*conn {
            Some(stream) => Ok(Some(stream.try_clone()?)),
            None => Ok(None),
        }
    }

    /// Sends one framed packet down the link. `Wait` signals the neighbor
    /// is not connected; the caller decides whether that is worth a log
    /// line.
    pub fn send(&self, pkt: &Packet) -> NetResult<()> {
        let mut conn = self.conn.lock().expect("neighbor link lock poisoned");

        match conn.as_mut() {
            Some(stream) => send_pkt(stream, pkt),
            None => Err(NetError::Wait),
        }
    }
}

/// The neighbor table of the ON process: every neighbor from the topology,
/// each with its link slot initially empty.
pub struct NeighborTable {
    entries: Vec<NbrEntry>,
}

impl NeighborTable {
    pub fn new(topo: &Topology) -> NetResult<NeighborTable> {
        let entries = topo
            .neighbors()
            .map(|id| match topo.address(id) {
                Some(ip) => Ok(NbrEntry {
                    id,
                    ip,
                    conn: Mutex::new(None),
                }),
                None => Err(NetError::Fatal(FatalKind::AddrParse)),
            })
            .collect::<NetResult<Vec<_>>>()?;

        Ok(NeighborTable { entries })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &NbrEntry> {
        self.entries.iter()
    }

    #[inline]
    pub fn get(&self, node: NodeId) -> Option<&NbrEntry> {
        self.entries.iter().find(|entry| entry.id == node)
    }

    /// Assigns an established link to the neighbor, if it is one.
    pub fn attach(&self, node: NodeId, stream: TcpStream) -> bool {
        match self.get(node) {
            Some(entry) => {
                entry.attach(stream);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkt::{recv_pkt, PktType};
    use std::io::Cursor;
    use std::net::TcpListener;

    fn table() -> NeighborTable {
        let topo = Topology::parse(
            Cursor::new("localhost 10.0.0.2 1\nlocalhost 10.0.0.3 2\n"),
            Ipv4Addr::new(10, 0, 0, 1),
        )
        .unwrap();

        NeighborTable::new(&topo).unwrap()
    }

    #[test]
    fn test_entries_from_topology() {
        let nt = table();

        assert_eq!(nt.len(), 2);
        assert_eq!(nt.get(2).unwrap().ip, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(nt.get(3).unwrap().ip, Ipv4Addr::new(10, 0, 0, 3));
        assert!(nt.get(4).is_none());
        assert!(!nt.get(2).unwrap().is_connected());
    }

    #[test]
    fn test_send_without_link_is_wait() {
        let nt = table();
        let pkt = Packet::new(1, 2, PktType::Snp, Vec::new());

        assert_eq!(nt.get(2).unwrap().send(&pkt), Err(NetError::Wait));
    }

    #[test]
    fn test_attach_and_send() {
        let nt = table();

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let stream = TcpStream::connect(addr).unwrap();
        let (far, _) = listener.accept().unwrap();

        assert!(nt.attach(2, stream));
        assert!(!nt.attach(9, far.try_clone().unwrap()));
        assert!(nt.get(2).unwrap().is_connected());

        let pkt = Packet::new(1, 3, PktType::Snp, b"forward me".to_vec());
        nt.get(2).unwrap().send(&pkt).unwrap();

        let mut reader = std::io::BufReader::new(far);
        assert_eq!(recv_pkt(&mut reader).unwrap(), pkt);
    }
}
