use crate::frame::{read_frame, write_frame};
use crate::seg::MAX_SEG_WIRE_LEN;
use crate::{Cost, NodeId};
use argon::shared::{FatalKind, NetError, NetResult};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

/// Fixed packet header size on the wire:
/// `src | dest` (u32 each), `length | type` (u16 each).
pub const PKT_HEADER_LEN: usize = 12;

/// A packet payload is either a full segment or a route-update record.
pub const MAX_PKT_DATA: usize = MAX_SEG_WIRE_LEN;

/// Largest wire size of a framed record crossing any of the local links
/// (the hop record adds a u32 next-hop prefix).
pub const MAX_RECORD_LEN: usize = 4 + PKT_HEADER_LEN + MAX_PKT_DATA;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PktType {
    Snp = 0,
    RouteUpdate = 1,
}

impl PktType {
    #[inline]
    fn from_wire(value: u16) -> NetResult<PktType> {
        Ok(match value {
            0 => PktType::Snp,
            1 => PktType::RouteUpdate,
            _ => return Err(NetError::Fatal(FatalKind::BadPktType)),
        })
    }
}

/// A network-layer packet routed across the overlay.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Packet {
    pub src: NodeId,
    pub dest: NodeId,
    pub kind: PktType,
    pub data: Vec<u8>,
}

impl Packet {
    #[inline]
    pub fn new(src: NodeId, dest: NodeId, kind: PktType, data: Vec<u8>) -> Packet {
        if data.len() > MAX_PKT_DATA {
            panic!("Packet payload exceeds MAX_PKT_DATA: {}", data.len());
        }

        Packet { src, dest, kind, data }
    }

    pub fn to_wire(&self) -> Vec<u8> {
        let mut wire = Vec::with_capacity(PKT_HEADER_LEN + self.data.len());

        wire.write_u32::<BigEndian>(self.src).unwrap();
        wire.write_u32::<BigEndian>(self.dest).unwrap();
        wire.write_u16::<BigEndian>(self.data.len() as u16).unwrap();
        wire.write_u16::<BigEndian>(self.kind as u16).unwrap();
        wire.write_all(&self.data).unwrap();

        wire
    }

    pub fn from_wire(body: &[u8]) -> NetResult<Packet> {
        if body.len() < PKT_HEADER_LEN {
            return Err(NetError::Fatal(FatalKind::TruncatedRecord));
        }

        let mut header = Cursor::new(&body[..PKT_HEADER_LEN]);
        let src = header.read_u32::<BigEndian>()?;
        let dest = header.read_u32::<BigEndian>()?;
        let length = header.read_u16::<BigEndian>()? as usize;
        let kind = PktType::from_wire(header.read_u16::<BigEndian>()?)?;

        if length > MAX_PKT_DATA || body.len() != PKT_HEADER_LEN + length {
            return Err(NetError::Fatal(FatalKind::TruncatedRecord));
        }

        Ok(Packet {
            src,
            dest,
            kind,
            data: body[PKT_HEADER_LEN..].to_vec(),
        })
    }
}

/// One advertised destination in a distance-vector broadcast.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct RouteEntry {
    pub node: NodeId,
    pub cost: Cost,
}

/// A distance-vector broadcast record: the sender's own row, one entry per
/// known node.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RouteUpdate {
    pub entries: Vec<RouteEntry>,
}

impl RouteUpdate {
    pub fn to_wire(&self) -> Vec<u8> {
        let mut wire = Vec::with_capacity(4 + self.entries.len() * 8);

        wire.write_u32::<BigEndian>(self.entries.len() as u32).unwrap();
        for entry in &self.entries {
            wire.write_u32::<BigEndian>(entry.node).unwrap();
            wire.write_u32::<BigEndian>(entry.cost).unwrap();
        }

        wire
    }

    pub fn from_wire(body: &[u8]) -> NetResult<RouteUpdate> {
        let mut stream = Cursor::new(body);
        let entry_num = stream.read_u32::<BigEndian>()? as usize;

        if body.len() != 4 + entry_num * 8 {
            return Err(NetError::Fatal(FatalKind::TruncatedRecord));
        }

        let mut entries = Vec::with_capacity(entry_num);
        for _ in 0..entry_num {
            entries.push(RouteEntry {
                node: stream.read_u32::<BigEndian>()?,
                cost: stream.read_u32::<BigEndian>()?,
            });
        }

        Ok(RouteUpdate { entries })
    }
}

/// Sends a bare packet over a node-to-node overlay link.
pub fn send_pkt<W: Write>(stream: &mut W, pkt: &Packet) -> NetResult<()> {
    write_frame(stream, &pkt.to_wire())
}

/// Receives a bare packet from a node-to-node overlay link.
pub fn recv_pkt<R: Read>(stream: &mut R) -> NetResult<Packet> {
    let body = read_frame(stream, MAX_RECORD_LEN)?;
    Packet::from_wire(&body)
}

/// Sends a `{next_hop, packet}` record over the SNP↔ON stream.
pub fn send_hop<W: Write>(stream: &mut W, next_hop: NodeId, pkt: &Packet) -> NetResult<()> {
    let mut body = Vec::with_capacity(4 + PKT_HEADER_LEN + pkt.data.len());
    body.write_u32::<BigEndian>(next_hop).unwrap();
    body.extend_from_slice(&pkt.to_wire());

    write_frame(stream, &body)
}

/// Receives a `{next_hop, packet}` record from the SNP↔ON stream.
pub fn recv_hop<R: Read>(stream: &mut R) -> NetResult<(NodeId, Packet)> {
    let body = read_frame(stream, MAX_RECORD_LEN)?;

    if body.len() < 4 {
        return Err(NetError::Fatal(FatalKind::TruncatedRecord));
    }

    let next_hop = Cursor::new(&body[..4]).read_u32::<BigEndian>()?;
    let pkt = Packet::from_wire(&body[4..])?;

    Ok((next_hop, pkt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BROADCAST_NODEID;

    fn sample_update() -> RouteUpdate {
        RouteUpdate {
            entries: vec![
                RouteEntry { node: 1, cost: 0 },
                RouteEntry { node: 2, cost: 1 },
                RouteEntry { node: 4, cost: 3 },
            ],
        }
    }

    #[test]
    fn test_packet_roundtrip() {
        let pkt = Packet::new(1, 4, PktType::Snp, b"segment bytes".to_vec());
        let wire = pkt.to_wire();

        assert_eq!(wire.len(), PKT_HEADER_LEN + 13);
        assert_eq!(Packet::from_wire(&wire).unwrap(), pkt);
    }

    #[test]
    fn test_route_update_roundtrip() {
        let update = sample_update();
        let pkt = Packet::new(2, BROADCAST_NODEID, PktType::RouteUpdate, update.to_wire());

        let parsed = Packet::from_wire(&pkt.to_wire()).unwrap();
        assert_eq!(parsed.kind, PktType::RouteUpdate);
        assert_eq!(RouteUpdate::from_wire(&parsed.data).unwrap(), update);
    }

    #[test]
    fn test_route_update_rejects_bad_entry_count() {
        let mut wire = sample_update().to_wire();
        wire[3] = 9;

        assert_eq!(
            RouteUpdate::from_wire(&wire).unwrap_err(),
            NetError::Fatal(FatalKind::TruncatedRecord)
        );
    }

    #[test]
    fn test_hop_record_roundtrip() {
        let pkt = Packet::new(3, 1, PktType::Snp, vec![0xAA; 32]);

        let mut wire = Vec::new();
        send_hop(&mut wire, 2, &pkt).unwrap();

        let (next_hop, parsed) = recv_hop(&mut Cursor::new(wire)).unwrap();
        assert_eq!(next_hop, 2);
        assert_eq!(parsed, pkt);
    }

    #[test]
    fn test_pkt_stream_roundtrip() {
        let first = Packet::new(1, 2, PktType::Snp, b"alpha".to_vec());
        let second = Packet::new(2, 1, PktType::Snp, b"beta!".to_vec());

        let mut wire = Vec::new();
        send_pkt(&mut wire, &first).unwrap();
        send_pkt(&mut wire, &second).unwrap();

        let mut cursor = Cursor::new(wire);
        assert_eq!(recv_pkt(&mut cursor).unwrap(), first);
        assert_eq!(recv_pkt(&mut cursor).unwrap(), second);
    }

    #[test]
    fn test_packet_rejects_unknown_type() {
        let mut wire = Packet::new(1, 2, PktType::Snp, Vec::new()).to_wire();
        wire[11] = 7;

        assert_eq!(
            Packet::from_wire(&wire).unwrap_err(),
            NetError::Fatal(FatalKind::BadPktType)
        );
    }
}
