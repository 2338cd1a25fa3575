use crate::config::INFINITE_COST;
use crate::{Cost, NodeId};
use hashbrown::HashMap;
use indexmap::IndexSet;
use std::fs::File;
use std::io;
use std::io::{BufRead, BufReader};
use std::net::{Ipv4Addr, ToSocketAddrs};
use std::path::Path;

/// Static view of the overlay: every node, every direct link and its cost,
/// and this node's place in it. Parsed once from the link-cost file; the
/// file format is one `hostA hostB cost` line per link, where `localhost`
/// names this node. A node's ID is the low octet of its IPv4 address.
pub struct Topology {
    my_id: NodeId,
    nodes: IndexSet<NodeId>,
    neighbors: IndexSet<NodeId>,
    links: HashMap<(NodeId, NodeId), Cost>,
    addresses: HashMap<NodeId, Ipv4Addr>,
}

impl Topology {
    pub fn load<P: AsRef<Path>>(path: P, my_ip: Ipv4Addr) -> io::Result<Topology> {
        Self::parse(BufReader::new(File::open(path)?), my_ip)
    }

    /// Parses the link-cost lines from any buffered reader. Links are
    /// recorded in both directions; node and neighbor order follows the
    /// file.
    pub fn parse<R: BufRead>(reader: R, my_ip: Ipv4Addr) -> io::Result<Topology> {
        let my_id = node_id_of(my_ip);
        let mut nodes = IndexSet::new();
        let mut neighbors = IndexSet::new();
        let mut links = HashMap::new();
        let mut addresses = HashMap::new();
        addresses.insert(my_id, my_ip);

        for line in reader.lines() {
            let line = line?;
            let mut fields = line.split_whitespace();

            let (first, second, cost) = match (fields.next(), fields.next(), fields.next()) {
                (Some(first), Some(second), Some(cost)) => (first, second, cost),
                (None, _, _) => continue,
                _ => return Err(bad_line(&line)),
            };

            let cost: Cost = cost.parse().map_err(|_| bad_line(&line))?;
            let first_ip = resolve(first, my_ip)?;
            let second_ip = resolve(second, my_ip)?;
            let first_id = node_id_of(first_ip);
            let second_id = node_id_of(second_ip);

            nodes.insert(first_id);
            nodes.insert(second_id);
            addresses.insert(first_id, first_ip);
            addresses.insert(second_id, second_ip);
            links.insert((first_id, second_id), cost);
            links.insert((second_id, first_id), cost);

            if first_id == my_id && second_id != my_id {
                neighbors.insert(second_id);
            } else if second_id == my_id && first_id != my_id {
                neighbors.insert(first_id);
            }
        }

        Ok(Topology {
            my_id,
            nodes,
            neighbors,
            links,
            addresses,
        })
    }

    /// This node's ID.
    #[inline]
    pub fn my_node(&self) -> NodeId {
        self.my_id
    }

    /// Every node mentioned in the file, in file order.
    #[inline]
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().copied()
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// This node's direct neighbors, in file order.
    #[inline]
    pub fn neighbors(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.neighbors.iter().copied()
    }

    #[inline]
    pub fn neighbor_count(&self) -> usize {
        self.neighbors.len()
    }

    /// Direct link cost between two nodes; `INFINITE_COST` when no direct
    /// link exists.
    #[inline]
    pub fn cost(&self, from: NodeId, to: NodeId) -> Cost {
        match self.links.get(&(from, to)) {
            Some(&cost) => cost,
            None => INFINITE_COST,
        }
    }

    /// IPv4 address of a node, when the file names one.
    #[inline]
    pub fn address(&self, node: NodeId) -> Option<Ipv4Addr> {
        self.addresses.get(&node).copied()
    }
}

/// Node ID of an address: its low octet.
#[inline]
pub fn node_id_of(ip: Ipv4Addr) -> NodeId {
    NodeId::from(ip.octets()[3])
}

/// Resolves a topology-file host field: `localhost` names this node, dotted
/// quads parse directly, anything else goes through name resolution.
fn resolve(host: &str, my_ip: Ipv4Addr) -> io::Result<Ipv4Addr> {
    if host == "localhost" {
        return Ok(my_ip);
    }

    if let Ok(ip) = host.parse::<Ipv4Addr>() {
        return Ok(ip);
    }

    (host, 0u16)
        .to_socket_addrs()?
        .filter_map(|addr| match addr.ip() {
            std::net::IpAddr::V4(v4) => Some(v4),
            _ => None,
        })
        .next()
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("No IPv4 address for host {}", host),
            )
        })
}

#[inline]
fn bad_line(line: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("Malformed topology line: {:?}", line),
    )
}
