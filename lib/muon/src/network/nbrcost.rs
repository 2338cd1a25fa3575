use crate::config::INFINITE_COST;
use crate::topology::Topology;
use crate::{Cost, NodeId};

/// Direct link cost to one neighbor.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct NbrCost {
    pub node: NodeId,
    pub cost: Cost,
}

/// The neighbor cost table: the direct link cost to every neighbor, seeded
/// from the topology. Read-only after construction.
pub struct NbrCostTable {
    entries: Vec<NbrCost>,
}

impl NbrCostTable {
    pub fn new(topo: &Topology) -> NbrCostTable {
        let my_id = topo.my_node();
        let entries = topo
            .neighbors()
            .map(|node| NbrCost {
                node,
                cost: topo.cost(my_id, node),
            })
            .collect();

        NbrCostTable { entries }
    }

    /// Direct link cost to `node`; `INFINITE_COST` when it is no neighbor.
    #[inline]
    pub fn cost(&self, node: NodeId) -> Cost {
        self.entries
            .iter()
            .find(|entry| entry.node == node)
            .map_or(INFINITE_COST, |entry| entry.cost)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &NbrCost> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::net::Ipv4Addr;

    fn table() -> NbrCostTable {
        let topo = Topology::parse(
            Cursor::new("localhost 10.0.0.2 3\nlocalhost 10.0.0.5 7\n10.0.0.2 10.0.0.5 1\n"),
            Ipv4Addr::new(10, 0, 0, 1),
        )
        .unwrap();

        NbrCostTable::new(&topo)
    }

    #[test]
    fn test_seeded_from_topology() {
        let nct = table();

        assert_eq!(nct.len(), 2);
        assert_eq!(nct.cost(2), 3);
        assert_eq!(nct.cost(5), 7);
    }

    #[test]
    fn test_non_neighbor_is_infinite() {
        assert_eq!(table().cost(9), INFINITE_COST);
    }
}
