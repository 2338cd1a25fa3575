use crate::config::INFINITE_COST;
use crate::pkt::RouteEntry;
use crate::topology::Topology;
use crate::{Cost, NodeId};

/// One distance vector: a source node's estimated cost to every known
/// destination.
pub struct DvRow {
    pub source: NodeId,
    entries: Vec<RouteEntry>,
}

impl DvRow {
    #[inline]
    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }
}

/// The distance-vector table: one row per neighbor caching that neighbor's
/// last advertisement, plus this node's own row last. The own row starts
/// from the direct link costs, zero to itself; neighbor rows start
/// all-unreachable.
pub struct DvTable {
    rows: Vec<DvRow>,
}

impl DvTable {
    pub fn new(topo: &Topology) -> DvTable {
        let my_id = topo.my_node();
        let sources: Vec<NodeId> = topo.neighbors().chain(Some(my_id)).collect();

        let rows = sources
            .into_iter()
            .map(|source| DvRow {
                source,
                entries: topo
                    .nodes()
                    .map(|dest| RouteEntry {
                        node: dest,
                        cost: if source != my_id {
                            INFINITE_COST
                        } else if dest == my_id {
                            0
                        } else {
                            topo.cost(source, dest)
                        },
                    })
                    .collect(),
            })
            .collect();

        DvTable { rows }
    }

    /// Estimated cost from `from` to `to`; `INFINITE_COST` when either node
    /// is unknown to the table.
    #[inline]
    pub fn cost(&self, from: NodeId, to: NodeId) -> Cost {
        self.entry(from, to).map_or(INFINITE_COST, |entry| entry.cost)
    }

    /// Updates a single cost. Returns false when the pair is unknown.
    #[inline]
    pub fn set_cost(&mut self, from: NodeId, to: NodeId, cost: Cost) -> bool {
        match self.entry_mut(from, to) {
            Some(entry) => {
                entry.cost = cost;
                true
            }
            None => false,
        }
    }

    /// The row advertised by `source`, when present.
    #[inline]
    pub fn row(&self, source: NodeId) -> Option<&DvRow> {
        self.rows.iter().find(|row| row.source == source)
    }

    #[inline]
    fn entry(&self, from: NodeId, to: NodeId) -> Option<&RouteEntry> {
        self.row(from)
            .and_then(|row| row.entries.iter().find(|entry| entry.node == to))
    }

    #[inline]
    fn entry_mut(&mut self, from: NodeId, to: NodeId) -> Option<&mut RouteEntry> {
        self.rows
            .iter_mut()
            .find(|row| row.source == from)
            .and_then(|row| row.entries.iter_mut().find(|entry| entry.node == to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::net::Ipv4Addr;

    fn line_table() -> DvTable {
        let topo = Topology::parse(
            Cursor::new("localhost 10.0.0.2 1\n10.0.0.2 10.0.0.3 1\n10.0.0.3 10.0.0.4 1\n"),
            Ipv4Addr::new(10, 0, 0, 1),
        )
        .unwrap();

        DvTable::new(&topo)
    }

    #[test]
    fn test_own_row_seeded_from_links() {
        let dvt = line_table();

        assert_eq!(dvt.cost(1, 1), 0);
        assert_eq!(dvt.cost(1, 2), 1);
        assert_eq!(dvt.cost(1, 3), INFINITE_COST);
        assert_eq!(dvt.cost(1, 4), INFINITE_COST);
    }

    #[test]
    fn test_neighbor_rows_start_unreachable() {
        let dvt = line_table();

        for dest in [1u32, 2, 3, 4].iter() {
            assert_eq!(dvt.cost(2, *dest), INFINITE_COST);
        }
    }

    #[test]
    fn test_every_row_covers_every_node() {
        let dvt = line_table();

        assert_eq!(dvt.row(1).unwrap().entries().len(), 4);
        assert_eq!(dvt.row(2).unwrap().entries().len(), 4);
        assert!(dvt.row(3).is_none());
    }

    #[test]
    fn test_set_cost() {
        let mut dvt = line_table();

        assert!(dvt.set_cost(2, 4, 2));
        assert_eq!(dvt.cost(2, 4), 2);

        assert!(!dvt.set_cost(9, 4, 2));
        assert!(!dvt.set_cost(2, 9, 2));
    }
}
