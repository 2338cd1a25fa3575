use crate::config::MAX_ROUTINGTABLE_SLOTS;
use crate::topology::Topology;
use crate::NodeId;

/// One routing decision: packets for `dest` leave through `next`.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Route {
    pub dest: NodeId,
    pub next: NodeId,
}

/// The hashed routing table: `MAX_ROUTINGTABLE_SLOTS` buckets, each a chain
/// of routes whose destinations collide on `dest % MAX_ROUTINGTABLE_SLOTS`.
/// Seeded with a self route and one direct route per neighbor.
pub struct RoutingTable {
    slots: Vec<Vec<Route>>,
}

#[inline]
fn slot_of(dest: NodeId) -> usize {
    dest as usize % MAX_ROUTINGTABLE_SLOTS
}

impl RoutingTable {
    pub fn new(topo: &Topology) -> RoutingTable {
        let mut table = RoutingTable {
            slots: (0..MAX_ROUTINGTABLE_SLOTS).map(|_| Vec::new()).collect(),
        };

        let my_id = topo.my_node();
        table.set_next(my_id, my_id);
        for neighbor in topo.neighbors() {
            table.set_next(neighbor, neighbor);
        }

        table
    }

    /// Adds or updates the route for `dest`.
    pub fn set_next(&mut self, dest: NodeId, next: NodeId) {
        let chain = &mut self.slots[slot_of(dest)];

        match chain.iter_mut().find(|route| route.dest == dest) {
            Some(route) => route.next = next,
            None => chain.push(Route { dest, next }),
        }
    }

    /// Next hop toward `dest`, when one is known.
    #[inline]
    pub fn next_hop(&self, dest: NodeId) -> Option<NodeId> {
        self.slots[slot_of(dest)]
            .iter()
            .find(|route| route.dest == dest)
            .map(|route| route.next)
    }

    /// Every route in the table, bucket by bucket.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.slots.iter().flatten()
    }
}
