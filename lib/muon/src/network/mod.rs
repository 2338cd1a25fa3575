//! The SNP routing plane: neighbor costs, distance vectors, the hashed
//! routing table, and the daemon threads that exchange route updates and
//! forward packets across the overlay.

pub mod daemon;
pub mod dvtable;
pub mod nbrcost;
pub mod routes;

use crate::config::INFINITE_COST;
use crate::pkt::{RouteEntry, RouteUpdate};
use crate::topology::Topology;
use crate::{Cost, NodeId};
use argon::logging::{self, Logger};
use dvtable::DvTable;
use nbrcost::NbrCostTable;
use routes::RoutingTable;
use std::sync::Mutex;

/// The routing core of one SNP node: the three tables plus the
/// Bellman-Ford relaxation that ties them together. Socket-free, so
/// convergence is testable in-process; the daemon threads in
/// `network::daemon` drive it against the overlay.
///
/// Lock order is the distance-vector table before the routing table,
/// always.
pub struct Router {
    my_id: NodeId,
    nct: NbrCostTable,
    dvt: Mutex<DvTable>,
    routes: Mutex<RoutingTable>,
    log: Logger,
}

impl Router {
    pub fn new<'a, L: Into<Option<&'a Logger>>>(topo: &Topology, log: L) -> Router {
        Router {
            my_id: topo.my_node(),
            nct: NbrCostTable::new(topo),
            dvt: Mutex::new(DvTable::new(topo)),
            routes: Mutex::new(RoutingTable::new(topo)),
            log: logging::child(log),
        }
    }

    #[inline]
    pub fn my_node(&self) -> NodeId {
        self.my_id
    }

    /// Snapshot of this node's own distance vector, ready to broadcast.
    pub fn build_update(&self) -> RouteUpdate {
        let dvt = self.dvt.lock().expect("dv table lock poisoned");
        let row = dvt.row(self.my_id).expect("own dv row missing");

        RouteUpdate {
            entries: row.entries().to_vec(),
        }
    }

    /// Absorbs a neighbor's advertised distance vector: caches the row,
    /// then relaxes this node's own row and redirects the routing table
    /// wherever the path through `from` wins.
    pub fn apply_update(&self, from: NodeId, update: &RouteUpdate) {
        let link_cost = self.nct.cost(from);
        let mut dvt = self.dvt.lock().expect("dv table lock poisoned");
        let mut routes = self.routes.lock().expect("routing table lock poisoned");

        for &RouteEntry { node: dest, cost } in &update.entries {
            if !dvt.set_cost(from, dest, cost) {
                logging::trace!(self.log, "route update names unknown node";
                                "context" => "apply_update",
                                "from" => from,
                                "dest" => dest);
                continue;
            }

            let via = link_cost.saturating_add(cost).min(INFINITE_COST);

            if via < dvt.cost(self.my_id, dest) {
                dvt.set_cost(self.my_id, dest, via);
                routes.set_next(dest, from);

                logging::debug!(self.log, "route relaxed";
                                "context" => "apply_update",
                                "dest" => dest,
                                "via" => from,
                                "cost" => via);
            }
        }
    }

    /// Routing decision for `dest`. Delivery to self is the caller's case;
    /// this is only the next hop outward.
    #[inline]
    pub fn next_hop(&self, dest: NodeId) -> Option<NodeId> {
        self.routes
            .lock()
            .expect("routing table lock poisoned")
            .next_hop(dest)
    }

    /// Estimated cost from this node to `dest`.
    #[inline]
    pub fn cost_to(&self, dest: NodeId) -> Cost {
        self.dvt
            .lock()
            .expect("dv table lock poisoned")
            .cost(self.my_id, dest)
    }

    /// Cached cost the neighbor `from` last advertised toward `dest`.
    #[inline]
    pub fn advertised_cost(&self, from: NodeId, dest: NodeId) -> Cost {
        self.dvt
            .lock()
            .expect("dv table lock poisoned")
            .cost(from, dest)
    }

    /// Direct link cost to a neighbor.
    #[inline]
    pub fn neighbor_cost(&self, node: NodeId) -> Cost {
        self.nct.cost(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::net::Ipv4Addr;

    // The 4-node line 1 - 2 - 3 - 4 with unit costs, one topology file
    // per node's point of view.
    const VIEWS: [&str; 4] = [
        "localhost 10.0.0.2 1\n10.0.0.2 10.0.0.3 1\n10.0.0.3 10.0.0.4 1\n",
        "10.0.0.1 localhost 1\nlocalhost 10.0.0.3 1\n10.0.0.3 10.0.0.4 1\n",
        "10.0.0.1 10.0.0.2 1\n10.0.0.2 localhost 1\nlocalhost 10.0.0.4 1\n",
        "10.0.0.1 10.0.0.2 1\n10.0.0.2 10.0.0.3 1\n10.0.0.3 localhost 1\n",
    ];

    fn line_routers() -> Vec<Router> {
        VIEWS
            .iter()
            .enumerate()
            .map(|(i, view)| {
                let topo = Topology::parse(
                    Cursor::new(*view),
                    Ipv4Addr::new(10, 0, 0, (i + 1) as u8),
                )
                .unwrap();
                Router::new(&topo, None)
            })
            .collect()
    }

    /// One synchronous broadcast round: every node builds its update, then
    /// every neighbor absorbs it.
    fn broadcast_round(routers: &[Router]) {
        let updates: Vec<_> = routers.iter().map(Router::build_update).collect();

        for (i, router) in routers.iter().enumerate() {
            let my = router.my_node();
            for (j, update) in updates.iter().enumerate() {
                let from = routers[j].my_node();
                if router.neighbor_cost(from) != INFINITE_COST && from != my {
                    router.apply_update(from, update);
                }
            }
        }
    }

    #[test]
    fn test_initial_routes_are_direct_only() {
        let routers = line_routers();

        assert_eq!(routers[0].next_hop(1), Some(1));
        assert_eq!(routers[0].next_hop(2), Some(2));
        assert_eq!(routers[0].next_hop(3), None);
        assert_eq!(routers[0].next_hop(4), None);
    }

    #[test]
    fn test_line_topology_converges() {
        let routers = line_routers();

        for _ in 0..3 {
            broadcast_round(&routers);
        }

        // Node 1 reaches node 4 through node 2 at cost 3.
        assert_eq!(routers[0].cost_to(4), 3);
        assert_eq!(routers[0].next_hop(4), Some(2));

        assert_eq!(routers[0].cost_to(3), 2);
        assert_eq!(routers[0].next_hop(3), Some(2));

        // The middle nodes route outward in both directions.
        assert_eq!(routers[1].next_hop(4), Some(3));
        assert_eq!(routers[2].next_hop(1), Some(2));
        assert_eq!(routers[3].cost_to(1), 3);
    }

    #[test]
    fn test_converged_costs_satisfy_bellman_ford() {
        let routers = line_routers();

        for _ in 0..4 {
            broadcast_round(&routers);
        }

        // Node 2 has two neighbors; its estimate to any destination must
        // equal the best advertised path through one of them.
        for dest in [1u32, 3, 4].iter().copied() {
            let via_1 = routers[1]
                .neighbor_cost(1)
                .saturating_add(routers[1].advertised_cost(1, dest));
            let via_3 = routers[1]
                .neighbor_cost(3)
                .saturating_add(routers[1].advertised_cost(3, dest));

            assert_eq!(routers[1].cost_to(dest), via_1.min(via_3));
        }
    }

    #[test]
    fn test_self_route_survives_relaxation() {
        let routers = line_routers();

        for _ in 0..3 {
            broadcast_round(&routers);
        }

        for router in &routers {
            assert_eq!(router.next_hop(router.my_node()), Some(router.my_node()));
        }
    }

    #[test]
    fn test_worse_advertisement_never_raises_cost() {
        let routers = line_routers();

        for _ in 0..3 {
            broadcast_round(&routers);
        }
        assert_eq!(routers[0].cost_to(4), 3);

        // The protocol has no cost-restoration: a later, worse vector from
        // the same neighbor is cached but the own row keeps its minimum.
        routers[0].apply_update(
            2,
            &RouteUpdate {
                entries: vec![RouteEntry { node: 4, cost: 50 }],
            },
        );

        assert_eq!(routers[0].advertised_cost(2, 4), 50);
        assert_eq!(routers[0].cost_to(4), 3);
        assert_eq!(routers[0].next_hop(4), Some(2));
    }

    #[test]
    fn test_unreachable_advertisement_never_wins() {
        let routers = line_routers();

        routers[0].apply_update(
            2,
            &RouteUpdate {
                entries: vec![RouteEntry {
                    node: 3,
                    cost: INFINITE_COST,
                }],
            },
        );

        assert_eq!(routers[0].cost_to(3), INFINITE_COST);
        assert_eq!(routers[0].next_hop(3), None);
    }
}
