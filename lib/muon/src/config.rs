use crate::{Cost, NodeId};
use serde_derive::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Upper bound on concurrently open transport connections per endpoint.
pub const MAX_TRANSPORT_CONNECTIONS: usize = 10;

/// Largest data payload carried by a single segment.
pub const MAX_SEG_LEN: usize = 1464;

/// Size of the receiver-side reassembly buffer. Must stay a multiple of the
/// byte FIFO's reservation increment.
pub const RECEIVE_BUF_SIZE: usize = 65536;

/// Go-Back-N window: the maximum number of sent-but-unacked segments.
pub const GBN_WINDOW: usize = 10;

pub const SYN_TIMEOUT: Duration = Duration::from_millis(500);
pub const FIN_TIMEOUT: Duration = Duration::from_millis(500);
pub const DATA_TIMEOUT: Duration = Duration::from_millis(500);

/// Scan interval of the retransmit monitor.
pub const SENDBUF_POLLING_INTERVAL: Duration = Duration::from_millis(100);
/// Re-check interval of a blocked `recv`.
pub const RECVBUF_POLLING_INTERVAL: Duration = Duration::from_millis(100);

pub const SYN_MAX_RETRY: u32 = 5;
pub const FIN_MAX_RETRY: u32 = 5;

/// How long a receiver lingers in CloseWait before forcing Closed.
pub const CLOSEWAIT_TIMEOUT: Duration = Duration::from_secs(2);

/// Period of the distance-vector broadcast.
pub const ROUTEUPDATE_INTERVAL: Duration = Duration::from_secs(5);

/// Node IDs live in `[0, MAX_NODE_NUM)`; they are the low octet of an IPv4
/// address.
pub const MAX_NODE_NUM: u32 = 256;

/// Bucket count of the hashed routing table.
pub const MAX_ROUTINGTABLE_SLOTS: usize = 10;

/// Destination sentinel requesting one send per neighbor.
pub const BROADCAST_NODEID: NodeId = NodeId::max_value();

/// Unreachable-cost sentinel. Cost arithmetic saturates here so an
/// unreachable advertisement can never win a relaxation.
pub const INFINITE_COST: Cost = 0x00FF_FFFF;

/// ON process port accepting the local SNP process.
pub const OVERLAY_PORT: u16 = 28045;
/// SNP process port accepting the local SRT process.
pub const NETWORK_PORT: u16 = 28055;
/// Port of the node-to-node overlay mesh links.
pub const CONNECTION_PORT: u16 = 28040;

/// Default received-segment loss/corruption probability.
pub const PKT_LOSS_RATE: f64 = 0.0;

/// Per-node daemon configuration, loaded from a TOML file.
#[derive(Serialize, Deserialize)]
pub struct NodeConfig {
    /// This node's own IPv4 address; its low octet is the node ID.
    pub host_ip: String,
    /// Path to the link-cost file.
    pub topology: String,
    /// Received-segment loss/corruption probability in `[0, 1)`.
    pub loss_rate: f64,
}

impl Default for NodeConfig {
    fn default() -> NodeConfig {
        NodeConfig {
            host_ip: "127.0.0.1".to_string(),
            topology: "topology.dat".to_string(),
            loss_rate: PKT_LOSS_RATE,
        }
    }
}

impl NodeConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> NodeConfig {
        serdeconv::from_toml_file(path).expect("Error loading node configuration file")
    }
}
