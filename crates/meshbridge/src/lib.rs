//! MeshBridge - a software Ethernet bridge forwarding plane for wireless
//! mesh links.
//!
//! The bridge combines a forwarding database with aging and static/local
//! pinning, an IEEE 802.1D-style spanning-tree engine, multicast group
//! tracking with unicast expansion, P2P frame tunneling for mesh links, a
//! direct-route shortcut between mesh-adjacent ports, and an uplink/proxy
//! mode that presents one shared address upstream for satellite stations.
//!
//! # Architecture
//!
//! ```text
//! [frame in] ──> [Tunnel decap] ──> [STP divert] ──> [learn/snoop]
//!                                                         │
//!              [FrameSink] <── [deliver: local / unicast /
//!                               direct / expand / flood]
//! ```
//!
//! The library is the product: [`Bridge`] exposes the packet entry point
//! ([`Bridge::handle_frame`]), the maintenance tick ([`Bridge::on_tick`])
//! and the synchronous control plane. The `bridged` binary wires a bridge
//! to a tokio tick loop.
//!
//! # Concurrency
//!
//! The packet path may run on many threads at once. The FDB and multicast
//! tracker are sharded maps; port and spanning-tree state sit under one
//! bridge-wide reader-writer lock that packet-path readers share.
//! Statistics are relaxed atomics. All timers are explicit values driven
//! by [`Bridge::on_tick`]; there are no ambient clocks or globals.

pub mod bridge;
pub mod config;
pub mod error;
pub mod fdb;
pub mod forward;
pub mod frame;
pub mod mcast;
pub mod ports;
pub mod stats;
pub mod stp;
pub mod tunnel;

pub use bridge::{Bridge, BridgeStatus};
pub use config::BridgeConfig;
pub use error::{BridgeError, BridgeResult};
pub use fdb::{EntryClass, FdbDumpEntry, FdbLookup};
pub use forward::{Delivery, FrameSink};
pub use mcast::GroupDumpEntry;
pub use ports::{PortConfig, PortIndex, PortStatus, TunnelAttrs};
pub use stats::StatsSnapshot;
pub use stp::StpPortState;

pub use meshbridge_types::{BridgeId, MacAddress, PortId, TimeTicks};
