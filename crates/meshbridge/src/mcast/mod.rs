//! Multicast group membership tracking.
//!
//! Tracks which station MACs joined which group on which port, so the
//! forwarding engine can expand a group frame into unicast copies instead
//! of flooding — trading CPU and packet count for radio airtime on mesh
//! links. An unknown group degrades gracefully to flooding; nothing is ever
//! dropped to avoid the expansion cost.

mod tracker;
mod types;

pub use tracker::{McastStats, MulticastTracker};
pub use types::{GroupDumpEntry, GroupEntry, GroupSnapshot, MemberInfo, PortMembership};
