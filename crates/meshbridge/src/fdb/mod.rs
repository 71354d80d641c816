//! Forwarding database (MAC learning) for the bridge.
//!
//! The FDB maps station MAC addresses to the port they were last seen on.
//! Entries age out, can be pinned static/local, and may carry a "direct"
//! port when a one-hop mesh shortcut to the station is known.
//!
//! Lookups and learns run concurrently from the packet path; the table is
//! sharded so unrelated addresses never serialize on one lock.

mod table;
mod types;

pub use table::{Fdb, FdbStats};
pub use types::{EntryClass, FdbDumpEntry, FdbEntry, FdbKey, FdbLookup};
