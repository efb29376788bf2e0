//! Hub-side coordination: address allocation, forwarding, per-node pending
//! updates, and network health bookkeeping (§4.7-§4.9).
//!
//! This crate is `std` throughout — it runs on the hub's host, not on a
//! node's microcontroller — so it leans on `HashMap`/`VecDeque`/`String`
//! where `bramble-node-runtime` reaches for `heapless` equivalents.

pub mod address_manager;
pub mod network_stats;
pub mod router;

pub use address_manager::{AddressError, AddressManager, NodeInfo, DEFAULT_DEREGISTER_TIMEOUT_S, DEFAULT_INACTIVE_TIMEOUT_S};
pub use network_stats::{CriticalityCounters, GlobalCounters, LinkQuality, NetworkStats, PeerStats};
pub use router::{FrameSink, ForwardOutcome, HubRouter, HubRouterError, PendingUpdate, PendingUpdateKind, RouteEntry, UpdateDescription};
