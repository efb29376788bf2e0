//! Node-side runtime: flash ring storage, reliable messaging, the PMU link,
//! and the wake-cycle state machine (§4.2-§4.7).
//!
//! Hardware is reached only through the `RadioPort`, `ExternalFlash`, and
//! `PmuTransport` traits, so the whole runtime builds and tests on a host
//! with in-memory mocks; `bramble-node-firmware` supplies the real STM32
//! implementations.

#![cfg_attr(not(test), no_std)]

pub mod batch_transmitter;
pub mod event_log_transmitter;
pub mod flash;
pub mod flash_ring;
pub mod heartbeat_client;
pub mod messenger;
pub mod pmu_link;
pub mod radio;
pub mod runtime;
pub mod task_queue;

pub use batch_transmitter::BatchTransmitter;
pub use event_log_transmitter::EventLogTransmitter;
pub use flash::{ExternalFlash, FlashError, PAGE_SIZE, SECTOR_SIZE};
pub use flash_ring::{FlashRing, FlashRingError, FlashRingStats};
pub use heartbeat_client::HeartbeatClient;
pub use messenger::{ReliableMessenger, SendOutcome};
pub use pmu_link::{PmuCommand, PmuError, PmuEvent, PmuLink, PmuTransport, ScheduleEntry, WakeReason};
pub use radio::{RadioError, RadioPort};
pub use runtime::{BaseState, NodeRuntime, NodeRuntimeConfig, NodeState, RuntimeError};
pub use task_queue::{Priority, TaskHandle, TaskQueue};
