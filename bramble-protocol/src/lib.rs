//! On-wire data model and codec shared by the Bramble hub and node runtimes.
//!
//! Every type in this crate is `no_std` and allocation-free: frames are encoded
//! into and decoded from caller-supplied byte slices, never a heap buffer.

#![cfg_attr(not(test), no_std)]

pub mod address;
pub mod codec;
pub mod crc;
pub mod error;
pub mod flags;
pub mod flash_metadata;
pub mod message_type;
pub mod payload;
pub mod pmu;
pub mod retry;
pub mod sensor_record;

pub use address::Address;
pub use codec::{Message, MessageCodec, MessageHeader, HEADER_SIZE, MAX_FRAME, MAX_PAYLOAD};
pub use error::CodecError;
pub use flags::Flags;
pub use flash_metadata::{FlashRingMetadata, FLASH_MAGIC, METADATA_SIZE};
pub use message_type::MessageType;
pub use pmu::{PmuPersistedState, PMU_STATE_SIZE};
pub use retry::{Criticality, RetryConfig, RETRY_TABLE};
pub use sensor_record::{SensorDataRecord, RECORD_FLAG_VALID, RECORD_SIZE, RECORD_TRANSMITTED, RECORD_NOT_TRANSMITTED};
