//! Message payload bodies (§3 Message types). Each payload knows its own
//! fixed wire size and provides explicit LE `to_bytes`/`from_bytes`, mirroring
//! the fixed-struct payloads of the original `message.h` plus the payloads
//! the batch/update/event-log machinery adds.

use crate::address::Address;

/// A single sensor reading, sent live (not from the flash ring).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorPayload {
    pub timestamp: u32,
    pub temperature: i16,
    pub humidity: u16,
}

impl SensorPayload {
    pub const SIZE: usize = 8;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.timestamp.to_le_bytes());
        buf[4..6].copy_from_slice(&self.temperature.to_le_bytes());
        buf[6..8].copy_from_slice(&self.humidity.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() != Self::SIZE {
            return None;
        }
        Some(SensorPayload {
            timestamp: u32::from_le_bytes(buf[0..4].try_into().ok()?),
            temperature: i16::from_le_bytes(buf[4..6].try_into().ok()?),
            humidity: u16::from_le_bytes(buf[6..8].try_into().ok()?),
        })
    }
}

/// Hub -> node actuator command (e.g. "open valve for N seconds").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuatorPayload {
    pub actuator_id: u8,
    pub command: u8,
    pub value: u32,
}

impl ActuatorPayload {
    pub const SIZE: usize = 6;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = self.actuator_id;
        buf[1] = self.command;
        buf[2..6].copy_from_slice(&self.value.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() != Self::SIZE {
            return None;
        }
        Some(ActuatorPayload {
            actuator_id: buf[0],
            command: buf[1],
            value: u32::from_le_bytes(buf[2..6].try_into().ok()?),
        })
    }
}

/// Periodic liveness report sent node -> hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatPayload {
    pub battery_mv: u16,
    pub uptime_s: u32,
    pub pending_records: u16,
}

impl HeartbeatPayload {
    pub const SIZE: usize = 8;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..2].copy_from_slice(&self.battery_mv.to_le_bytes());
        buf[2..6].copy_from_slice(&self.uptime_s.to_le_bytes());
        buf[6..8].copy_from_slice(&self.pending_records.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() != Self::SIZE {
            return None;
        }
        Some(HeartbeatPayload {
            battery_mv: u16::from_le_bytes(buf[0..2].try_into().ok()?),
            uptime_s: u32::from_le_bytes(buf[2..6].try_into().ok()?),
            pending_records: u16::from_le_bytes(buf[6..8].try_into().ok()?),
        })
    }
}

/// Hub -> node response to a heartbeat: authoritative time, plus whether the
/// hub has a pending update waiting (§9 open question 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatResponsePayload {
    pub network_time: u32,
    pub has_pending_update: bool,
}

impl HeartbeatResponsePayload {
    pub const SIZE: usize = 5;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.network_time.to_le_bytes());
        buf[4] = self.has_pending_update as u8;
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() != Self::SIZE {
            return None;
        }
        Some(HeartbeatResponsePayload {
            network_time: u32::from_le_bytes(buf[0..4].try_into().ok()?),
            has_pending_update: buf[4] != 0,
        })
    }
}

/// An unregistered node's request for a network address. Carries a
/// `device_id` (the chip's unique serial) so the hub's `AddressManager` can
/// recognize a node that already holds an address and hand the same one
/// back rather than allocating a second slot for the same physical device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationPayload {
    pub device_id: u64,
    pub node_type: u8,
    pub firmware_version: u16,
}

impl RegistrationPayload {
    pub const SIZE: usize = 11;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..8].copy_from_slice(&self.device_id.to_le_bytes());
        buf[8] = self.node_type;
        buf[9..11].copy_from_slice(&self.firmware_version.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() != Self::SIZE {
            return None;
        }
        Some(RegistrationPayload {
            device_id: u64::from_le_bytes(buf[0..8].try_into().ok()?),
            node_type: buf[8],
            firmware_version: u16::from_le_bytes(buf[9..11].try_into().ok()?),
        })
    }
}

/// Hub's reply to a `RegistrationPayload`: the newly assigned address, with
/// `device_id` echoed back so a node can confirm the response was meant for
/// it rather than for another device that registered around the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationResponsePayload {
    pub device_id: u64,
    pub assigned_addr: Address,
    pub accepted: bool,
}

impl RegistrationResponsePayload {
    pub const SIZE: usize = 11;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..8].copy_from_slice(&self.device_id.to_le_bytes());
        buf[8..10].copy_from_slice(&self.assigned_addr.as_u16().to_le_bytes());
        buf[10] = self.accepted as u8;
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() != Self::SIZE {
            return None;
        }
        Some(RegistrationResponsePayload {
            device_id: u64::from_le_bytes(buf[0..8].try_into().ok()?),
            assigned_addr: Address::from_u16(u16::from_le_bytes(buf[8..10].try_into().ok()?)),
            accepted: buf[10] != 0,
        })
    }
}

/// Acknowledgement of a single reliable/critical message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckPayload {
    pub acked_seq: u8,
}

impl AckPayload {
    pub const SIZE: usize = 1;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        [self.acked_seq]
    }

    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() != Self::SIZE {
            return None;
        }
        Some(AckPayload { acked_seq: buf[0] })
    }
}

/// Node -> hub poll: "do you have anything newer than the update I last
/// applied?"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckUpdatesPayload {
    pub last_applied_seq: u8,
}

impl CheckUpdatesPayload {
    pub const SIZE: usize = 1;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        [self.last_applied_seq]
    }

    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() != Self::SIZE {
            return None;
        }
        Some(CheckUpdatesPayload {
            last_applied_seq: buf[0],
        })
    }
}

/// Hub -> node: a single configuration value the node should adopt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateAvailablePayload {
    pub seq: u8,
    pub kind: u8,
    pub index: u8,
    pub value: u32,
}

impl UpdateAvailablePayload {
    pub const SIZE: usize = 7;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = self.seq;
        buf[1] = self.kind;
        buf[2] = self.index;
        buf[3..7].copy_from_slice(&self.value.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() != Self::SIZE {
            return None;
        }
        Some(UpdateAvailablePayload {
            seq: buf[0],
            kind: buf[1],
            index: buf[2],
            value: u32::from_le_bytes(buf[3..7].try_into().ok()?),
        })
    }
}

/// One record inside a `SensorDataBatchPayload`: the stored reading plus its
/// ring index, so the hub's ack can tell the node how much of the batch it
/// actually persisted (§9 open question 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSensorRecord {
    pub timestamp: u32,
    pub temperature: i16,
    pub humidity: u16,
}

impl BatchSensorRecord {
    pub const SIZE: usize = 8;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.timestamp.to_le_bytes());
        buf[4..6].copy_from_slice(&self.temperature.to_le_bytes());
        buf[6..8].copy_from_slice(&self.humidity.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() != Self::SIZE {
            return None;
        }
        Some(BatchSensorRecord {
            timestamp: u32::from_le_bytes(buf[0..4].try_into().ok()?),
            temperature: i16::from_le_bytes(buf[4..6].try_into().ok()?),
            humidity: u16::from_le_bytes(buf[6..8].try_into().ok()?),
        })
    }
}

/// Maximum records in a single batch: fits the 247-byte payload ceiling
/// alongside the 7-byte header (`node_addr` + `start_index` + `record_count`).
pub const MAX_BATCH_RECORDS: usize = 29;

/// A catch-up transmission of several flash-ring records in one frame
/// (§4.3.1 BatchTransmitter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorDataBatchPayload {
    pub node_addr: Address,
    pub start_index: u32,
    pub records: heapless::Vec<BatchSensorRecord, MAX_BATCH_RECORDS>,
}

impl SensorDataBatchPayload {
    pub const HEADER_SIZE: usize = 7;

    pub fn encoded_len(&self) -> usize {
        Self::HEADER_SIZE + self.records.len() * BatchSensorRecord::SIZE
    }

    pub fn to_bytes(&self, out: &mut heapless::Vec<u8, 247>) -> Result<(), ()> {
        out.clear();
        out.extend_from_slice(&self.node_addr.as_u16().to_le_bytes())
            .map_err(|_| ())?;
        out.extend_from_slice(&self.start_index.to_le_bytes())
            .map_err(|_| ())?;
        out.push(self.records.len() as u8).map_err(|_| ())?;
        for rec in &self.records {
            out.extend_from_slice(&rec.to_bytes()).map_err(|_| ())?;
        }
        Ok(())
    }

    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::HEADER_SIZE {
            return None;
        }
        let node_addr = Address::from_u16(u16::from_le_bytes(buf[0..2].try_into().ok()?));
        let start_index = u32::from_le_bytes(buf[2..6].try_into().ok()?);
        let count = buf[6] as usize;
        if buf.len() != Self::HEADER_SIZE + count * BatchSensorRecord::SIZE {
            return None;
        }
        let mut records: heapless::Vec<BatchSensorRecord, MAX_BATCH_RECORDS> = heapless::Vec::new();
        for i in 0..count {
            let start = Self::HEADER_SIZE + i * BatchSensorRecord::SIZE;
            let rec = BatchSensorRecord::from_bytes(&buf[start..start + BatchSensorRecord::SIZE])?;
            records.push(rec).ok()?;
        }
        Some(SensorDataBatchPayload {
            node_addr,
            start_index,
            records,
        })
    }
}

/// Hub's acknowledgement of a batch: how many leading records it actually
/// persisted, so the node only advances its read cursor by that much
/// (§9 open question 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchAckPayload {
    pub ack_seq: u8,
    pub persisted_count: u8,
    pub status: u8,
}

impl BatchAckPayload {
    pub const SIZE: usize = 3;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        [self.ack_seq, self.persisted_count, self.status]
    }

    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() != Self::SIZE {
            return None;
        }
        Some(BatchAckPayload {
            ack_seq: buf[0],
            persisted_count: buf[1],
            status: buf[2],
        })
    }
}

/// One entry in an `EventLogPayload`: a code plus a small detail word,
/// timestamped (e.g. "flash sector erased", "radio init failed").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRecord {
    pub timestamp: u32,
    pub code: u8,
    pub detail: u16,
}

impl EventRecord {
    pub const SIZE: usize = 7;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.timestamp.to_le_bytes());
        buf[4] = self.code;
        buf[5..7].copy_from_slice(&self.detail.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() != Self::SIZE {
            return None;
        }
        Some(EventRecord {
            timestamp: u32::from_le_bytes(buf[0..4].try_into().ok()?),
            code: buf[4],
            detail: u16::from_le_bytes(buf[5..7].try_into().ok()?),
        })
    }
}

/// Maximum event records per frame: fits the 247-byte payload ceiling
/// alongside the 1-byte count header.
pub const MAX_EVENT_RECORDS: usize = 35;

/// A best-effort, unacknowledged drain of queued diagnostic events
/// (§4.3.1 EventLogTransmitter — sent fire-and-forget since there is no ack
/// to retry against; the node advances its own read index immediately).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventLogPayload {
    pub records: heapless::Vec<EventRecord, MAX_EVENT_RECORDS>,
}

impl EventLogPayload {
    pub const HEADER_SIZE: usize = 1;

    pub fn to_bytes(&self, out: &mut heapless::Vec<u8, 247>) -> Result<(), ()> {
        out.clear();
        out.push(self.records.len() as u8).map_err(|_| ())?;
        for rec in &self.records {
            out.extend_from_slice(&rec.to_bytes()).map_err(|_| ())?;
        }
        Ok(())
    }

    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.is_empty() {
            return None;
        }
        let count = buf[0] as usize;
        if buf.len() != Self::HEADER_SIZE + count * EventRecord::SIZE {
            return None;
        }
        let mut records: heapless::Vec<EventRecord, MAX_EVENT_RECORDS> = heapless::Vec::new();
        for i in 0..count {
            let start = Self::HEADER_SIZE + i * EventRecord::SIZE;
            let rec = EventRecord::from_bytes(&buf[start..start + EventRecord::SIZE])?;
            records.push(rec).ok()?;
        }
        Some(EventLogPayload { records })
    }
}
