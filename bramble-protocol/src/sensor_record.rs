//! `SensorDataRecord`, the 12-byte unit stored in the flash ring (§3, §4.4).

use crate::crc::crc16;

pub const RECORD_SIZE: usize = 12;
pub const RECORD_FLAG_VALID: u8 = 0x02;
/// Erased NOR-flash state: "not yet transmitted".
pub const RECORD_NOT_TRANSMITTED: u8 = 0xFF;
/// Single-bit-clearing write: "transmitted".
pub const RECORD_TRANSMITTED: u8 = 0x00;

/// A single sensor reading as stored in external flash.
///
/// Deliberately not `#[repr(packed)]` plus a pointer cast: on-wire layout is
/// produced and consumed explicitly via `to_bytes`/`from_bytes` so there is
/// never an unaligned read through a reinterpreted pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorDataRecord {
    pub timestamp: u32,
    pub temperature: i16,
    pub humidity: u16,
    pub flags: u8,
    pub tx_status: u8,
    pub crc16: u16,
}

impl SensorDataRecord {
    pub fn new(timestamp: u32, temperature: i16, humidity: u16) -> Self {
        let mut rec = SensorDataRecord {
            timestamp,
            temperature,
            humidity,
            flags: RECORD_FLAG_VALID,
            tx_status: RECORD_NOT_TRANSMITTED,
            crc16: 0,
        };
        rec.crc16 = rec.compute_crc();
        rec
    }

    pub fn is_valid(&self) -> bool {
        self.flags & RECORD_FLAG_VALID != 0
    }

    pub fn is_transmitted(&self) -> bool {
        self.tx_status != RECORD_NOT_TRANSMITTED
    }

    /// CRC over the record with `tx_status` normalized to `0x00`, so the
    /// single `0xFF -> 0x00` write that marks a record transmitted never
    /// invalidates the stored CRC (§3 invariants, property 4).
    pub fn compute_crc(&self) -> u16 {
        let mut normalized = *self;
        normalized.tx_status = RECORD_TRANSMITTED;
        let mut buf = [0u8; RECORD_SIZE];
        normalized.write_fields(&mut buf);
        crc16(&buf[..RECORD_SIZE - 2])
    }

    pub fn crc_is_valid(&self) -> bool {
        self.compute_crc() == self.crc16
    }

    fn write_fields(&self, buf: &mut [u8; RECORD_SIZE]) {
        buf[0..4].copy_from_slice(&self.timestamp.to_le_bytes());
        buf[4..6].copy_from_slice(&self.temperature.to_le_bytes());
        buf[6..8].copy_from_slice(&self.humidity.to_le_bytes());
        buf[8] = self.flags;
        buf[9] = self.tx_status;
        buf[10..12].copy_from_slice(&self.crc16.to_le_bytes());
    }

    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        self.write_fields(&mut buf);
        buf
    }

    pub fn from_bytes(buf: &[u8; RECORD_SIZE]) -> Self {
        SensorDataRecord {
            timestamp: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            temperature: i16::from_le_bytes(buf[4..6].try_into().unwrap()),
            humidity: u16::from_le_bytes(buf[6..8].try_into().unwrap()),
            flags: buf[8],
            tx_status: buf[9],
            crc16: u16::from_le_bytes(buf[10..12].try_into().unwrap()),
        }
    }

    /// Mark transmitted in place, recomputing nothing: the CRC is already
    /// valid for `tx_status = 0x00` by construction (§3, §4.4).
    pub fn mark_transmitted(&mut self) {
        self.tx_status = RECORD_TRANSMITTED;
    }
}
