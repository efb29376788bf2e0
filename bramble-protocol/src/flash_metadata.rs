//! `FlashRingMetadata`, the 4096-byte record persisted in the ring's
//! dedicated metadata sector (§3, §6 state persistence formats).

use crate::crc::crc32;

pub const METADATA_SIZE: usize = 4096;
pub const FLASH_MAGIC: u32 = 0x53454E53; // "SENS"
pub const FLASH_VERSION: u32 = 1;

/// In-RAM mirror of the on-flash metadata sector. Only the fixed-size
/// header fields are meaningful; the rest of the sector is reserved padding
/// kept at zero so `METADATA_SIZE` stays an exact sector multiple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashRingMetadata {
    pub magic: u32,
    pub version: u32,
    pub write_idx: u32,
    pub read_idx: u32,
    pub total_records: u32,
    pub records_transmitted: u32,
    pub records_lost: u32,
    pub last_sync_ts: u32,
    pub initial_boot_ts: u32,
}

const HEADER_LEN: usize = 4 + 4 + 4 + 4 + 4 + 4 + 4 + 4 + 4; // 36 bytes before CRC
const CRC_LEN: usize = 4;

impl FlashRingMetadata {
    pub fn fresh() -> Self {
        FlashRingMetadata {
            magic: FLASH_MAGIC,
            version: FLASH_VERSION,
            write_idx: 0,
            read_idx: 0,
            total_records: 0,
            records_transmitted: 0,
            records_lost: 0,
            last_sync_ts: 0,
            initial_boot_ts: 0,
        }
    }

    fn write_header(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4..8].copy_from_slice(&self.version.to_le_bytes());
        buf[8..12].copy_from_slice(&self.write_idx.to_le_bytes());
        buf[12..16].copy_from_slice(&self.read_idx.to_le_bytes());
        buf[16..20].copy_from_slice(&self.total_records.to_le_bytes());
        buf[20..24].copy_from_slice(&self.records_transmitted.to_le_bytes());
        buf[24..28].copy_from_slice(&self.records_lost.to_le_bytes());
        buf[28..32].copy_from_slice(&self.last_sync_ts.to_le_bytes());
        buf[32..36].copy_from_slice(&self.initial_boot_ts.to_le_bytes());
    }

    /// Serialize into a full `METADATA_SIZE` sector image: header, CRC32
    /// over the header, then zeroed padding out to the sector size.
    pub fn to_sector(&self) -> heapless::Vec<u8, METADATA_SIZE> {
        let mut header = [0u8; HEADER_LEN];
        self.write_header(&mut header);
        let crc = crc32(&header);

        let mut out: heapless::Vec<u8, METADATA_SIZE> = heapless::Vec::new();
        out.extend_from_slice(&header).ok();
        out.extend_from_slice(&crc.to_le_bytes()).ok();
        while out.len() < METADATA_SIZE {
            out.push(0).ok();
        }
        out
    }

    /// Parse and validate a sector image: magic, version, and CRC32 must all
    /// match. `None` means "no valid metadata" and the caller should
    /// reinitialize fresh (§4.4 `init`).
    pub fn from_sector(sector: &[u8]) -> Option<Self> {
        if sector.len() < HEADER_LEN + CRC_LEN {
            return None;
        }
        let header = &sector[..HEADER_LEN];
        let stored_crc = u32::from_le_bytes(sector[HEADER_LEN..HEADER_LEN + CRC_LEN].try_into().ok()?);
        if crc32(header) != stored_crc {
            return None;
        }

        let meta = FlashRingMetadata {
            magic: u32::from_le_bytes(header[0..4].try_into().ok()?),
            version: u32::from_le_bytes(header[4..8].try_into().ok()?),
            write_idx: u32::from_le_bytes(header[8..12].try_into().ok()?),
            read_idx: u32::from_le_bytes(header[12..16].try_into().ok()?),
            total_records: u32::from_le_bytes(header[16..20].try_into().ok()?),
            records_transmitted: u32::from_le_bytes(header[20..24].try_into().ok()?),
            records_lost: u32::from_le_bytes(header[24..28].try_into().ok()?),
            last_sync_ts: u32::from_le_bytes(header[28..32].try_into().ok()?),
            initial_boot_ts: u32::from_le_bytes(header[32..36].try_into().ok()?),
        };

        if meta.magic != FLASH_MAGIC || meta.version != FLASH_VERSION {
            return None;
        }
        Some(meta)
    }
}
