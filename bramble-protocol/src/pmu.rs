//! `PmuPersistedState`, the 32-byte opaque blob the PMU stores across a
//! node's sleep/wake cycle (§4.5, testable property 8).

pub const PMU_STATE_SIZE: usize = 32;
pub const PMU_STATE_VERSION: u8 = 1;

/// Everything a node needs to resume correctly after a PMU-managed sleep:
/// its sequence counter, assigned address, and flash ring cursors. The PMU
/// treats this as an opaque blob; only the node interprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PmuPersistedState {
    pub version: u8,
    pub next_seq: u8,
    pub assigned_addr: u16,
    pub flash_read_idx: u32,
    pub flash_write_idx: u32,
}

impl PmuPersistedState {
    pub fn fresh() -> Self {
        PmuPersistedState {
            version: PMU_STATE_VERSION,
            next_seq: 0,
            assigned_addr: crate::address::Address::UNREGISTERED.as_u16(),
            flash_read_idx: 0,
            flash_write_idx: 0,
        }
    }

    pub fn to_bytes(&self) -> [u8; PMU_STATE_SIZE] {
        let mut buf = [0u8; PMU_STATE_SIZE];
        buf[0] = self.version;
        buf[1] = self.next_seq;
        buf[2..4].copy_from_slice(&self.assigned_addr.to_le_bytes());
        buf[4..8].copy_from_slice(&self.flash_read_idx.to_le_bytes());
        buf[8..12].copy_from_slice(&self.flash_write_idx.to_le_bytes());
        // buf[12..32] stays reserved, zeroed.
        buf
    }

    /// Unpack a blob round-tripped through the PMU. Unknown/zeroed blobs
    /// (first power-on, or a PMU that lost power) come back as `None` so the
    /// caller falls back to a fresh state rather than trusting garbage.
    pub fn from_bytes(buf: &[u8; PMU_STATE_SIZE]) -> Option<Self> {
        if buf[0] != PMU_STATE_VERSION {
            return None;
        }
        Some(PmuPersistedState {
            version: buf[0],
            next_seq: buf[1],
            assigned_addr: u16::from_le_bytes(buf[2..4].try_into().ok()?),
            flash_read_idx: u32::from_le_bytes(buf[4..8].try_into().ok()?),
            flash_write_idx: u32::from_le_bytes(buf[8..12].try_into().ok()?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_32_bytes() {
        let state = PmuPersistedState {
            version: PMU_STATE_VERSION,
            next_seq: 200,
            assigned_addr: 0x0042,
            flash_read_idx: 10,
            flash_write_idx: 55,
        };
        let bytes = state.to_bytes();
        assert_eq!(bytes.len(), PMU_STATE_SIZE);
        assert_eq!(PmuPersistedState::from_bytes(&bytes), Some(state));
    }

    #[test]
    fn all_zero_blob_is_rejected() {
        let blob = [0u8; PMU_STATE_SIZE];
        assert_eq!(PmuPersistedState::from_bytes(&blob), None);
    }
}
