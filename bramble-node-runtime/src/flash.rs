//! External NOR flash capability set (§4.4, grounded in the original
//! `sensor_flash_buffer.cpp` access pattern: page-aligned program, sector-
//! aligned erase, bits only ever clear from 1 to 0).

pub const PAGE_SIZE: usize = 256;
pub const SECTOR_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FlashError {
    #[error("address or length not aligned to the required boundary")]
    Misaligned,
    #[error("address is outside the device's addressable range")]
    OutOfRange,
    #[error("underlying transport/device reported a fault")]
    DeviceFault,
}

/// A byte-addressable external NOR flash device.
///
/// `write_page` may only clear bits (it targets already-erased or
/// partially-written regions); callers never rely on a write to set an
/// erased bit back to `0xFF` without a prior `erase_sector`.
pub trait ExternalFlash {
    fn capacity_bytes(&self) -> u32;

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), FlashError>;

    /// Program up to `PAGE_SIZE` bytes starting at `addr`. `addr` need not be
    /// page-aligned, but `addr..addr+data.len()` must not cross a page
    /// boundary.
    fn write_page(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError>;

    /// Erase the `SECTOR_SIZE`-aligned sector containing `addr`, setting
    /// every byte in it back to `0xFF`.
    fn erase_sector(&mut self, addr: u32) -> Result<(), FlashError>;
}
