//! CRC helpers. Flash records use CRC-16/IBM-3740 (the same table the
//! reference firmware hand-rolled); flash metadata uses CRC-32/ISO-HDLC.

use crc::{Crc, CRC_16_IBM_3740, CRC_32_ISO_HDLC};

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);
const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

pub fn crc16(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}

pub fn crc32(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc16_is_deterministic_and_sensitive_to_every_byte() {
        let a = crc16(b"bramble");
        let b = crc16(b"bramblf");
        assert_ne!(a, b);
        assert_eq!(a, crc16(b"bramble"));
    }
}
