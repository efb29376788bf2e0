//! Serial link to the hub's LoRa radio co-processor.
//!
//! The `bramble_protocol` wire frame itself carries no length field (§3: the
//! radio hands up whole packets, so the header is a fixed 9 bytes and the
//! payload is simply whatever follows); that only works because the radio
//! already knows packet boundaries. A byte-stream serial link doesn't, so
//! the co-processor wraps each frame it hands upward in its own two-byte
//! little-endian length prefix, followed by a 4-byte radio-quality trailer
//! (`rssi: i16 LE`, `snr: i16 LE`) it captured off the air. This framing is
//! this service's own invention (§9.3 of DESIGN.md) — the original talked to
//! the radio directly over SPI and never needed to frame a byte stream.
//! Frames the hub writes back carry the same length prefix but no trailer.

use bramble_hub_runtime::FrameSink;
use bramble_protocol::Address;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

/// Bytes appended by the co-processor after each received frame.
const RADIO_META_SIZE: usize = 4;
/// Size of this link's own length prefix, wide enough for `MAX_FRAME` (256).
const LENGTH_PREFIX_SIZE: usize = 2;

/// Read one length-prefixed frame plus its radio-quality trailer off `port`.
pub async fn read_frame<R: AsyncReadExt + Unpin>(
    port: &mut R,
) -> std::io::Result<(Vec<u8>, i16, i16)> {
    let mut len_buf = [0u8; LENGTH_PREFIX_SIZE];
    port.read_exact(&mut len_buf).await?;
    let frame_len = u16::from_le_bytes(len_buf) as usize;

    let mut rest = vec![0u8; frame_len + RADIO_META_SIZE];
    port.read_exact(&mut rest).await?;

    let meta_at = frame_len;
    let rssi = i16::from_le_bytes([rest[meta_at], rest[meta_at + 1]]);
    let snr = i16::from_le_bytes([rest[meta_at + 2], rest[meta_at + 3]]);

    let frame = rest[..meta_at].to_vec();
    Ok((frame, rssi, snr))
}

/// Owns the write half of the serial link. Runs as its own task so
/// `FrameSink::send_frame` (called synchronously from the dispatch path)
/// never has to block on I/O itself.
pub async fn run_writer<W: AsyncWriteExt + Unpin>(
    mut port: W,
    mut frames: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    while let Some(frame) = frames.recv().await {
        let len_prefix = (frame.len() as u16).to_le_bytes();
        if let Err(err) = port.write_all(&len_prefix).await {
            tracing::error!(?err, "failed to write frame length prefix to radio co-processor");
            continue;
        }
        if let Err(err) = port.write_all(&frame).await {
            tracing::error!(?err, "failed to write frame to radio co-processor");
        }
    }
}

/// `FrameSink` that hands frames off to the writer task via an unbounded
/// channel rather than writing to the port itself.
#[derive(Clone)]
pub struct SerialSink {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl SerialSink {
    pub fn new(tx: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        SerialSink { tx }
    }
}

impl FrameSink for SerialSink {
    fn send_frame(&mut self, dst: Address, frame: &[u8]) -> bool {
        match self.tx.send(frame.to_vec()) {
            Ok(()) => true,
            Err(_) => {
                tracing::error!(?dst, "writer task gone, dropping frame");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn reads_length_prefixed_frame_and_radio_trailer() {
        let payload_frame = [0u8; bramble_protocol::HEADER_SIZE].to_vec();
        let mut bytes = (payload_frame.len() as u16).to_le_bytes().to_vec();
        bytes.extend_from_slice(&payload_frame);
        bytes.extend_from_slice(&(-42i16).to_le_bytes()); // rssi
        bytes.extend_from_slice(&(7i16).to_le_bytes()); // snr

        let mut cursor = Cursor::new(bytes.clone());
        let (frame, rssi, snr) = read_frame(&mut cursor).await.unwrap();

        assert_eq!(frame, payload_frame);
        assert_eq!(rssi, -42);
        assert_eq!(snr, 7);
    }

    #[tokio::test]
    async fn sink_forwards_to_writer_channel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sink = SerialSink::new(tx);
        assert!(sink.send_frame(Address::from_u16(3), &[1, 2, 3]));
        assert_eq!(rx.recv().await, Some(vec![1, 2, 3]));
    }
}
