//! Codec error taxonomy (§4.1, §7 encode errors).

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("frame shorter than header or longer than MAX_FRAME")]
    InvalidLength,
    #[error("magic number mismatch")]
    BadMagic,
    #[error("unrecognized message type")]
    UnknownType,
    #[error("source or destination address not in the allowed set")]
    BadAddress,
    #[error("payload length invalid for this message type")]
    BadPayloadLength,
    #[error("encoded frame would not fit in the caller-supplied buffer")]
    BufferTooSmall,
}
