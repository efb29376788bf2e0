//! Reliable delivery over a lossy half-duplex link (§4.3, grounded in the
//! original `reliable_messenger.h`/`retry_policy.h`): per-criticality retry
//! with exponential backoff, and receive-side deduplication by
//! `(src, seq)` so a retried send is never delivered to the application
//! twice.

use bramble_protocol::payload::AckPayload;
use bramble_protocol::{
    Address, CodecError, Criticality, Flags, Message, MessageCodec, MessageType, MAX_FRAME,
};

use crate::radio::{RadioError, RadioPort};

pub const MAX_PENDING: usize = 8;
/// How long a `(src, seq)` pair is remembered for duplicate suppression
/// (§3 SeenMessage).
pub const DEDUP_TTL_MS: u32 = 30_000;
const DEDUP_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MessengerError {
    #[error(transparent)]
    Radio(RadioError),
    #[error(transparent)]
    Codec(CodecError),
    #[error("no room left to track another in-flight reliable send")]
    PendingFull,
}

impl From<RadioError> for MessengerError {
    fn from(e: RadioError) -> Self {
        MessengerError::Radio(e)
    }
}

impl From<CodecError> for MessengerError {
    fn from(e: CodecError) -> Self {
        MessengerError::Codec(e)
    }
}

/// What `update()` reports happened to a previously pending send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Retried { seq: u8, attempt: u8 },
    GaveUp { seq: u8 },
}

#[derive(Clone)]
struct PendingSend {
    dst: Address,
    seq: u8,
    criticality: Criticality,
    attempts_made: u8,
    next_retry_ms: u32,
    frame: heapless::Vec<u8, MAX_FRAME>,
}

#[derive(Clone, Copy)]
struct DedupEntry {
    src: Address,
    seq: u8,
    expires_ms: u32,
}

pub struct ReliableMessenger<R: RadioPort> {
    radio: R,
    own_addr: Address,
    next_seq: u8,
    pending: heapless::Vec<PendingSend, MAX_PENDING>,
    dedup: heapless::Vec<DedupEntry, DEDUP_CAPACITY>,
    dedup_cursor: usize,
}

impl<R: RadioPort> ReliableMessenger<R> {
    /// `seq_base`/`seq_top` bound the node's half of the sequence-number
    /// space (§3 Sequence numbers: hub uses 1-127, nodes use 128-255, 0 is
    /// reserved and skipped).
    pub fn new(radio: R, own_addr: Address, seq_base: u8) -> Self {
        ReliableMessenger {
            radio,
            own_addr,
            next_seq: seq_base.max(1),
            pending: heapless::Vec::new(),
            dedup: heapless::Vec::new(),
            dedup_cursor: 0,
        }
    }

    fn alloc_seq(&mut self, seq_base: u8, seq_top: u8) -> u8 {
        let seq = self.next_seq;
        let next = if self.next_seq >= seq_top {
            seq_base
        } else {
            self.next_seq + 1
        };
        self.next_seq = if next == 0 { seq_base.max(1) } else { next };
        seq
    }

    /// Encode and transmit `payload` once, tracking it for retry if its
    /// criticality requires an ack.
    pub fn send(
        &mut self,
        dst: Address,
        msg_type: MessageType,
        criticality: Criticality,
        payload: &[u8],
        now_ms: u32,
        seq_base: u8,
        seq_top: u8,
    ) -> Result<u8, MessengerError> {
        let seq = self.alloc_seq(seq_base, seq_top);
        let flags = Flags::from_criticality(criticality);
        let message = Message::new(self.own_addr, dst, msg_type, seq, flags, payload)?;

        let mut buf = [0u8; MAX_FRAME];
        let len = MessageCodec::encode(&message, &mut buf)?;
        self.radio.send(&buf[..len])?;

        if criticality != Criticality::BestEffort {
            let mut frame = heapless::Vec::new();
            frame.extend_from_slice(&buf[..len]).ok();
            let cfg = criticality.config();
            let pending = PendingSend {
                dst,
                seq,
                criticality,
                attempts_made: 1,
                next_retry_ms: now_ms.wrapping_add(cfg.delay_for_attempt(1)),
                frame,
            };
            if self.pending.push(pending).is_err() {
                return Err(MessengerError::PendingFull);
            }
        }
        Ok(seq)
    }

    /// Drive retries. Call frequently from the node's main loop; resends
    /// whatever is due and drops (reporting `GaveUp`) anything whose
    /// criticality's retry policy has been exhausted.
    pub fn update(&mut self, now_ms: u32) -> heapless::Vec<SendOutcome, MAX_PENDING> {
        let mut outcomes = heapless::Vec::new();
        let mut i = 0;
        while i < self.pending.len() {
            if now_ms.wrapping_sub(self.pending[i].next_retry_ms) as i32 >= 0 {
                let cfg = self.pending[i].criticality.config();
                if cfg.should_retry(self.pending[i].attempts_made) {
                    let frame = self.pending[i].frame.clone();
                    let _ = self.radio.send(&frame);
                    self.pending[i].attempts_made += 1;
                    let attempt = self.pending[i].attempts_made;
                    self.pending[i].next_retry_ms =
                        now_ms.wrapping_add(cfg.delay_for_attempt(attempt as u32));
                    outcomes
                        .push(SendOutcome::Retried {
                            seq: self.pending[i].seq,
                            attempt,
                        })
                        .ok();
                    i += 1;
                } else {
                    let seq = self.pending[i].seq;
                    self.pending.swap_remove(i);
                    outcomes.push(SendOutcome::GaveUp { seq }).ok();
                }
            } else {
                i += 1;
            }
        }
        outcomes
    }

    pub fn on_ack(&mut self, seq: u8) -> bool {
        if let Some(pos) = self.pending.iter().position(|p| p.seq == seq) {
            self.pending.swap_remove(pos);
            true
        } else {
            false
        }
    }

    pub fn cancel(&mut self, seq: u8) -> bool {
        self.on_ack(seq)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn remember(&mut self, src: Address, seq: u8, now_ms: u32) {
        let entry = DedupEntry {
            src,
            seq,
            expires_ms: now_ms.wrapping_add(DEDUP_TTL_MS),
        };
        if self.dedup.push(entry).is_err() {
            self.dedup[self.dedup_cursor] = entry;
            self.dedup_cursor = (self.dedup_cursor + 1) % DEDUP_CAPACITY;
        }
    }

    fn is_duplicate(&self, src: Address, seq: u8, now_ms: u32) -> bool {
        self.dedup
            .iter()
            .any(|e| e.src == src && e.seq == seq && (now_ms.wrapping_sub(e.expires_ms) as i32) < 0)
    }

    /// Poll the radio for an inbound frame. Handles acks internally
    /// (removing the matching pending send) and returns `Ok(None)` for
    /// those, for duplicates, and when nothing has arrived. Anything else
    /// decodes successfully and is handed to the caller exactly once.
    ///
    /// A `RELIABLE` frame is ACKed here, before the dedup check, so a
    /// replayed send still converges the far end's retry even though its
    /// payload is not handed to the caller a second time (§4.3 ACK
    /// semantics).
    pub fn poll_receive(&mut self, now_ms: u32) -> Result<Option<Message>, MessengerError> {
        let mut buf = [0u8; MAX_FRAME];
        let len = match self.radio.try_receive(&mut buf)? {
            Some(len) => len,
            None => return Ok(None),
        };
        let message = MessageCodec::decode(&buf[..len])?;

        if message.header.msg_type == MessageType::Ack {
            if let Some(&acked) = message.payload.first() {
                self.on_ack(acked);
            }
            return Ok(None);
        }

        if message.header.flags.is_reliable() {
            self.send_ack(message.header.src, message.header.seq);
        }

        if self.is_duplicate(message.header.src, message.header.seq, now_ms) {
            return Ok(None);
        }
        self.remember(message.header.src, message.header.seq, now_ms);
        Ok(Some(message))
    }

    /// Send a best-effort `Ack` frame for `acked_seq` back to `dst`. Acks are
    /// fire-and-forget: a lost ack simply means the peer retries, which
    /// re-triggers this same path.
    fn send_ack(&mut self, dst: Address, acked_seq: u8) {
        let payload = AckPayload { acked_seq };
        if let Ok(msg) = Message::new(
            self.own_addr,
            dst,
            MessageType::Ack,
            0,
            Flags::NONE,
            &payload.to_bytes(),
        ) {
            let mut buf = [0u8; MAX_FRAME];
            if let Ok(len) = MessageCodec::encode(&msg, &mut buf) {
                let _ = self.radio.send(&buf[..len]);
            }
        }
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn own_addr(&self) -> Address {
        self.own_addr
    }

    /// Adopt a newly assigned address after registration completes.
    pub fn set_own_addr(&mut self, addr: Address) {
        self.own_addr = addr;
    }

    /// Restore the sequence counter from a wake-cycle state blob (§4.5 step
    /// 3, §9 open question: the dedup/retry contract only holds across
    /// sleeps if `next_seq` survives with it).
    pub fn restore_seq(&mut self, seq: u8) {
        self.next_seq = seq;
    }

    /// The sequence number that will be assigned to the next send, for
    /// persisting into a wake-cycle state blob before sleeping.
    pub fn next_seq(&self) -> u8 {
        self.next_seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::mock::MockRadio;
    use bramble_protocol::payload::AckPayload;

    fn messenger() -> ReliableMessenger<MockRadio> {
        ReliableMessenger::new(MockRadio::new(), Address::from_u16(7), 128)
    }

    #[test]
    fn best_effort_send_never_becomes_pending() {
        let mut m = messenger();
        m.send(
            Address::HUB,
            MessageType::Heartbeat,
            Criticality::BestEffort,
            &[],
            0,
            128,
            255,
        )
        .unwrap();
        assert_eq!(m.pending_count(), 0);
    }

    #[test]
    fn reliable_send_retries_then_gives_up() {
        let mut m = messenger();
        m.send(
            Address::HUB,
            MessageType::SensorData,
            Criticality::Reliable,
            &[1, 2],
            0,
            128,
            255,
        )
        .unwrap();
        assert_eq!(m.pending_count(), 1);

        let mut now = 0u32;
        let mut gave_up = false;
        for _ in 0..10 {
            now += 6_000;
            for outcome in m.update(now) {
                if let SendOutcome::GaveUp { .. } = outcome {
                    gave_up = true;
                }
            }
        }
        assert!(gave_up);
        assert_eq!(m.pending_count(), 0);
    }

    #[test]
    fn ack_clears_the_pending_send() {
        let mut m = messenger();
        let seq = m
            .send(
                Address::HUB,
                MessageType::SensorData,
                Criticality::Reliable,
                &[9],
                0,
                128,
                255,
            )
            .unwrap();
        assert!(m.on_ack(seq));
        assert_eq!(m.pending_count(), 0);
    }

    #[test]
    fn duplicate_receive_is_suppressed() {
        let mut m = messenger();
        let msg = Message::new(
            Address::HUB,
            Address::from_u16(7),
            MessageType::ActuatorCmd,
            5,
            Flags::NONE,
            &[1],
        )
        .unwrap();
        let mut buf = [0u8; MAX_FRAME];
        let len = MessageCodec::encode(&msg, &mut buf).unwrap();

        m.radio_mut().inject_rx(&buf[..len]);
        m.radio_mut().inject_rx(&buf[..len]);

        let first = m.poll_receive(0).unwrap();
        assert!(first.is_some());
        let second = m.poll_receive(0).unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn reliable_duplicate_is_acked_twice_but_delivered_once() {
        // Testable property 1 (§8): an ack is emitted on every reception of
        // a reliable frame, even a replay, but the payload reaches the
        // caller at most once.
        let mut m = messenger();
        let msg = Message::new(
            Address::HUB,
            Address::from_u16(7),
            MessageType::ActuatorCmd,
            5,
            Flags::from_criticality(Criticality::Reliable),
            &[1],
        )
        .unwrap();
        let mut buf = [0u8; MAX_FRAME];
        let len = MessageCodec::encode(&msg, &mut buf).unwrap();

        m.radio_mut().inject_rx(&buf[..len]);
        m.radio_mut().inject_rx(&buf[..len]);

        let first = m.poll_receive(0).unwrap();
        assert!(first.is_some());
        let second = m.poll_receive(0).unwrap();
        assert!(second.is_none());

        assert_eq!(m.radio_mut().sent.len(), 2, "ack sent on every reception");
        for ack_bytes in &m.radio_mut().sent {
            let decoded = MessageCodec::decode(ack_bytes).unwrap();
            assert_eq!(decoded.header.msg_type, MessageType::Ack);
            assert_eq!(
                AckPayload::from_bytes(&decoded.payload).unwrap().acked_seq,
                5
            );
        }
    }

    #[test]
    fn incoming_ack_frame_clears_pending_via_poll_receive() {
        let mut m = messenger();
        let seq = m
            .send(
                Address::HUB,
                MessageType::SensorData,
                Criticality::Reliable,
                &[1],
                0,
                128,
                255,
            )
            .unwrap();

        let ack = Message::new(
            Address::HUB,
            Address::from_u16(7),
            MessageType::Ack,
            1,
            Flags::NONE,
            &AckPayload { acked_seq: seq }.to_bytes(),
        )
        .unwrap();
        let mut buf = [0u8; MAX_FRAME];
        let len = MessageCodec::encode(&ack, &mut buf).unwrap();
        m.radio_mut().inject_rx(&buf[..len]);

        let received = m.poll_receive(0).unwrap();
        assert!(received.is_none());
        assert_eq!(m.pending_count(), 0);
    }
}
