//! Framed, sequence-numbered, ACKed serial protocol to the power-management
//! unit (§4.5, §6, grounded in the original `pmu_protocol.h`/
//! `pmu_reliability.h`): `START(0xAA) len seq cmd data... checksum END(0x55)`,
//! acked and retried like the radio link but over a dedicated half-duplex
//! UART rather than the lossy shared medium.
//!
//! The node side keeps at most one command in flight; everything else queued
//! behind it waits its turn. Retries never give up — a PMU that stops
//! answering is retried indefinitely at the capped interval (§7 "PMU protocol
//! failures: retried indefinitely by `PmuLink`").

use bramble_protocol::{PmuPersistedState, PMU_STATE_SIZE};

pub const PMU_FRAME_START: u8 = 0xAA;
pub const PMU_FRAME_END: u8 = 0x55;
const MAX_FRAME: usize = 48;
const MAX_DATA: usize = 40;
pub const QUEUE_CAPACITY: usize = 8;
pub const DEDUP_CAPACITY: usize = 8;
pub const DEDUP_TTL_MS: u32 = 5_000;
const RETRY_BASE_MS: u32 = 500;
const RETRY_MAX_MS: u32 = 5_000;

/// Node's half of the PMU sequence space (§4.5: node 1..127, PMU 128..254).
const NODE_SEQ_MIN: u8 = 1;
const NODE_SEQ_MAX: u8 = 127;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PmuError {
    #[error("transport reported a fault")]
    Transport,
    #[error("frame missing START/END markers or malformed length")]
    Framing,
    #[error("checksum did not match the frame body")]
    BadChecksum,
    #[error("encoded frame would not fit in the caller's buffer")]
    BufferTooSmall,
    #[error("no room left to queue another PMU command")]
    QueueFull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PmuCommand {
    SetWakeInterval = 0x10,
    GetWakeInterval = 0x11,
    SetSchedule = 0x12,
    GetSchedule = 0x13,
    ClearSchedule = 0x14,
    KeepAwake = 0x15,
    SetDateTime = 0x16,
    ReadyForSleep = 0x17,
    GetDateTime = 0x18,
    ClearToSend = 0x19,
    SystemReset = 0x1A,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum PmuResponse {
    Ack = 0x80,
    Nack = 0x81,
    WakeIntervalResponse = 0x82,
    ScheduleResponse = 0x83,
    DateTimeResponse = 0x84,
    WakeNotification = 0x85,
    ScheduleComplete = 0x86,
}

impl PmuResponse {
    fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0x80 => PmuResponse::Ack,
            0x81 => PmuResponse::Nack,
            0x82 => PmuResponse::WakeIntervalResponse,
            0x83 => PmuResponse::ScheduleResponse,
            0x84 => PmuResponse::DateTimeResponse,
            0x85 => PmuResponse::WakeNotification,
            0x86 => PmuResponse::ScheduleComplete,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WakeReason {
    Periodic = 0,
    Scheduled = 1,
    External = 2,
}

impl WakeReason {
    fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => WakeReason::Periodic,
            1 => WakeReason::Scheduled,
            2 => WakeReason::External,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub index: u8,
    pub hour: u8,
    pub minute: u8,
    pub enabled: bool,
}

impl ScheduleEntry {
    const SIZE: usize = 4;

    fn to_bytes(self) -> [u8; Self::SIZE] {
        [self.index, self.hour, self.minute, self.enabled as u8]
    }

    fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() != Self::SIZE {
            return None;
        }
        Some(ScheduleEntry {
            index: buf[0],
            hour: buf[1],
            minute: buf[2],
            enabled: buf[3] != 0,
        })
    }
}

/// Events surfaced by `poll`. Node-assigned command sequence numbers let the
/// caller correlate a response back to the command it issued via `post`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PmuEvent {
    Ack { seq: u8, cmd: u8 },
    Nack { seq: u8, cmd: u8, reason: u8 },
    WakeIntervalResponse { seq: u8, interval_s: u32 },
    ScheduleResponse { seq: u8, entry: ScheduleEntry },
    DateTimeResponse { seq: u8, unix_ts: u32 },
    /// Unsolicited: the PMU just woke the node. `state` is `None` when
    /// `state_valid` was false or the blob failed to parse (version
    /// mismatch) — either way the caller must cold-start (§4.5 step 3).
    WakeNotification {
        reason: WakeReason,
        schedule: Option<ScheduleEntry>,
        state_valid: bool,
        state: Option<PmuPersistedState>,
    },
    ScheduleComplete { index: u8 },
}

/// A full-duplex byte transport to the PMU. Implementations own the UART
/// (or equivalent); frames crossing this trait are already PMU-protocol
/// encoded.
pub trait PmuTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<(), PmuError>;
    fn try_read(&mut self, buf: &mut [u8]) -> Result<Option<usize>, PmuError>;
}

fn checksum(len_through_data: &[u8]) -> u8 {
    len_through_data.iter().fold(0u8, |acc, &b| acc ^ b)
}

/// Delay before retry attempt `n` (1-indexed): `min(500ms * 2^(n-1), 5s)`.
fn retry_delay_ms(attempt: u32) -> u32 {
    let shift = attempt.saturating_sub(1).min(31);
    RETRY_BASE_MS.saturating_mul(1u32 << shift).min(RETRY_MAX_MS)
}

#[derive(Clone)]
struct PendingCommand {
    seq: u8,
    cmd: u8,
    data: heapless::Vec<u8, MAX_DATA>,
    attempts_made: u8,
    next_retry_ms: u32,
    in_flight: bool,
}

#[derive(Clone, Copy)]
struct DedupEntry {
    seq: u8,
    expires_ms: u32,
}

pub struct PmuLink<T: PmuTransport> {
    transport: T,
    next_seq: u8,
    queue: heapless::Vec<PendingCommand, QUEUE_CAPACITY>,
    dedup: heapless::Vec<DedupEntry, DEDUP_CAPACITY>,
    dedup_cursor: usize,
}

impl<T: PmuTransport> PmuLink<T> {
    pub fn new(transport: T) -> Self {
        PmuLink {
            transport,
            next_seq: NODE_SEQ_MIN,
            queue: heapless::Vec::new(),
            dedup: heapless::Vec::new(),
            dedup_cursor: 0,
        }
    }

    fn alloc_seq(&mut self) -> u8 {
        let seq = self.next_seq;
        self.next_seq = if self.next_seq >= NODE_SEQ_MAX {
            NODE_SEQ_MIN
        } else {
            self.next_seq + 1
        };
        seq
    }

    fn encode(seq: u8, cmd: u8, data: &[u8], out: &mut heapless::Vec<u8, MAX_FRAME>) -> Result<(), PmuError> {
        let len = 2 + data.len();
        out.clear();
        out.push(PMU_FRAME_START).map_err(|_| PmuError::BufferTooSmall)?;
        out.push(len as u8).map_err(|_| PmuError::BufferTooSmall)?;
        out.push(seq).map_err(|_| PmuError::BufferTooSmall)?;
        out.push(cmd).map_err(|_| PmuError::BufferTooSmall)?;
        out.extend_from_slice(data).map_err(|_| PmuError::BufferTooSmall)?;
        let sum = checksum(&out[1..1 + 1 + 2 + data.len()]);
        out.push(sum).map_err(|_| PmuError::BufferTooSmall)?;
        out.push(PMU_FRAME_END).map_err(|_| PmuError::BufferTooSmall)?;
        Ok(())
    }

    fn decode(frame: &[u8]) -> Result<(u8, u8, &[u8]), PmuError> {
        if frame.len() < 6 || frame[0] != PMU_FRAME_START || *frame.last().unwrap() != PMU_FRAME_END {
            return Err(PmuError::Framing);
        }
        let len = frame[1] as usize;
        if len < 2 || frame.len() != 1 + 1 + len + 1 + 1 {
            return Err(PmuError::Framing);
        }
        let checksummed = &frame[1..1 + 1 + len];
        let stored_checksum = frame[1 + 1 + len];
        if checksum(checksummed) != stored_checksum {
            return Err(PmuError::BadChecksum);
        }
        let seq = frame[2];
        let cmd = frame[3];
        let data = &frame[4..4 + len - 2];
        Ok((seq, cmd, data))
    }

    fn send_frame(&mut self, seq: u8, cmd: u8, data: &[u8]) -> Result<(), PmuError> {
        let mut out = heapless::Vec::new();
        Self::encode(seq, cmd, data, &mut out)?;
        self.transport.write(&out)
    }

    /// Queue `cmd` for delivery. If nothing else is in flight it is sent
    /// immediately; otherwise it waits behind the current in-flight command
    /// (§4.5: "maintains at most one in-flight command").
    pub fn post(&mut self, cmd: PmuCommand, data: &[u8], now_ms: u32) -> Result<u8, PmuError> {
        let seq = self.alloc_seq();
        let mut bytes: heapless::Vec<u8, MAX_DATA> = heapless::Vec::new();
        bytes.extend_from_slice(data).map_err(|_| PmuError::BufferTooSmall)?;

        let pending = PendingCommand {
            seq,
            cmd: cmd as u8,
            data: bytes,
            attempts_made: 0,
            next_retry_ms: now_ms,
            in_flight: false,
        };
        let was_empty = self.queue.is_empty();
        self.queue.push(pending).map_err(|_| PmuError::QueueFull)?;
        if was_empty {
            self.dispatch_front(now_ms)?;
        }
        Ok(seq)
    }

    fn dispatch_front(&mut self, now_ms: u32) -> Result<(), PmuError> {
        if let Some(front) = self.queue.first_mut() {
            front.in_flight = true;
            front.attempts_made = 1;
            front.next_retry_ms = now_ms.wrapping_add(retry_delay_ms(1));
            let (seq, cmd, data) = (front.seq, front.cmd, front.data.clone());
            self.send_frame(seq, cmd, &data)?;
        }
        Ok(())
    }

    /// Drive retries. Returns the sequence number retried, if any was due.
    pub fn update(&mut self, now_ms: u32) -> Result<Option<u8>, PmuError> {
        let needs_dispatch = matches!(self.queue.first(), Some(f) if !f.in_flight);
        if needs_dispatch {
            self.dispatch_front(now_ms)?;
            return Ok(None);
        }
        let Some(front) = self.queue.first_mut() else {
            return Ok(None);
        };
        if now_ms.wrapping_sub(front.next_retry_ms) as i32 >= 0 {
            front.attempts_made = front.attempts_made.saturating_add(1);
            let attempt = front.attempts_made;
            front.next_retry_ms = now_ms.wrapping_add(retry_delay_ms(attempt as u32));
            let (seq, cmd, data) = (front.seq, front.cmd, front.data.clone());
            self.send_frame(seq, cmd, &data)?;
            Ok(Some(seq))
        } else {
            Ok(None)
        }
    }

    /// Drop the in-flight command on ack/nack and dispatch whatever is
    /// queued behind it. Returns `true` if `seq` matched the front entry.
    fn complete_front(&mut self, seq: u8, now_ms: u32) -> Result<bool, PmuError> {
        if matches!(self.queue.first(), Some(f) if f.seq == seq) {
            self.queue.remove(0);
            if !self.queue.is_empty() {
                self.dispatch_front(now_ms)?;
            }
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn remember(&mut self, seq: u8, now_ms: u32) {
        let entry = DedupEntry {
            seq,
            expires_ms: now_ms.wrapping_add(DEDUP_TTL_MS),
        };
        if self.dedup.push(entry).is_err() {
            self.dedup[self.dedup_cursor] = entry;
            self.dedup_cursor = (self.dedup_cursor + 1) % DEDUP_CAPACITY;
        }
    }

    fn is_duplicate(&self, seq: u8, now_ms: u32) -> bool {
        self.dedup
            .iter()
            .any(|e| e.seq == seq && (now_ms.wrapping_sub(e.expires_ms) as i32) < 0)
    }

    /// Poll for one inbound frame, handling acks/nacks against the in-flight
    /// command internally and deduping repeated PMU -> node messages.
    pub fn poll(&mut self, now_ms: u32) -> Result<Option<PmuEvent>, PmuError> {
        let mut buf = [0u8; MAX_FRAME];
        let len = match self.transport.try_read(&mut buf)? {
            Some(len) => len,
            None => return Ok(None),
        };
        let (seq, cmd, data) = Self::decode(&buf[..len])?;
        let response = PmuResponse::from_u8(cmd).ok_or(PmuError::Framing)?;

        if self.is_duplicate(seq, now_ms) {
            return Ok(None);
        }
        self.remember(seq, now_ms);

        match response {
            PmuResponse::Ack => {
                if data.len() != 2 {
                    return Err(PmuError::Framing);
                }
                let (acked_seq, acked_cmd) = (data[0], data[1]);
                self.complete_front(acked_seq, now_ms)?;
                Ok(Some(PmuEvent::Ack { seq: acked_seq, cmd: acked_cmd }))
            }
            PmuResponse::Nack => {
                if data.len() != 3 {
                    return Err(PmuError::Framing);
                }
                let (acked_seq, acked_cmd, reason) = (data[0], data[1], data[2]);
                self.complete_front(acked_seq, now_ms)?;
                Ok(Some(PmuEvent::Nack {
                    seq: acked_seq,
                    cmd: acked_cmd,
                    reason,
                }))
            }
            PmuResponse::WakeIntervalResponse => {
                if data.len() != 4 {
                    return Err(PmuError::Framing);
                }
                Ok(Some(PmuEvent::WakeIntervalResponse {
                    seq,
                    interval_s: u32::from_le_bytes(data.try_into().unwrap()),
                }))
            }
            PmuResponse::ScheduleResponse => {
                let entry = ScheduleEntry::from_bytes(data).ok_or(PmuError::Framing)?;
                Ok(Some(PmuEvent::ScheduleResponse { seq, entry }))
            }
            PmuResponse::DateTimeResponse => {
                if data.len() != 4 {
                    return Err(PmuError::Framing);
                }
                Ok(Some(PmuEvent::DateTimeResponse {
                    seq,
                    unix_ts: u32::from_le_bytes(data.try_into().unwrap()),
                }))
            }
            PmuResponse::WakeNotification => {
                if data.len() != 1 + 1 + ScheduleEntry::SIZE + 1 + PMU_STATE_SIZE {
                    return Err(PmuError::Framing);
                }
                let reason = WakeReason::from_u8(data[0]).ok_or(PmuError::Framing)?;
                let has_schedule = data[1] != 0;
                let schedule_bytes = &data[2..2 + ScheduleEntry::SIZE];
                let schedule = if has_schedule {
                    ScheduleEntry::from_bytes(schedule_bytes)
                } else {
                    None
                };
                let state_valid = data[2 + ScheduleEntry::SIZE] != 0;
                let blob_start = 2 + ScheduleEntry::SIZE + 1;
                let mut blob = [0u8; PMU_STATE_SIZE];
                blob.copy_from_slice(&data[blob_start..blob_start + PMU_STATE_SIZE]);
                let state = if state_valid {
                    PmuPersistedState::from_bytes(&blob)
                } else {
                    None
                };
                Ok(Some(PmuEvent::WakeNotification {
                    reason,
                    schedule,
                    state_valid,
                    state,
                }))
            }
            PmuResponse::ScheduleComplete => {
                if data.len() != 1 {
                    return Err(PmuError::Framing);
                }
                Ok(Some(PmuEvent::ScheduleComplete { index: data[0] }))
            }
        }
    }

    pub fn set_wake_interval(&mut self, seconds: u32, now_ms: u32) -> Result<u8, PmuError> {
        self.post(PmuCommand::SetWakeInterval, &seconds.to_le_bytes(), now_ms)
    }

    pub fn get_wake_interval(&mut self, now_ms: u32) -> Result<u8, PmuError> {
        self.post(PmuCommand::GetWakeInterval, &[], now_ms)
    }

    pub fn set_schedule(&mut self, entry: ScheduleEntry, now_ms: u32) -> Result<u8, PmuError> {
        self.post(PmuCommand::SetSchedule, &entry.to_bytes(), now_ms)
    }

    pub fn get_schedule(&mut self, index: u8, now_ms: u32) -> Result<u8, PmuError> {
        self.post(PmuCommand::GetSchedule, &[index], now_ms)
    }

    pub fn clear_schedule(&mut self, index: u8, now_ms: u32) -> Result<u8, PmuError> {
        self.post(PmuCommand::ClearSchedule, &[index], now_ms)
    }

    pub fn keep_awake(&mut self, duration_s: u32, now_ms: u32) -> Result<u8, PmuError> {
        self.post(PmuCommand::KeepAwake, &duration_s.to_le_bytes(), now_ms)
    }

    pub fn set_datetime(&mut self, unix_ts: u32, now_ms: u32) -> Result<u8, PmuError> {
        self.post(PmuCommand::SetDateTime, &unix_ts.to_le_bytes(), now_ms)
    }

    pub fn get_datetime(&mut self, now_ms: u32) -> Result<u8, PmuError> {
        self.post(PmuCommand::GetDateTime, &[], now_ms)
    }

    pub fn clear_to_send(&mut self, now_ms: u32) -> Result<u8, PmuError> {
        self.post(PmuCommand::ClearToSend, &[], now_ms)
    }

    /// Posted exactly once per wake by the runtime's coalescing one-shot
    /// sleep task (§4.5 sleep flow). The state blob is opaque to the PMU.
    pub fn ready_for_sleep(&mut self, state: &PmuPersistedState, now_ms: u32) -> Result<u8, PmuError> {
        self.post(PmuCommand::ReadyForSleep, &state.to_bytes(), now_ms)
    }

    pub fn system_reset(&mut self, now_ms: u32) -> Result<u8, PmuError> {
        self.post(PmuCommand::SystemReset, &[], now_ms)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Default)]
    pub struct MockPmuTransport {
        pub written: Vec<heapless::Vec<u8, MAX_FRAME>>,
        pub inbox: VecDeque<heapless::Vec<u8, MAX_FRAME>>,
    }

    impl PmuTransport for MockPmuTransport {
        fn write(&mut self, bytes: &[u8]) -> Result<(), PmuError> {
            let mut v = heapless::Vec::new();
            v.extend_from_slice(bytes).map_err(|_| PmuError::BufferTooSmall)?;
            self.written.push(v);
            Ok(())
        }

        fn try_read(&mut self, buf: &mut [u8]) -> Result<Option<usize>, PmuError> {
            if let Some(frame) = self.inbox.pop_front() {
                buf[..frame.len()].copy_from_slice(&frame);
                Ok(Some(frame.len()))
            } else {
                Ok(None)
            }
        }
    }

    impl MockPmuTransport {
        /// Build and enqueue a well-formed inbound frame, as if the PMU had
        /// sent it, for tests that drive `PmuLink::poll` directly.
        pub fn inject(&mut self, seq: u8, response_cmd: u8, data: &[u8]) {
            let mut out: heapless::Vec<u8, MAX_FRAME> = heapless::Vec::new();
            PmuLink::<Self>::encode(seq, response_cmd, data, &mut out).unwrap();
            self.inbox.push_back(out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mock::MockPmuTransport;

    #[test]
    fn clear_to_send_produces_a_well_formed_frame() {
        let mut link = PmuLink::new(MockPmuTransport::default());
        link.clear_to_send(0).unwrap();
        let frame = &link.transport.written[0];
        assert_eq!(frame[0], PMU_FRAME_START);
        assert_eq!(*frame.last().unwrap(), PMU_FRAME_END);
        assert_eq!(frame[3], PmuCommand::ClearToSend as u8);
    }

    #[test]
    fn ack_clears_the_in_flight_command_and_dispatches_the_next() {
        let mut link = PmuLink::new(MockPmuTransport::default());
        let first = link.set_wake_interval(3600, 0).unwrap();
        let _second = link.get_wake_interval(0).unwrap();
        assert_eq!(link.transport.written.len(), 1, "only the front command sends immediately");

        link.transport.inject(200, PmuResponse::Ack as u8, &[first, PmuCommand::SetWakeInterval as u8]);
        let event = link.poll(0).unwrap().unwrap();
        assert_eq!(event, PmuEvent::Ack { seq: first, cmd: PmuCommand::SetWakeInterval as u8 });
        assert_eq!(link.transport.written.len(), 2, "dequeuing the front dispatches the next command");
        assert_eq!(link.queue_len(), 1);
    }

    #[test]
    fn unanswered_command_retries_with_capped_backoff() {
        let mut link = PmuLink::new(MockPmuTransport::default());
        link.clear_to_send(0).unwrap();
        assert_eq!(link.transport.written.len(), 1);

        assert_eq!(link.update(499).unwrap(), None);
        assert_eq!(link.update(500).unwrap(), Some(1));
        assert_eq!(link.transport.written.len(), 2);

        // second retry due at +1000ms from the first retry (500*2^1)
        assert_eq!(link.update(1499).unwrap(), None);
        assert_eq!(link.update(1500).unwrap(), Some(1));
        assert_eq!(link.transport.written.len(), 3);
    }

    #[test]
    fn retries_never_give_up() {
        let mut link = PmuLink::new(MockPmuTransport::default());
        link.clear_to_send(0).unwrap();
        let mut now = 0u32;
        for _ in 0..20 {
            now += 5_000;
            link.update(now).unwrap();
        }
        assert_eq!(link.queue_len(), 1, "PMU commands are retried indefinitely, never dropped");
    }

    #[test]
    fn wake_notification_round_trips_a_valid_state_blob() {
        let mut link = PmuLink::new(MockPmuTransport::default());
        let state = PmuPersistedState {
            version: bramble_protocol::pmu::PMU_STATE_VERSION,
            next_seq: 9,
            assigned_addr: 42,
            flash_read_idx: 1,
            flash_write_idx: 2,
        };
        let mut data: heapless::Vec<u8, 48> = heapless::Vec::new();
        data.push(WakeReason::External as u8).unwrap();
        data.push(0).unwrap(); // no schedule
        data.extend_from_slice(&[0u8; ScheduleEntry::SIZE]).unwrap();
        data.push(1).unwrap(); // state_valid
        data.extend_from_slice(&state.to_bytes()).unwrap();

        link.transport
            .inject(200, PmuResponse::WakeNotification as u8, &data);
        let event = link.poll(0).unwrap().unwrap();
        match event {
            PmuEvent::WakeNotification {
                reason,
                schedule,
                state_valid,
                state: parsed,
            } => {
                assert_eq!(reason, WakeReason::External);
                assert_eq!(schedule, None);
                assert!(state_valid);
                assert_eq!(parsed, Some(state));
            }
            other => panic!("expected WakeNotification, got {other:?}"),
        }
    }

    #[test]
    fn invalid_state_blob_is_surfaced_as_none_for_cold_start_fallback() {
        let mut link = PmuLink::new(MockPmuTransport::default());
        let mut data: heapless::Vec<u8, 48> = heapless::Vec::new();
        data.push(WakeReason::Periodic as u8).unwrap();
        data.push(0).unwrap();
        data.extend_from_slice(&[0u8; ScheduleEntry::SIZE]).unwrap();
        data.push(1).unwrap(); // claims valid...
        data.extend_from_slice(&[0u8; PMU_STATE_SIZE]).unwrap(); // ...but all-zero blob fails version check

        link.transport
            .inject(201, PmuResponse::WakeNotification as u8, &data);
        let event = link.poll(0).unwrap().unwrap();
        match event {
            PmuEvent::WakeNotification { state, .. } => assert_eq!(state, None),
            other => panic!("expected WakeNotification, got {other:?}"),
        }
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let mut link = PmuLink::new(MockPmuTransport::default());
        link.transport.inject(1, PmuResponse::ScheduleComplete as u8, &[3]);
        let frame = link.transport.inbox.back_mut().unwrap();
        let last_data_idx = frame.len() - 3; // checksum byte precedes END
        frame[last_data_idx] ^= 0xFF;
        assert_eq!(link.poll(0), Err(PmuError::BadChecksum));
    }

    #[test]
    fn duplicate_wake_notification_within_ttl_is_suppressed() {
        let mut link = PmuLink::new(MockPmuTransport::default());
        let data = {
            let mut d: heapless::Vec<u8, 48> = heapless::Vec::new();
            d.push(WakeReason::Periodic as u8).unwrap();
            d.push(0).unwrap();
            d.extend_from_slice(&[0u8; ScheduleEntry::SIZE]).unwrap();
            d.push(0).unwrap();
            d.extend_from_slice(&[0u8; PMU_STATE_SIZE]).unwrap();
            d
        };
        link.transport.inject(50, PmuResponse::WakeNotification as u8, &data);
        link.transport.inject(50, PmuResponse::WakeNotification as u8, &data);

        assert!(link.poll(0).unwrap().is_some());
        assert!(link.poll(0).unwrap().is_none());
    }
}
