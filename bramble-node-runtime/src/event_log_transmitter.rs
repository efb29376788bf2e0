//! Best-effort drain of queued diagnostic events (§4.3.1, grounded in the
//! original `event_log_transmitter.h`): sent fire-and-forget since there is
//! no ack to retry against, so the caller's event queue is drained
//! immediately after the send attempt rather than waiting for confirmation.

use bramble_protocol::payload::{EventLogPayload, EventRecord, MAX_EVENT_RECORDS};
use bramble_protocol::{Address, Criticality, MessageType};

use crate::messenger::{MessengerError, ReliableMessenger};
use crate::radio::RadioPort;

pub struct EventLogTransmitter {
    queue: heapless::Vec<EventRecord, MAX_EVENT_RECORDS>,
}

impl Default for EventLogTransmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLogTransmitter {
    pub fn new() -> Self {
        EventLogTransmitter {
            queue: heapless::Vec::new(),
        }
    }

    /// Queue an event. Returns `false` if the queue is full; the caller
    /// decides whether to drop the oldest or the newest entry.
    pub fn push(&mut self, record: EventRecord) -> bool {
        self.queue.push(record).is_ok()
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// If anything is queued, send it all in one frame and clear the queue
    /// immediately — there is no ack to wait for, so "sent" and "drained"
    /// happen together.
    pub fn transmit_if_pending<R: RadioPort>(
        &mut self,
        messenger: &mut ReliableMessenger<R>,
        hub: Address,
        now_ms: u32,
        seq_base: u8,
        seq_top: u8,
    ) -> Result<bool, MessengerError> {
        if self.queue.is_empty() {
            return Ok(false);
        }
        let payload = EventLogPayload {
            records: self.queue.clone(),
        };
        let mut buf: heapless::Vec<u8, 247> = heapless::Vec::new();
        payload.to_bytes(&mut buf).ok();

        messenger.send(
            hub,
            MessageType::EventLog,
            Criticality::BestEffort,
            &buf,
            now_ms,
            seq_base,
            seq_top,
        )?;
        self.queue.clear();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::mock::MockRadio;

    #[test]
    fn drains_the_queue_on_send_with_no_ack_wait() {
        let mut messenger = ReliableMessenger::new(MockRadio::new(), Address::from_u16(7), 128);
        let mut log = EventLogTransmitter::new();
        log.push(EventRecord {
            timestamp: 1,
            code: 2,
            detail: 3,
        });
        assert_eq!(log.pending_count(), 1);

        let sent = log
            .transmit_if_pending(&mut messenger, Address::HUB, 0, 128, 255)
            .unwrap();
        assert!(sent);
        assert_eq!(log.pending_count(), 0);
        assert_eq!(messenger.pending_count(), 0, "best-effort sends never block on an ack");
    }

    #[test]
    fn nothing_queued_sends_nothing() {
        let mut messenger = ReliableMessenger::new(MockRadio::new(), Address::from_u16(7), 128);
        let mut log = EventLogTransmitter::new();
        let sent = log
            .transmit_if_pending(&mut messenger, Address::HUB, 0, 128, 255)
            .unwrap();
        assert!(!sent);
    }
}
