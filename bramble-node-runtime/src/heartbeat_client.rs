//! Periodic liveness reporting to the hub (§4.3.1, grounded in the original
//! `heartbeat_client.h`). Where the original threaded response/delivery
//! callbacks through the client, this version returns the outcome directly
//! from `handle_response` — the runtime's wake-cycle state machine already
//! has a natural place to act on it.

use bramble_protocol::payload::HeartbeatResponsePayload;
use bramble_protocol::{Address, Criticality, MessageType};

use crate::messenger::{MessengerError, ReliableMessenger};
use crate::radio::RadioPort;

pub use bramble_protocol::payload::HeartbeatPayload as HeartbeatStatus;

/// What the hub told us in response to a heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatOutcome {
    pub network_time: u32,
    pub has_pending_update: bool,
}

pub struct HeartbeatClient {
    consecutive_failures: u32,
}

impl Default for HeartbeatClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartbeatClient {
    pub fn new() -> Self {
        HeartbeatClient {
            consecutive_failures: 0,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn send<R: RadioPort>(
        &mut self,
        messenger: &mut ReliableMessenger<R>,
        hub: Address,
        status: HeartbeatStatus,
        now_ms: u32,
        seq_base: u8,
        seq_top: u8,
    ) -> Result<u8, MessengerError> {
        messenger.send(
            hub,
            MessageType::Heartbeat,
            Criticality::Reliable,
            &status.to_bytes(),
            now_ms,
            seq_base,
            seq_top,
        )
    }

    /// Record a `HeartbeatGaveUp`-style failure from the messenger so the
    /// node can decide to back off waking the radio entirely.
    pub fn note_failure(&mut self) {
        self.consecutive_failures += 1;
    }

    pub fn handle_response(&mut self, resp: HeartbeatResponsePayload) -> HeartbeatOutcome {
        self.consecutive_failures = 0;
        HeartbeatOutcome {
            network_time: resp.network_time,
            has_pending_update: resp.has_pending_update,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::mock::MockRadio;

    #[test]
    fn send_reports_the_assigned_sequence_number() {
        let mut messenger = ReliableMessenger::new(MockRadio::new(), Address::from_u16(7), 128);
        let mut client = HeartbeatClient::new();
        let status = HeartbeatStatus {
            battery_mv: 3700,
            uptime_s: 120,
            pending_records: 4,
        };
        let seq = client
            .send(&mut messenger, Address::HUB, status, 0, 128, 255)
            .unwrap();
        assert!((128..=255).contains(&seq));
    }

    #[test]
    fn response_resets_the_failure_counter() {
        let mut client = HeartbeatClient::new();
        client.note_failure();
        client.note_failure();
        assert_eq!(client.consecutive_failures(), 2);

        let outcome = client.handle_response(HeartbeatResponsePayload {
            network_time: 1_700_000_000,
            has_pending_update: true,
        });
        assert!(outcome.has_pending_update);
        assert_eq!(client.consecutive_failures(), 0);
    }
}
