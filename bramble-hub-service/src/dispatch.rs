//! Frame dispatch: the hub's half of the wire protocol (§3, §4.7-§4.9).
//! Kept free of any actual transport so it can be driven by a mock
//! `FrameSink` in tests the same way `bramble-node-runtime`'s mocks drive
//! its pipeline.

use bramble_hub_runtime::{AddressManager, ForwardOutcome, FrameSink, HubRouter, NetworkStats, PendingUpdateKind};
use bramble_protocol::payload::{
    AckPayload, BatchAckPayload, CheckUpdatesPayload, EventLogPayload, HeartbeatPayload, HeartbeatResponsePayload,
    RegistrationPayload, RegistrationResponsePayload, SensorDataBatchPayload, SensorPayload, UpdateAvailablePayload,
};
use bramble_protocol::{Address, Flags, Message, MessageCodec, MessageType};

/// Everything the dispatch loop needs, bundled so `main` constructs it once
/// and hands it to `handle_frame` on every received frame.
pub struct HubState<S: FrameSink> {
    pub addresses: AddressManager,
    pub router: HubRouter<S>,
    pub stats: NetworkStats,
}

impl<S: FrameSink> HubState<S> {
    pub fn new(sink: S) -> Self {
        HubState {
            addresses: AddressManager::new(),
            router: HubRouter::new(sink),
            stats: NetworkStats::new(),
        }
    }

    /// Periodic sweep: liveness timeouts, registry pruning, queue retry,
    /// stale-route cleanup. Call from a timer task, not from the frame path.
    pub fn run_sweep(&mut self, now_s: u64, now_ms: u64, inactive_timeout_s: u64, deregister_timeout_s: u64) {
        let newly_inactive = self.addresses.check_inactive(now_s, inactive_timeout_s);
        for addr in newly_inactive {
            tracing::info!(?addr, "node marked inactive");
            self.router.update_route_offline(addr);
        }
        let removed = self.addresses.deregister_inactive(now_s, deregister_timeout_s);
        if removed > 0 {
            tracing::info!(removed, "deregistered long-inactive nodes");
        }
        let (expired, delivered) = self.router.process_queued_messages(now_ms);
        if expired > 0 || delivered > 0 {
            tracing::debug!(expired, delivered, "forward queue swept");
        }
        self.router.clear_old_routes_default(now_ms);
    }
}

/// Decode one raw frame, dispatch it, and return the raw response frame (if
/// any) to hand back to the transport. Malformed frames are logged and
/// dropped rather than propagated as an error — a single bad frame on a
/// lossy radio link must never take down the service.
pub fn handle_frame<S: FrameSink>(
    state: &mut HubState<S>,
    raw: &[u8],
    rssi_dbm: i16,
    snr_db: i16,
    now_s: u64,
    now_ms: u64,
) -> Option<heapless::Vec<u8, { bramble_protocol::MAX_FRAME }>> {
    let message = match MessageCodec::decode(raw) {
        Ok(m) => m,
        Err(err) => {
            tracing::warn!(?err, "dropping frame that failed to decode");
            state.stats.record_crc_error();
            return None;
        }
    };

    if message.header.dst != Address::HUB {
        // Forwarding, not a message this hub consumes itself: track it as
        // one of the hub's own outgoing sends (§4.9's sent/delivered
        // counters describe the hub's transmissions to each node, the same
        // as the original network_stats.h's `recordMessageSent`), not as a
        // reception from `message.header.src`.
        let criticality = message.header.flags.criticality();
        let dst = message.header.dst;
        state.stats.record_sent(dst, criticality, now_ms);
        match state.router.process_message(raw, dst, now_ms) {
            ForwardOutcome::Delivered => state.stats.record_delivered(dst, criticality, now_ms),
            ForwardOutcome::Dropped => state.stats.record_max_retries_hit(dst, criticality, now_ms),
            ForwardOutcome::Queued | ForwardOutcome::NotOurConcern => {}
        }
        return None;
    }

    state.stats.record_reception(message.header.src, rssi_dbm, snr_db, now_ms);

    let response = dispatch_to_hub(state, &message, now_s);
    response.and_then(|msg| encode(&msg))
}

fn dispatch_to_hub<S: FrameSink>(state: &mut HubState<S>, message: &Message, now_s: u64) -> Option<Message> {
    let src = message.header.src;
    let criticality = message.header.flags.criticality();

    match message.header.msg_type {
        MessageType::Registration => {
            let payload = RegistrationPayload::from_bytes(&message.payload)?;
            let assigned = state.addresses.register(
                payload.device_id,
                payload.node_type,
                0,
                payload.firmware_version,
                format!("node-{:016x}", payload.device_id),
                now_s,
            );
            let accepted = assigned != Address::HUB;
            let response = RegistrationResponsePayload {
                device_id: payload.device_id,
                assigned_addr: assigned,
                accepted,
            };
            build_response(src, MessageType::RegistrationResponse, message.header.seq, &response.to_bytes())
        }
        MessageType::Heartbeat => {
            let payload = HeartbeatPayload::from_bytes(&message.payload)?;
            let _ = state.addresses.touch(src, now_s);
            tracing::debug!(?src, battery_mv = payload.battery_mv, pending = payload.pending_records, "heartbeat");
            let has_pending_update = state.router.pending_update_count(src) > 0;
            let response = HeartbeatResponsePayload {
                network_time: now_s as u32,
                has_pending_update,
            };
            build_response(src, MessageType::HeartbeatResponse, message.header.seq, &response.to_bytes())
        }
        MessageType::SensorData => {
            let payload = SensorPayload::from_bytes(&message.payload)?;
            tracing::info!(?src, temp = payload.temperature, humidity = payload.humidity, "sensor reading");
            if criticality != bramble_protocol::Criticality::BestEffort {
                let ack = AckPayload {
                    acked_seq: message.header.seq,
                };
                build_response(src, MessageType::Ack, message.header.seq, &ack.to_bytes())
            } else {
                None
            }
        }
        MessageType::SensorDataBatch => {
            let payload = SensorDataBatchPayload::from_bytes(&message.payload)?;
            tracing::info!(?src, records = payload.records.len(), start = payload.start_index, "sensor batch");
            let ack = BatchAckPayload {
                ack_seq: message.header.seq,
                persisted_count: payload.records.len() as u8,
                status: 0,
            };
            build_response(src, MessageType::BatchAck, message.header.seq, &ack.to_bytes())
        }
        MessageType::Ack => {
            let _ = AckPayload::from_bytes(&message.payload)?;
            state.stats.record_ack_received();
            None
        }
        MessageType::CheckUpdates => {
            let payload = CheckUpdatesPayload::from_bytes(&message.payload)?;
            let update = state.router.check_updates(src, payload.last_applied_seq)?;
            let wire = UpdateAvailablePayload {
                seq: update.seq,
                kind: update.kind_tag,
                index: update.index,
                value: update.value,
            };
            build_response(src, MessageType::UpdateAvailable, message.header.seq, &wire.to_bytes())
        }
        MessageType::EventLog => {
            let payload = EventLogPayload::from_bytes(&message.payload)?;
            tracing::info!(?src, events = payload.records.len(), "event log drain");
            None
        }
        other @ (MessageType::ActuatorCmd
        | MessageType::RegistrationResponse
        | MessageType::HeartbeatResponse
        | MessageType::UpdateAvailable
        | MessageType::BatchAck) => {
            tracing::warn!(?src, msg_type = ?other, "unexpected hub-bound message of a hub-originated type");
            state.stats.record_invalid_message();
            None
        }
    }
}

/// Queue a configuration change for later delivery via `CheckUpdates`
/// (§4.8). Exposed for whatever external control surface the hub service
/// eventually grows (CLI, HTTP API) — the service binary itself doesn't
/// call this yet.
pub fn queue_update<S: FrameSink>(state: &mut HubState<S>, addr: Address, kind: PendingUpdateKind, now_ms: u64) -> u8 {
    state.router.enqueue_update(addr, kind, now_ms)
}

fn build_response(dst: Address, msg_type: MessageType, seq: u8, payload: &[u8]) -> Option<Message> {
    Message::new(Address::HUB, dst, msg_type, seq, Flags::NONE, payload).ok()
}

fn encode(message: &Message) -> Option<heapless::Vec<u8, { bramble_protocol::MAX_FRAME }>> {
    let mut buf = [0u8; bramble_protocol::MAX_FRAME];
    let len = MessageCodec::encode(message, &mut buf).ok()?;
    let mut out: heapless::Vec<u8, { bramble_protocol::MAX_FRAME }> = heapless::Vec::new();
    out.extend_from_slice(&buf[..len]).ok()?;
    Some(out)
}
