//! Per-wake orchestration state machine (§4.6, grounded in the original
//! `node_state_machine.h`/`main.cpp` wake-cycle loop): the sequence a node
//! runs through every time the PMU powers it on, from PMU handshake through
//! sensor read, backlog catch-up, transmit, a short listen window, and
//! finally handing a persisted-state blob back to the PMU before sleeping.
//!
//! `NodeState` is deliberately richer than raw hardware state. The hardware
//! only ever tells you two things directly: whether the RTC is ticking, and
//! whether something is broken. Everything past that — which stage of this
//! wake's pipeline is active — is runtime bookkeeping layered on top, which
//! is why `BaseState`/`BaseStateMachine` exist as the hardware-derived core
//! that `NodeState` composes with rather than duplicates.

use bramble_protocol::payload::{BatchAckPayload, HeartbeatResponsePayload, RegistrationPayload, RegistrationResponsePayload};
use bramble_protocol::{Address, Criticality, MessageType, PmuPersistedState, SensorDataRecord};

use crate::batch_transmitter::{BatchTransmitError, BatchTransmitter, InFlightBatch};
use crate::flash::ExternalFlash;
use crate::flash_ring::{FlashRing, FlashRingError};
use crate::heartbeat_client::{HeartbeatClient, HeartbeatStatus};
use crate::messenger::{MessengerError, ReliableMessenger};
use crate::pmu_link::{PmuError, PmuEvent, PmuLink, PmuTransport, WakeReason};
use crate::radio::RadioPort;
use crate::task_queue::{Priority, TaskHandle, TaskQueue};

/// Hardware-derived half of the state split: purely a function of "is the
/// RTC running" and "has anything reported a hard fault", with no notion of
/// where in the wake pipeline the runtime currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseState {
    Initializing,
    AwaitingTime,
    Operational,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct BaseStateMachine {
    rtc_running: bool,
    hw_error: bool,
}

impl BaseStateMachine {
    fn derive(&self) -> BaseState {
        if self.hw_error {
            BaseState::Error
        } else if !self.rtc_running {
            BaseState::AwaitingTime
        } else {
            BaseState::Operational
        }
    }
}

/// Runtime-progress states for a single wake cycle (§4.6). Most of these
/// only mean something in the context of "since the PMU last woke us";
/// `mark_initialized`/`report_wake_from_sleep` reset back to the top.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Initializing,
    AwaitingTime,
    SyncingTime,
    TimeSynced,
    ReadingSensor,
    CheckingBacklog,
    Transmitting,
    Listening,
    ReadyForSleep,
    DegradedNoSensor,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WakeTask {
    PmuHandshakeTimeout,
    TimeSyncTimeout,
    ListenWindowClosed,
    SendReadyForSleep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeRuntimeConfig {
    pub hub: Address,
    /// This chip's unique serial, sent with every registration request so
    /// the hub can recognize a returning node instead of allocating it a
    /// second address.
    pub device_id: u64,
    pub seq_base: u8,
    pub seq_top: u8,
    pub pmu_handshake_timeout_ms: u32,
    pub time_sync_timeout_ms: u32,
    pub listen_window_ms: u32,
}

impl Default for NodeRuntimeConfig {
    fn default() -> Self {
        NodeRuntimeConfig {
            hub: Address::HUB,
            device_id: 0,
            seq_base: 128,
            seq_top: 255,
            pmu_handshake_timeout_ms: 2_000,
            time_sync_timeout_ms: 5_000,
            listen_window_ms: 500,
        }
    }
}

pub struct NodeRuntime<R: RadioPort, F: ExternalFlash, T: PmuTransport> {
    config: NodeRuntimeConfig,
    state: NodeState,
    base: BaseStateMachine,
    messenger: ReliableMessenger<R>,
    flash: FlashRing<F>,
    pmu: PmuLink<T>,
    batch_tx: BatchTransmitter,
    heartbeat: HeartbeatClient,

    sensor_ready: bool,
    flash_healthy: bool,
    in_flight_batch: Option<InFlightBatch>,
    time_sync_fallback_pending: bool,

    handshake_timeout: Option<TaskHandle>,
    time_sync_timeout: Option<TaskHandle>,
    listen_timeout: Option<TaskHandle>,
    tasks: TaskQueue<WakeTask, 8>,
}

impl<R: RadioPort, F: ExternalFlash, T: PmuTransport> NodeRuntime<R, F, T> {
    pub fn new(
        radio: R,
        flash: F,
        pmu_transport: T,
        own_addr: Address,
        config: NodeRuntimeConfig,
    ) -> Result<Self, FlashRingError> {
        Ok(NodeRuntime {
            messenger: ReliableMessenger::new(radio, own_addr, config.seq_base),
            flash: FlashRing::init(flash)?,
            pmu: PmuLink::new(pmu_transport),
            batch_tx: BatchTransmitter::new(crate::batch_transmitter::BatchTransmitterConfig {
                hub_address: config.hub,
                ..Default::default()
            }),
            heartbeat: HeartbeatClient::new(),
            config,
            state: NodeState::Initializing,
            base: BaseStateMachine::default(),
            sensor_ready: false,
            flash_healthy: true,
            in_flight_batch: None,
            time_sync_fallback_pending: false,
            handshake_timeout: None,
            time_sync_timeout: None,
            listen_timeout: None,
            tasks: TaskQueue::new(),
        })
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn base_state(&self) -> BaseState {
        self.base.derive()
    }

    pub fn own_addr(&self) -> Address {
        self.messenger.own_addr()
    }

    pub fn messenger_mut(&mut self) -> &mut ReliableMessenger<R> {
        &mut self.messenger
    }

    pub fn flash_mut(&mut self) -> &mut FlashRing<F> {
        &mut self.flash
    }

    /// Kick off a fresh wake: handshake with the PMU (`ClearToSend`) and arm
    /// a fallback timeout in case it never answers (§7: "PMU protocol
    /// failures: retried indefinitely by `PmuLink`" covers the command
    /// itself, but the runtime still needs a bound on how long it waits
    /// before treating the PMU as absent).
    pub fn begin_wake(&mut self, now_ms: u32) -> Result<(), PmuError> {
        self.in_flight_batch = None;
        self.time_sync_fallback_pending = false;
        self.batch_tx.reset_cycle_counter();
        self.pmu.clear_to_send(now_ms)?;
        self.handshake_timeout =
            self.tasks
                .post_delayed(WakeTask::PmuHandshakeTimeout, Priority::High, now_ms, self.config.pmu_handshake_timeout_ms);
        Ok(())
    }

    /// Drain one PMU event and apply whatever state-machine side effect it
    /// implies. Call in a loop from the node's main loop until it returns
    /// `Ok(None)`.
    pub fn poll_pmu(&mut self, now_ms: u32) -> Result<Option<PmuEvent>, PmuError> {
        let event = self.pmu.poll(now_ms)?;
        match event {
            Some(PmuEvent::WakeNotification {
                reason: _,
                schedule: _,
                state_valid,
                state,
            }) => {
                if let Some(h) = self.handshake_timeout.take() {
                    self.tasks.cancel(h);
                }
                if state_valid {
                    if let Some(s) = state {
                        self.restore_from_blob(s);
                    }
                }
                self.mark_initialized(now_ms)?;
            }
            Some(PmuEvent::DateTimeResponse { unix_ts, .. }) => {
                self.report_rtc_synced(unix_ts, now_ms).ok();
            }
            _ => {}
        }
        Ok(event)
    }

    /// Adopt the blob's sequence counter and address unconditionally, and its
    /// flash cursors only if they check out against the live device;
    /// `restore_cursors` returning `false` just means the cursors `init`
    /// already reconstructed by scanning are kept, not that flash is broken.
    fn restore_from_blob(&mut self, state: PmuPersistedState) {
        self.messenger.restore_seq(state.next_seq);
        self.messenger.set_own_addr(Address::from_u16(state.assigned_addr));
        if let Err(_e) = self.flash.restore_cursors(state.flash_read_idx, state.flash_write_idx) {
            self.flash_healthy = false;
        }
    }

    /// Hardware bring-up finished (PMU handshake answered, prior-wake state
    /// restored if any). Always moves on to waiting for a trustworthy clock.
    pub fn mark_initialized(&mut self, now_ms: u32) -> Result<(), PmuError> {
        if self.state != NodeState::Initializing {
            return Ok(());
        }
        self.state = NodeState::AwaitingTime;
        self.pmu.get_datetime(now_ms)?;
        self.time_sync_timeout =
            self.tasks
                .post_delayed(WakeTask::TimeSyncTimeout, Priority::Normal, now_ms, self.config.time_sync_timeout_ms);
        self.state = NodeState::SyncingTime;
        Ok(())
    }

    /// The clock is now trustworthy, whether from the PMU's `GetDateTime`
    /// response or (§9 resolved: PMU time wins, hub heartbeat is fallback
    /// only) a heartbeat response reached during the timeout fallback.
    /// Idempotent past `TimeSynced` so a stray duplicate event can't rewind
    /// progress already made this wake.
    pub fn report_rtc_synced(&mut self, unix_ts: u32, now_ms: u32) -> Result<(), FlashRingError> {
        if !matches!(self.state, NodeState::AwaitingTime | NodeState::SyncingTime) {
            return Ok(());
        }
        if let Some(h) = self.time_sync_timeout.take() {
            self.tasks.cancel(h);
        }
        self.base.rtc_running = true;
        self.time_sync_fallback_pending = false;
        self.flash.set_last_sync(unix_ts)?;
        self.flash.set_initial_boot_timestamp(unix_ts)?;
        self.state = NodeState::TimeSynced;
        let _ = now_ms;
        Ok(())
    }

    pub fn report_sensor_init_result(&mut self, ok: bool) {
        if self.state != NodeState::TimeSynced {
            return;
        }
        self.sensor_ready = ok;
        self.state = if ok {
            NodeState::ReadingSensor
        } else {
            NodeState::DegradedNoSensor
        };
    }

    /// A fresh reading arrived. Stored in the flash ring when flash is
    /// healthy; when it isn't, the reading is simply dropped this wake
    /// rather than blocking the rest of the pipeline on a broken device.
    pub fn report_read_complete(&mut self, record: SensorDataRecord) -> Result<(), FlashRingError> {
        if self.state != NodeState::ReadingSensor {
            return Ok(());
        }
        if self.flash_healthy {
            match self.flash.write_record(record) {
                Ok(()) => {}
                Err(e) => {
                    self.flash_healthy = false;
                    return Err(e);
                }
            }
        }
        self.state = NodeState::CheckingBacklog;
        Ok(())
    }

    /// Decide whether anything untransmitted is waiting, from either the
    /// state entered just now or `DegradedNoSensor` (no fresh reading this
    /// wake, but prior backlog still needs draining).
    pub fn check_backlog(&mut self) -> bool {
        if !matches!(self.state, NodeState::CheckingBacklog | NodeState::DegradedNoSensor) {
            return false;
        }
        let needs_tx = self.flash.untransmitted_count() > 0;
        self.state = if needs_tx { NodeState::Transmitting } else { NodeState::ReadyForSleep };
        needs_tx
    }

    /// Register with the hub if this node doesn't yet have an assigned
    /// address (§4.1 Registration). A no-op once registered.
    pub fn maybe_register(&mut self, now_ms: u32) -> Result<Option<u8>, MessengerError> {
        if self.own_addr() != Address::UNREGISTERED {
            return Ok(None);
        }
        let payload = RegistrationPayload {
            device_id: self.config.device_id,
            node_type: 1,
            firmware_version: 1,
        };
        let seq = self.messenger.send(
            self.config.hub,
            MessageType::Registration,
            Criticality::Reliable,
            &payload.to_bytes(),
            now_ms,
            self.config.seq_base,
            self.config.seq_top,
        )?;
        Ok(Some(seq))
    }

    /// Drive one more batch of queued records out, up to the cycle cap.
    /// Call repeatedly from `Transmitting` until it returns `false`.
    pub fn pump_transmit(&mut self, now_ms: u32) -> Result<bool, BatchTransmitError> {
        if self.state != NodeState::Transmitting || self.in_flight_batch.is_some() {
            return Ok(false);
        }
        let hub = self.config.hub;
        let sent = self.batch_tx.transmit(
            &mut self.flash,
            &mut self.messenger,
            hub,
            now_ms,
            self.config.seq_base,
            self.config.seq_top,
        )?;
        match sent {
            Some(batch) => {
                self.in_flight_batch = Some(batch);
                Ok(true)
            }
            None => {
                self.state = NodeState::Listening;
                Ok(false)
            }
        }
    }

    fn handle_batch_ack(&mut self, ack: BatchAckPayload) -> Result<(), FlashRingError> {
        if let Some(in_flight) = self.in_flight_batch.take() {
            if in_flight.seq == ack.ack_seq {
                self.batch_tx.handle_ack(&mut self.flash, in_flight, ack)?;
            } else {
                self.in_flight_batch = Some(in_flight);
            }
        }
        Ok(())
    }

    pub fn start_listening(&mut self, now_ms: u32) {
        if self.state != NodeState::Listening {
            return;
        }
        self.listen_timeout =
            self.tasks
                .post_delayed(WakeTask::ListenWindowClosed, Priority::Low, now_ms, self.config.listen_window_ms);
    }

    pub fn report_listen_complete(&mut self) {
        if self.state != NodeState::Listening {
            return;
        }
        self.state = NodeState::ReadyForSleep;
    }

    /// Poll the radio once, applying the messages the runtime itself cares
    /// about (batch acks, registration responses, heartbeat responses) and
    /// handing everything else back to the caller undecoded-further.
    pub fn poll_radio(&mut self, now_ms: u32) -> Result<Option<bramble_protocol::Message>, RuntimeError> {
        let Some(message) = self.messenger.poll_receive(now_ms)? else {
            return Ok(None);
        };
        match message.header.msg_type {
            MessageType::BatchAck => {
                if let Some(ack) = BatchAckPayload::from_bytes(&message.payload) {
                    self.handle_batch_ack(ack)?;
                }
                Ok(None)
            }
            MessageType::RegistrationResponse => {
                if let Some(resp) = RegistrationResponsePayload::from_bytes(&message.payload) {
                    if resp.device_id == self.config.device_id && resp.accepted {
                        self.messenger.set_own_addr(resp.assigned_addr);
                    }
                }
                Ok(None)
            }
            MessageType::HeartbeatResponse => {
                if let Some(resp) = HeartbeatResponsePayload::from_bytes(&message.payload) {
                    let outcome = self.heartbeat.handle_response(resp);
                    if self.time_sync_fallback_pending {
                        self.report_rtc_synced(outcome.network_time, now_ms)?;
                    }
                }
                Ok(None)
            }
            _ => Ok(Some(message)),
        }
    }

    pub fn send_heartbeat(&mut self, status: HeartbeatStatus, now_ms: u32) -> Result<u8, MessengerError> {
        self.heartbeat.send(&mut self.messenger, self.config.hub, status, now_ms, self.config.seq_base, self.config.seq_top)
    }

    /// Drive any due timeouts. Returns `true` if something happened.
    pub fn poll_tasks(&mut self, now_ms: u32) -> Result<bool, PmuError> {
        let Some((_, token)) = self.tasks.poll_due(now_ms) else {
            return Ok(false);
        };
        match token {
            WakeTask::PmuHandshakeTimeout => {
                if self.state == NodeState::Initializing {
                    self.base.hw_error = true;
                    self.state = NodeState::Error;
                }
            }
            WakeTask::TimeSyncTimeout => {
                if matches!(self.state, NodeState::AwaitingTime | NodeState::SyncingTime) {
                    self.time_sync_fallback_pending = true;
                    let status = HeartbeatStatus {
                        battery_mv: 0,
                        uptime_s: 0,
                        pending_records: self.flash.untransmitted_count() as u16,
                    };
                    self.send_heartbeat(status, now_ms).ok();
                }
            }
            WakeTask::ListenWindowClosed => self.report_listen_complete(),
            WakeTask::SendReadyForSleep => {
                let blob = self.sleep_state_blob();
                self.pmu.ready_for_sleep(&blob, now_ms)?;
            }
        }
        Ok(true)
    }

    fn sleep_state_blob(&self) -> PmuPersistedState {
        let (flash_read_idx, flash_write_idx) = self.flash.cursors();
        PmuPersistedState {
            version: bramble_protocol::pmu::PMU_STATE_VERSION,
            next_seq: self.messenger.next_seq(),
            assigned_addr: self.own_addr().as_u16(),
            flash_read_idx,
            flash_write_idx,
        }
    }

    /// Hand the wake-cycle state blob to the PMU exactly once, via the same
    /// coalescing one-shot task the original used for its sleep request
    /// (§4.5 sleep flow), then arm the wake pipeline for the next cycle.
    pub fn prepare_sleep(&mut self, now_ms: u32) -> Result<(), PmuError> {
        if self.state != NodeState::ReadyForSleep {
            return Ok(());
        }
        self.tasks.post_once(WakeTask::SendReadyForSleep, Priority::High, now_ms);
        Ok(())
    }

    /// The PMU woke the node again after a completed sleep; reset wake-scoped
    /// progress and re-enter the pipeline at the top. `sensor_ready` and
    /// `flash_healthy` persist across wakes since they describe the hardware,
    /// not this cycle's progress.
    pub fn report_wake_from_sleep(&mut self, now_ms: u32) -> Result<(), PmuError> {
        self.state = NodeState::Initializing;
        self.in_flight_batch = None;
        self.begin_wake(now_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Messenger(MessengerError),
    #[error(transparent)]
    Flash(FlashRingError),
}

impl From<MessengerError> for RuntimeError {
    fn from(e: MessengerError) -> Self {
        RuntimeError::Messenger(e)
    }
}

impl From<FlashRingError> for RuntimeError {
    fn from(e: FlashRingError) -> Self {
        RuntimeError::Flash(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flash::mock::MockFlash;
    use crate::pmu_link::mock::MockPmuTransport;
    use crate::radio::mock::MockRadio;

    fn runtime() -> NodeRuntime<MockRadio, MockFlash, MockPmuTransport> {
        NodeRuntime::new(
            MockRadio::new(),
            MockFlash::new(2 * crate::flash::SECTOR_SIZE as u32),
            MockPmuTransport::default(),
            Address::from_u16(7),
            NodeRuntimeConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn begin_wake_then_wake_notification_reaches_syncing_time() {
        let mut rt = runtime();
        rt.begin_wake(0).unwrap();
        assert_eq!(rt.state(), NodeState::Initializing);

        let mut data: heapless::Vec<u8, 48> = heapless::Vec::new();
        data.push(WakeReason::Periodic as u8).unwrap();
        data.push(0).unwrap();
        data.extend_from_slice(&[0u8; 4]).unwrap();
        data.push(0).unwrap(); // state not valid: cold start
        data.extend_from_slice(&[0u8; bramble_protocol::pmu::PMU_STATE_SIZE]).unwrap();
        rt.pmu_mut().transport_mut().inject(200, 0x85, &data);

        rt.poll_pmu(0).unwrap();
        assert_eq!(rt.state(), NodeState::SyncingTime);
    }

    #[test]
    fn pmu_handshake_timeout_moves_to_error() {
        let mut rt = runtime();
        rt.begin_wake(0).unwrap();
        rt.poll_tasks(2_000).unwrap();
        assert_eq!(rt.state(), NodeState::Error);
        assert_eq!(rt.base_state(), BaseState::Error);
    }

    #[test]
    fn rtc_synced_then_sensor_failure_reaches_degraded_then_backlog() {
        let mut rt = runtime();
        rt.force_syncing_time();
        rt.report_rtc_synced(1_700_000_000, 0).unwrap();
        assert_eq!(rt.state(), NodeState::TimeSynced);

        rt.report_sensor_init_result(false);
        assert_eq!(rt.state(), NodeState::DegradedNoSensor);

        let needs_tx = rt.check_backlog();
        assert!(!needs_tx, "nothing written yet, so no backlog to drain");
        assert_eq!(rt.state(), NodeState::ReadyForSleep);
    }

    #[test]
    fn full_happy_path_writes_transmits_and_sleeps() {
        let mut rt = runtime();
        rt.force_syncing_time();
        rt.report_rtc_synced(1_700_000_000, 0).unwrap();
        rt.report_sensor_init_result(true);
        assert_eq!(rt.state(), NodeState::ReadingSensor);

        rt.report_read_complete(SensorDataRecord::new(1_700_000_000, 220, 5000)).unwrap();
        assert_eq!(rt.state(), NodeState::CheckingBacklog);

        assert!(rt.check_backlog());
        assert_eq!(rt.state(), NodeState::Transmitting);

        let sent = rt.pump_transmit(0).unwrap();
        assert!(sent);
        assert_eq!(rt.state(), NodeState::Transmitting, "still transmitting while a batch is in flight");

        let in_flight = rt.in_flight_batch.unwrap();
        rt.handle_batch_ack(BatchAckPayload {
            ack_seq: in_flight.seq,
            persisted_count: in_flight.record_count,
            status: 0,
        })
        .unwrap();
        assert!(rt.in_flight_batch.is_none());

        let drained = rt.pump_transmit(0).unwrap();
        assert!(!drained, "ring is empty, nothing left to send");
        assert_eq!(rt.state(), NodeState::Listening);

        rt.start_listening(0);
        rt.poll_tasks(500).unwrap();
        assert_eq!(rt.state(), NodeState::ReadyForSleep);

        rt.prepare_sleep(0).unwrap();
        rt.poll_tasks(0).unwrap();
        assert_eq!(rt.pmu_mut().transport_mut().written.len(), 1);
    }

    #[test]
    fn valid_wake_state_restores_address_and_sequence() {
        let mut rt = runtime();
        rt.begin_wake(0).unwrap();

        let restored = PmuPersistedState {
            version: bramble_protocol::pmu::PMU_STATE_VERSION,
            next_seq: 200,
            assigned_addr: 0x0042,
            flash_read_idx: 0,
            flash_write_idx: 0,
        };
        let mut data: heapless::Vec<u8, 48> = heapless::Vec::new();
        data.push(WakeReason::Scheduled as u8).unwrap();
        data.push(0).unwrap();
        data.extend_from_slice(&[0u8; 4]).unwrap();
        data.push(1).unwrap(); // state valid
        data.extend_from_slice(&restored.to_bytes()).unwrap();
        rt.pmu_mut().transport_mut().inject(201, 0x85, &data);

        rt.poll_pmu(0).unwrap();
        assert_eq!(rt.own_addr(), Address::from_u16(0x0042));
    }

    #[test]
    fn time_sync_timeout_falls_back_to_heartbeat_response() {
        let mut rt = runtime();
        rt.begin_wake(0).unwrap();
        let mut data: heapless::Vec<u8, 48> = heapless::Vec::new();
        data.push(WakeReason::Periodic as u8).unwrap();
        data.push(0).unwrap();
        data.extend_from_slice(&[0u8; 4]).unwrap();
        data.push(0).unwrap();
        data.extend_from_slice(&[0u8; bramble_protocol::pmu::PMU_STATE_SIZE]).unwrap();
        rt.pmu_mut().transport_mut().inject(210, 0x85, &data);
        rt.poll_pmu(0).unwrap();
        assert_eq!(rt.state(), NodeState::SyncingTime);

        rt.poll_tasks(5_000).unwrap();
        assert!(rt.time_sync_fallback_pending);

        let sent_frame = rt.messenger_mut().radio_mut().sent.last().unwrap().clone();
        let heartbeat = bramble_protocol::MessageCodec::decode(&sent_frame).unwrap();
        assert_eq!(heartbeat.header.msg_type, MessageType::Heartbeat);

        let resp = HeartbeatResponsePayload {
            network_time: 1_800_000_000,
            has_pending_update: false,
        };
        let ack_frame = bramble_protocol::Message::new(
            Address::HUB,
            rt.own_addr(),
            MessageType::HeartbeatResponse,
            1,
            bramble_protocol::Flags::NONE,
            &resp.to_bytes(),
        )
        .unwrap();
        let mut buf = [0u8; bramble_protocol::MAX_FRAME];
        let len = bramble_protocol::MessageCodec::encode(&ack_frame, &mut buf).unwrap();
        rt.messenger_mut().radio_mut().inject_rx(&buf[..len]);

        rt.poll_radio(0).unwrap();
        assert_eq!(rt.state(), NodeState::TimeSynced);
    }

    impl<R: RadioPort, F: ExternalFlash, T: PmuTransport> NodeRuntime<R, F, T> {
        fn pmu_mut(&mut self) -> &mut PmuLink<T> {
            &mut self.pmu
        }

        fn force_syncing_time(&mut self) {
            self.state = NodeState::SyncingTime;
        }
    }
}
