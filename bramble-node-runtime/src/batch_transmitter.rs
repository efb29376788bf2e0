//! Catch-up transmission of queued flash-ring records in one frame per send
//! (§4.3.1, grounded in the original `batch_transmitter.h`: a
//! `max_batches_per_cycle` ceiling per wake cycle and a consecutive-failure
//! counter the caller can use to back off waking the radio at all).

use bramble_protocol::payload::{BatchAckPayload, BatchSensorRecord, SensorDataBatchPayload, MAX_BATCH_RECORDS};
use bramble_protocol::{Address, Criticality, MessageType};

use crate::flash::ExternalFlash;
use crate::flash_ring::{FlashRing, FlashRingError};
use crate::messenger::{MessengerError, ReliableMessenger};
use crate::radio::RadioPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchTransmitterConfig {
    pub max_batches_per_cycle: u8,
    pub max_records_per_batch: u8,
    pub hub_address: Address,
}

impl Default for BatchTransmitterConfig {
    /// Matches the per-wake transmit_batch cap: up to 19 records per batch,
    /// up to 20 batches per wake.
    fn default() -> Self {
        BatchTransmitterConfig {
            max_batches_per_cycle: 20,
            max_records_per_batch: 19,
            hub_address: Address::HUB,
        }
    }
}

/// A batch send in flight, correlated against the `BatchAck` that follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InFlightBatch {
    pub seq: u8,
    pub start_index: u32,
    pub record_count: u8,
}

pub struct BatchTransmitter {
    config: BatchTransmitterConfig,
    batches_sent_this_cycle: u8,
    consecutive_failures: u32,
}

impl BatchTransmitter {
    pub fn new(config: BatchTransmitterConfig) -> Self {
        BatchTransmitter {
            config,
            batches_sent_this_cycle: 0,
            consecutive_failures: 0,
        }
    }

    pub fn reset_cycle_counter(&mut self) {
        self.batches_sent_this_cycle = 0;
    }

    pub fn can_send_more(&self) -> bool {
        self.batches_sent_this_cycle < self.config.max_batches_per_cycle
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Pull up to one batch's worth of untransmitted records from `ring` and
    /// send it Reliable. Returns `None` when the cycle cap has been reached
    /// or the ring has nothing untransmitted.
    pub fn transmit<F: ExternalFlash, R: RadioPort>(
        &mut self,
        ring: &mut FlashRing<F>,
        messenger: &mut ReliableMessenger<R>,
        node_addr: Address,
        now_ms: u32,
        seq_base: u8,
        seq_top: u8,
    ) -> Result<Option<InFlightBatch>, BatchTransmitError> {
        if !self.can_send_more() {
            return Ok(None);
        }
        let cap = (self.config.max_records_per_batch as usize).min(MAX_BATCH_RECORDS);
        let (batch, _scanned) = ring.read_untransmitted(cap)?;
        if batch.is_empty() {
            return Ok(None);
        }
        let start_index = batch[0].0;
        let record_count = batch.len() as u8;

        let mut records: heapless::Vec<BatchSensorRecord, MAX_BATCH_RECORDS> = heapless::Vec::new();
        for (_, rec) in &batch {
            records
                .push(BatchSensorRecord {
                    timestamp: rec.timestamp,
                    temperature: rec.temperature,
                    humidity: rec.humidity,
                })
                .ok();
        }

        let payload = SensorDataBatchPayload {
            node_addr,
            start_index,
            records,
        };
        let mut buf: heapless::Vec<u8, 247> = heapless::Vec::new();
        payload.to_bytes(&mut buf).map_err(|_| BatchTransmitError::PayloadTooLarge)?;

        let seq = messenger.send(
            self.config.hub_address,
            MessageType::SensorDataBatch,
            Criticality::Reliable,
            &buf,
            now_ms,
            seq_base,
            seq_top,
        )?;

        self.batches_sent_this_cycle += 1;
        Ok(Some(InFlightBatch {
            seq,
            start_index,
            record_count,
        }))
    }

    /// Apply the hub's ack: advance and mark only what it reports actually
    /// persisted (§9 open question 1), tracking consecutive failures so a
    /// hub that keeps acking zero records can be treated as unreachable.
    pub fn handle_ack<F: ExternalFlash>(
        &mut self,
        ring: &mut FlashRing<F>,
        in_flight: InFlightBatch,
        ack: BatchAckPayload,
    ) -> Result<(), FlashRingError> {
        let persisted = (ack.persisted_count as u32).min(in_flight.record_count as u32);
        if persisted > 0 {
            let mut idx = in_flight.start_index;
            for _ in 0..persisted {
                ring.mark_transmitted(idx)?;
                idx = (idx + 1) % ring.capacity();
            }
            ring.advance_read(persisted)?;
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures += 1;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BatchTransmitError {
    #[error(transparent)]
    Flash(FlashRingError),
    #[error(transparent)]
    Messenger(MessengerError),
    #[error("batch payload would exceed the maximum frame payload size")]
    PayloadTooLarge,
}

impl From<FlashRingError> for BatchTransmitError {
    fn from(e: FlashRingError) -> Self {
        BatchTransmitError::Flash(e)
    }
}

impl From<MessengerError> for BatchTransmitError {
    fn from(e: MessengerError) -> Self {
        BatchTransmitError::Messenger(e)
    }
}
