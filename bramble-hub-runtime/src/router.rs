//! Hub-side forwarding and per-node pending-update queues (§4.8, grounded
//! in the original `hub_router.h`). Non-goal: multi-hop routing — every
//! `RouteEntry` is `is_direct`, kept as a field rather than removed so the
//! shape matches what a future multi-hop hub would extend rather than a
//! one-off single-hop struct.

use std::collections::{HashMap, VecDeque};

use bramble_protocol::Address;

const QUEUE_CAPACITY: usize = 50;
const QUEUE_TTL_MS: u64 = 5 * 60 * 1_000;
const MAX_FORWARD_ATTEMPTS: u8 = 3;
const DEFAULT_ROUTE_MAX_AGE_MS: u64 = 3_600_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HubRouterError {
    #[error("the forwarding queue is full")]
    QueueFull,
}

/// Result of one `process_message` call, for callers that track delivery
/// statistics by criticality (§4.9) against their own outgoing sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
    NotOurConcern,
    Delivered,
    Queued,
    Dropped,
}

/// A half-duplex sink the router can hand an already-encoded frame to. The
/// router doesn't know or care whether this is a LoRa radio, a serial
/// bridge, or (in tests) an in-memory recorder — matching the `RadioPort`-
/// style capability-set split used on the node side (§9).
pub trait FrameSink {
    fn send_frame(&mut self, dst: Address, frame: &[u8]) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteEntry {
    pub last_used_ms: u64,
    pub last_online_ms: u64,
    pub is_online: bool,
    pub is_direct: bool,
}

struct QueuedMessage {
    dst: Address,
    frame: Vec<u8>,
    enqueued_at_ms: u64,
    attempts: u8,
}

/// Tagged variant of a queued configuration change (§3 PendingUpdate).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingUpdateKind {
    SetSchedule { index: u8, hour: u8, minute: u8 },
    RemoveSchedule { index: u8 },
    SetDateTime { unix_ts: u32 },
    SetWakeInterval { seconds: u32 },
}

impl PendingUpdateKind {
    /// Tag + packed `(index, value)` matching `UpdateAvailablePayload`'s
    /// `kind`/`index`/`value` fields.
    fn wire_fields(self) -> (u8, u8, u32) {
        match self {
            PendingUpdateKind::SetSchedule { index, hour, minute } => (0, index, (hour as u32) << 8 | minute as u32),
            PendingUpdateKind::RemoveSchedule { index } => (1, index, 0),
            PendingUpdateKind::SetDateTime { unix_ts } => (2, 0, unix_ts),
            PendingUpdateKind::SetWakeInterval { seconds } => (3, 0, seconds),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingUpdate {
    pub kind: PendingUpdateKind,
    pub seq: u8,
    pub enqueued_at_ms: u64,
}

/// What `check_updates` hands back to the caller to serialize into an
/// `UpdateAvailablePayload`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateDescription {
    pub seq: u8,
    pub kind_tag: u8,
    pub index: u8,
    pub value: u32,
}

struct NodeUpdateQueue {
    items: VecDeque<PendingUpdate>,
    next_seq: u8,
}

impl NodeUpdateQueue {
    fn new() -> Self {
        NodeUpdateQueue {
            items: VecDeque::new(),
            next_seq: 1,
        }
    }

    fn alloc_seq(&mut self) -> u8 {
        let seq = self.next_seq;
        self.next_seq = if self.next_seq == u8::MAX { 1 } else { self.next_seq + 1 };
        seq
    }
}

pub struct HubRouter<S: FrameSink> {
    sink: S,
    routes: HashMap<Address, RouteEntry>,
    queue: VecDeque<QueuedMessage>,
    updates: HashMap<Address, NodeUpdateQueue>,
}

impl<S: FrameSink> HubRouter<S> {
    pub fn new(sink: S) -> Self {
        HubRouter {
            sink,
            routes: HashMap::new(),
            queue: VecDeque::new(),
            updates: HashMap::new(),
        }
    }

    /// Handle one received frame addressed somewhere other than the hub
    /// itself: attempts an immediate forward, falling back to the bounded
    /// queue on failure. `NotOurConcern` when `dst` is `HUB` or
    /// `BROADCAST` — the caller handles those itself.
    pub fn process_message(&mut self, frame: &[u8], dst: Address, now_ms: u64) -> ForwardOutcome {
        if dst == Address::HUB || dst == Address::BROADCAST {
            return ForwardOutcome::NotOurConcern;
        }

        if self.sink.send_frame(dst, frame) {
            self.touch_route_usage(dst, now_ms);
            ForwardOutcome::Delivered
        } else {
            match self.enqueue(dst, frame, now_ms) {
                Ok(()) => ForwardOutcome::Queued,
                Err(HubRouterError::QueueFull) => {
                    tracing::warn!(?dst, "forward queue full, dropping message");
                    ForwardOutcome::Dropped
                }
            }
        }
    }

    fn touch_route_usage(&mut self, dst: Address, now_ms: u64) {
        self.routes
            .entry(dst)
            .or_insert(RouteEntry {
                last_used_ms: now_ms,
                last_online_ms: now_ms,
                is_online: true,
                is_direct: true,
            })
            .last_used_ms = now_ms;
    }

    fn enqueue(&mut self, dst: Address, frame: &[u8], now_ms: u64) -> Result<(), HubRouterError> {
        if self.queue.len() >= QUEUE_CAPACITY {
            return Err(HubRouterError::QueueFull);
        }
        self.queue.push_back(QueuedMessage {
            dst,
            frame: frame.to_vec(),
            enqueued_at_ms: now_ms,
            attempts: 0,
        });
        Ok(())
    }

    /// Mark `addr` reachable and drain any messages queued for it.
    pub fn update_route_online(&mut self, addr: Address, now_ms: u64) {
        let was_offline = !self.routes.get(&addr).map(|r| r.is_online).unwrap_or(false);
        self.routes
            .entry(addr)
            .and_modify(|r| {
                r.is_online = true;
                r.last_online_ms = now_ms;
            })
            .or_insert(RouteEntry {
                last_used_ms: now_ms,
                last_online_ms: now_ms,
                is_online: true,
                is_direct: true,
            });
        if was_offline {
            self.drain_for(addr, now_ms);
        }
    }

    pub fn update_route_offline(&mut self, addr: Address) {
        if let Some(route) = self.routes.get_mut(&addr) {
            route.is_online = false;
        }
    }

    fn drain_for(&mut self, addr: Address, now_ms: u64) {
        let mut remaining = VecDeque::with_capacity(self.queue.len());
        while let Some(msg) = self.queue.pop_front() {
            if msg.dst == addr {
                if self.sink.send_frame(msg.dst, &msg.frame) {
                    self.touch_route_usage(addr, now_ms);
                    continue;
                }
            }
            remaining.push_back(msg);
        }
        self.queue = remaining;
    }

    /// Periodic sweep: expire messages older than the TTL, retry the rest
    /// that have a reachable route, and drop anything that has exhausted
    /// `MAX_FORWARD_ATTEMPTS`. Returns `(expired, delivered)`.
    pub fn process_queued_messages(&mut self, now_ms: u64) -> (usize, usize) {
        let mut expired = 0;
        let mut delivered = 0;
        let mut remaining = VecDeque::with_capacity(self.queue.len());

        while let Some(mut msg) = self.queue.pop_front() {
            if now_ms.saturating_sub(msg.enqueued_at_ms) > QUEUE_TTL_MS {
                expired += 1;
                continue;
            }
            let reachable = self.routes.get(&msg.dst).map(|r| r.is_online).unwrap_or(false);
            if reachable {
                if self.sink.send_frame(msg.dst, &msg.frame) {
                    self.touch_route_usage(msg.dst, now_ms);
                    delivered += 1;
                    continue;
                }
                msg.attempts += 1;
                if msg.attempts >= MAX_FORWARD_ATTEMPTS {
                    expired += 1;
                    continue;
                }
            }
            remaining.push_back(msg);
        }
        self.queue = remaining;
        (expired, delivered)
    }

    /// Drop routes untouched for longer than `max_age_ms`. Returns the
    /// count cleared.
    pub fn clear_old_routes(&mut self, now_ms: u64, max_age_ms: u64) -> usize {
        let before = self.routes.len();
        self.routes.retain(|_, r| now_ms.saturating_sub(r.last_used_ms) <= max_age_ms);
        before - self.routes.len()
    }

    pub fn clear_old_routes_default(&mut self, now_ms: u64) -> usize {
        self.clear_old_routes(now_ms, DEFAULT_ROUTE_MAX_AGE_MS)
    }

    pub fn route(&self, addr: Address) -> Option<RouteEntry> {
        self.routes.get(&addr).copied()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Queue a configuration update for `addr`, returning its assigned seq.
    pub fn enqueue_update(&mut self, addr: Address, kind: PendingUpdateKind, now_ms: u64) -> u8 {
        let entry = self.updates.entry(addr).or_insert_with(NodeUpdateQueue::new);
        let seq = entry.alloc_seq();
        entry.items.push_back(PendingUpdate {
            kind,
            seq,
            enqueued_at_ms: now_ms,
        });
        seq
    }

    /// Respond to a node's `CheckUpdates(last_applied_seq)`: if the node has
    /// already applied the item at the front of its queue, pop it and look
    /// at the next one; describe whatever is now at the front, or `None` if
    /// there is nothing pending.
    pub fn check_updates(&mut self, addr: Address, last_applied_seq: u8) -> Option<UpdateDescription> {
        let queue = self.updates.get_mut(&addr)?;
        while let Some(front) = queue.items.front() {
            if front.seq == last_applied_seq {
                queue.items.pop_front();
            } else {
                break;
            }
        }
        queue.items.front().map(|item| {
            let (kind_tag, index, value) = item.kind.wire_fields();
            UpdateDescription {
                seq: item.seq,
                kind_tag,
                index,
                value,
            }
        })
    }

    pub fn pending_update_count(&self, addr: Address) -> usize {
        self.updates.get(&addr).map(|q| q.items.len()).unwrap_or(0)
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;

    #[derive(Default)]
    pub struct RecordingSink {
        pub sent: Vec<(Address, Vec<u8>)>,
        pub fail_next: bool,
    }

    impl FrameSink for RecordingSink {
        fn send_frame(&mut self, dst: Address, frame: &[u8]) -> bool {
            if self.fail_next {
                self.fail_next = false;
                return false;
            }
            self.sent.push((dst, frame.to_vec()));
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::RecordingSink;
    use super::*;

    #[test]
    fn hub_and_broadcast_destinations_are_not_the_routers_concern() {
        let mut router = HubRouter::new(RecordingSink::default());
        assert_eq!(router.process_message(&[1, 2, 3], Address::HUB, 0), ForwardOutcome::NotOurConcern);
        assert_eq!(router.process_message(&[1, 2, 3], Address::BROADCAST, 0), ForwardOutcome::NotOurConcern);
        assert!(router.sink_mut().sent.is_empty());
    }

    #[test]
    fn forward_failure_enqueues_and_online_drains() {
        let mut router = HubRouter::new(RecordingSink::default());
        router.sink_mut().fail_next = true;
        let dst = Address::from_u16(5);

        assert_eq!(router.process_message(&[9, 9], dst, 0), ForwardOutcome::Queued);
        assert_eq!(router.queue_len(), 1);
        assert!(router.sink_mut().sent.is_empty());

        router.update_route_online(dst, 10);
        assert_eq!(router.queue_len(), 0, "coming online drains the queue");
        assert_eq!(router.sink_mut().sent.len(), 1);
    }

    #[test]
    fn expired_messages_are_dropped_by_process_queued_messages() {
        let mut router = HubRouter::new(RecordingSink::default());
        router.sink_mut().fail_next = true;
        let dst = Address::from_u16(5);
        router.process_message(&[1], dst, 0);

        let (expired, delivered) = router.process_queued_messages(QUEUE_TTL_MS + 1);
        assert_eq!(expired, 1);
        assert_eq!(delivered, 0);
        assert_eq!(router.queue_len(), 0);
    }

    #[test]
    fn update_queue_advances_only_after_the_node_confirms_it_applied() {
        let mut router = HubRouter::new(RecordingSink::default());
        let addr = Address::from_u16(7);
        let seq1 = router.enqueue_update(addr, PendingUpdateKind::SetWakeInterval { seconds: 3600 }, 0);
        let seq2 = router.enqueue_update(addr, PendingUpdateKind::SetDateTime { unix_ts: 1000 }, 0);

        let first = router.check_updates(addr, 0).unwrap();
        assert_eq!(first.seq, seq1);

        // Node re-asks without applying yet: still the same item.
        let still_first = router.check_updates(addr, 0).unwrap();
        assert_eq!(still_first.seq, seq1);

        // Node confirms it applied seq1.
        let second = router.check_updates(addr, seq1).unwrap();
        assert_eq!(second.seq, seq2);

        let none = router.check_updates(addr, seq2);
        assert!(none.is_none());
    }

    #[test]
    fn clear_old_routes_drops_only_stale_entries() {
        let mut router = HubRouter::new(RecordingSink::default());
        router.update_route_online(Address::from_u16(1), 0);
        router.update_route_online(Address::from_u16(2), 1_000_000);
        let cleared = router.clear_old_routes(1_000_000, 3_600_000 / 2);
        assert_eq!(cleared, 1);
        assert!(router.route(Address::from_u16(1)).is_none());
        assert!(router.route(Address::from_u16(2)).is_some());
    }
}
