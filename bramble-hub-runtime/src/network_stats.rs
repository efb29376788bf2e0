//! Per-peer rolling link-quality and delivery metrics (§4.9, grounded in
//! the original `network_stats.h`'s fixed-window RSSI/SNR tracking and
//! per-criticality delivery counters).

use std::collections::HashMap;
use std::collections::VecDeque;

use bramble_protocol::{Address, Criticality};

/// Fixed rolling-window size for RSSI/SNR samples per peer.
pub const WINDOW_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkQuality {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl LinkQuality {
    /// §4.9 thresholds: Excellent > -60 dBm, Good > -80, Fair > -100, else Poor.
    pub fn from_rssi(rssi_dbm: i16) -> LinkQuality {
        if rssi_dbm > -60 {
            LinkQuality::Excellent
        } else if rssi_dbm > -80 {
            LinkQuality::Good
        } else if rssi_dbm > -100 {
            LinkQuality::Fair
        } else {
            LinkQuality::Poor
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CriticalityCounters {
    pub sent: u32,
    pub delivered: u32,
    pub timeouts: u32,
    pub retries: u32,
    pub max_retries: u32,
}

fn criticality_index(c: Criticality) -> usize {
    match c {
        Criticality::BestEffort => 0,
        Criticality::Reliable => 1,
        Criticality::Critical => 2,
    }
}

/// Per-peer rolling state (§4.9).
pub struct PeerStats {
    rssi: VecDeque<i16>,
    snr: VecDeque<i16>,
    counters: [CriticalityCounters; 3],
    current_quality: LinkQuality,
    quality_since_ms: u64,
    last_transition_duration_ms: u64,
}

impl PeerStats {
    fn new(now_ms: u64) -> Self {
        PeerStats {
            rssi: VecDeque::with_capacity(WINDOW_SIZE),
            snr: VecDeque::with_capacity(WINDOW_SIZE),
            counters: Default::default(),
            current_quality: LinkQuality::Poor,
            quality_since_ms: now_ms,
            last_transition_duration_ms: 0,
        }
    }

    fn push_sample(window: &mut VecDeque<i16>, value: i16) {
        if window.len() == WINDOW_SIZE {
            window.pop_front();
        }
        window.push_back(value);
    }

    pub fn record_reception(&mut self, rssi_dbm: i16, snr_db: i16, now_ms: u64) {
        Self::push_sample(&mut self.rssi, rssi_dbm);
        Self::push_sample(&mut self.snr, snr_db);

        let quality = LinkQuality::from_rssi(rssi_dbm);
        if quality != self.current_quality {
            self.last_transition_duration_ms = now_ms.saturating_sub(self.quality_since_ms);
            tracing::info!(
                from = ?self.current_quality,
                to = ?quality,
                spent_ms = self.last_transition_duration_ms,
                "link quality transition"
            );
            self.current_quality = quality;
            self.quality_since_ms = now_ms;
        }
    }

    pub fn record_sent(&mut self, criticality: Criticality) {
        self.counters[criticality_index(criticality)].sent += 1;
    }

    pub fn record_delivered(&mut self, criticality: Criticality) {
        self.counters[criticality_index(criticality)].delivered += 1;
    }

    pub fn record_timeout(&mut self, criticality: Criticality) {
        self.counters[criticality_index(criticality)].timeouts += 1;
    }

    pub fn record_retry(&mut self, criticality: Criticality) {
        self.counters[criticality_index(criticality)].retries += 1;
    }

    pub fn record_max_retries_hit(&mut self, criticality: Criticality) {
        self.counters[criticality_index(criticality)].max_retries += 1;
    }

    pub fn counters(&self, criticality: Criticality) -> CriticalityCounters {
        self.counters[criticality_index(criticality)]
    }

    pub fn current_quality(&self) -> LinkQuality {
        self.current_quality
    }

    pub fn rssi_mean(&self) -> f32 {
        mean(&self.rssi)
    }

    pub fn rssi_stddev(&self) -> f32 {
        stddev(&self.rssi)
    }

    pub fn snr_mean(&self) -> f32 {
        mean(&self.snr)
    }

    /// `p` in `0.0..=1.0`. Nearest-rank percentile over a sorted copy of the
    /// window; `O(window log window)`, fine at `WINDOW_SIZE = 100`.
    pub fn rssi_percentile(&self, p: f32) -> Option<i16> {
        percentile(&self.rssi, p)
    }

    /// True once at least 10 samples are present and the second half of the
    /// window's RSSI mean exceeds the first half's by more than 2 dB
    /// (§4.9: trend detection).
    pub fn is_trending_up(&self) -> bool {
        if self.rssi.len() < 10 {
            return false;
        }
        let mid = self.rssi.len() / 2;
        let first_half: Vec<i16> = self.rssi.iter().take(mid).copied().collect();
        let second_half: Vec<i16> = self.rssi.iter().skip(mid).copied().collect();
        let first_mean = mean(&first_half.into_iter().collect());
        let second_mean = mean(&second_half.into_iter().collect());
        second_mean - first_mean > 2.0
    }
}

fn mean(window: &VecDeque<i16>) -> f32 {
    if window.is_empty() {
        return 0.0;
    }
    let sum: i64 = window.iter().map(|&v| v as i64).sum();
    sum as f32 / window.len() as f32
}

fn stddev(window: &VecDeque<i16>) -> f32 {
    if window.len() < 2 {
        return 0.0;
    }
    let m = mean(window);
    let variance: f32 = window.iter().map(|&v| (v as f32 - m).powi(2)).sum::<f32>() / window.len() as f32;
    variance.sqrt()
}

fn percentile(window: &VecDeque<i16>, p: f32) -> Option<i16> {
    if window.is_empty() {
        return None;
    }
    let mut sorted: Vec<i16> = window.iter().copied().collect();
    sorted.sort_unstable();
    let rank = ((p.clamp(0.0, 1.0) * (sorted.len() - 1) as f32).round()) as usize;
    Some(sorted[rank])
}

/// Network-wide totals that don't belong to any one peer (§4.9).
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalCounters {
    pub total_messages_received: u64,
    pub total_acks_sent: u64,
    pub total_acks_received: u64,
    pub total_crc_errors: u64,
    pub total_invalid_messages: u64,
}

/// The hub's view across every peer it has heard from (§4.9).
#[derive(Default)]
pub struct NetworkStats {
    peers: HashMap<Address, PeerStats>,
    global: GlobalCounters,
}

impl NetworkStats {
    pub fn new() -> Self {
        NetworkStats::default()
    }

    fn peer_mut(&mut self, addr: Address, now_ms: u64) -> &mut PeerStats {
        self.peers.entry(addr).or_insert_with(|| PeerStats::new(now_ms))
    }

    pub fn record_reception(&mut self, addr: Address, rssi_dbm: i16, snr_db: i16, now_ms: u64) {
        self.global.total_messages_received += 1;
        self.peer_mut(addr, now_ms).record_reception(rssi_dbm, snr_db, now_ms);
    }

    pub fn record_sent(&mut self, addr: Address, criticality: Criticality, now_ms: u64) {
        self.peer_mut(addr, now_ms).record_sent(criticality);
    }

    pub fn record_delivered(&mut self, addr: Address, criticality: Criticality, now_ms: u64) {
        self.peer_mut(addr, now_ms).record_delivered(criticality);
    }

    pub fn record_timeout(&mut self, addr: Address, criticality: Criticality, now_ms: u64) {
        self.peer_mut(addr, now_ms).record_timeout(criticality);
    }

    pub fn record_retry(&mut self, addr: Address, criticality: Criticality, now_ms: u64) {
        self.peer_mut(addr, now_ms).record_retry(criticality);
    }

    pub fn record_max_retries_hit(&mut self, addr: Address, criticality: Criticality, now_ms: u64) {
        self.peer_mut(addr, now_ms).record_max_retries_hit(criticality);
    }

    pub fn record_ack_sent(&mut self) {
        self.global.total_acks_sent += 1;
    }

    pub fn record_ack_received(&mut self) {
        self.global.total_acks_received += 1;
    }

    pub fn record_crc_error(&mut self) {
        self.global.total_crc_errors += 1;
    }

    pub fn record_invalid_message(&mut self) {
        self.global.total_invalid_messages += 1;
    }

    pub fn peer(&self, addr: Address) -> Option<&PeerStats> {
        self.peers.get(&addr)
    }

    pub fn global(&self) -> GlobalCounters {
        self.global
    }

    /// Delivery rate computed only over `Reliable` + `Critical` traffic
    /// (§4.9: `BestEffort` sends have no ACK expectation and would
    /// otherwise deflate the ratio). `None` when nothing acked-or-not has
    /// ever been sent.
    pub fn overall_delivery_rate(&self) -> Option<f32> {
        let mut sent = 0u64;
        let mut delivered = 0u64;
        for peer in self.peers.values() {
            for c in [Criticality::Reliable, Criticality::Critical] {
                let counters = peer.counters(c);
                sent += counters.sent as u64;
                delivered += counters.delivered as u64;
            }
        }
        if sent == 0 {
            None
        } else {
            Some(delivered as f32 / sent as f32)
        }
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_quality_thresholds() {
        assert_eq!(LinkQuality::from_rssi(-50), LinkQuality::Excellent);
        assert_eq!(LinkQuality::from_rssi(-70), LinkQuality::Good);
        assert_eq!(LinkQuality::from_rssi(-90), LinkQuality::Fair);
        assert_eq!(LinkQuality::from_rssi(-110), LinkQuality::Poor);
        assert_eq!(LinkQuality::from_rssi(-60), LinkQuality::Good, "boundary is exclusive");
    }

    #[test]
    fn rolling_window_caps_at_window_size() {
        let mut stats = NetworkStats::new();
        let addr = Address::from_u16(1);
        for i in 0..150 {
            stats.record_reception(addr, -70 - (i % 5), -5, i as u64);
        }
        let peer = stats.peer(addr).unwrap();
        assert_eq!(peer.rssi.len(), WINDOW_SIZE);
    }

    #[test]
    fn delivery_rate_excludes_best_effort() {
        let mut stats = NetworkStats::new();
        let addr = Address::from_u16(1);
        stats.record_sent(addr, Criticality::BestEffort, 0);
        stats.record_sent(addr, Criticality::Reliable, 0);
        stats.record_delivered(addr, Criticality::Reliable, 0);
        // BestEffort sent-but-never-delivered would drag the ratio down to
        // 0.5 if it were counted; it must not be.
        assert_eq!(stats.overall_delivery_rate(), Some(1.0));
    }

    #[test]
    fn trend_requires_ten_samples_and_a_two_db_rise() {
        let mut stats = NetworkStats::new();
        let addr = Address::from_u16(1);
        for i in 0..9 {
            stats.record_reception(addr, -90, -5, i);
        }
        assert!(!stats.peer(addr).unwrap().is_trending_up(), "fewer than 10 samples");

        stats.record_reception(addr, -90, -5, 9);
        assert!(!stats.peer(addr).unwrap().is_trending_up(), "flat signal, no rise");

        let mut rising = NetworkStats::new();
        let addr2 = Address::from_u16(2);
        for i in 0..5 {
            rising.record_reception(addr2, -95, -5, i);
        }
        for i in 5..10 {
            rising.record_reception(addr2, -85, -5, i);
        }
        assert!(rising.peer(addr2).unwrap().is_trending_up());
    }

    #[test]
    fn quality_transition_is_logged_once_per_change() {
        let mut stats = NetworkStats::new();
        let addr = Address::from_u16(1);
        stats.record_reception(addr, -50, -5, 0); // Excellent
        assert_eq!(stats.peer(addr).unwrap().current_quality(), LinkQuality::Excellent);
        stats.record_reception(addr, -90, -5, 1_000); // drops to Fair
        assert_eq!(stats.peer(addr).unwrap().current_quality(), LinkQuality::Fair);
        assert_eq!(stats.peer(addr).unwrap().last_transition_duration_ms, 1_000);
    }
}
