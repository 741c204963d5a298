//! Broadcast hub for the live history feed
//!
//! The hub owns the registry of live subscribers behind a single mutex. Both
//! `subscribe` and `publish` run under it, so a subscriber's snapshot and the
//! updates that follow it never overlap and never leave a gap.
//!
//! Lock order is hub, then ledger. The ledger never calls back into the hub.

use crate::config::HubConfig;
use crate::error::{DeliveryFailure, HubError};
use calc_protocol::{BroadcastEvent, CalculationRecord};
use history_ledger::HistoryLedger;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Identifier of a registered subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Handle returned to the owner of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscriber {
    /// Registry identifier, used to unsubscribe
    pub id: SubscriberId,

    /// Highest sequence contained in the delivered snapshot
    pub watermark: u64,
}

struct Registration {
    sender: mpsc::Sender<BroadcastEvent>,
    watermark: u64,
}

struct HubState {
    subscribers: HashMap<SubscriberId, Registration>,
    next_id: u64,
    /// Highest sequence already fanned out
    last_delivered: u64,
}

/// Fans out newly appended records to live subscribers
pub struct BroadcastHub {
    ledger: Arc<HistoryLedger>,
    max_subscribers: usize,
    state: Mutex<HubState>,
}

impl BroadcastHub {
    /// Create a hub over `ledger`
    ///
    /// Records already in the ledger are treated as delivered.
    pub fn new(ledger: Arc<HistoryLedger>, config: &HubConfig) -> Self {
        let last_delivered = ledger.last_sequence();
        Self {
            ledger,
            max_subscribers: config.max_subscribers,
            state: Mutex::new(HubState { subscribers: HashMap::new(), next_id: 1, last_delivered }),
        }
    }

    /// Register `sender` and enqueue the current snapshot on it
    pub fn subscribe(&self, sender: mpsc::Sender<BroadcastEvent>) -> Result<Subscriber, HubError> {
        let mut state = self.state.lock();

        if state.subscribers.values().any(|r| r.sender.same_channel(&sender)) {
            return Err(HubError::AlreadySubscribed);
        }
        if state.subscribers.len() >= self.max_subscribers {
            warn!("Subscriber limit of {} reached, rejecting subscription", self.max_subscribers);
            return Err(HubError::CapacityExceeded(self.max_subscribers));
        }

        let snapshot = self.ledger.snapshot();
        let watermark = snapshot.last_sequence();
        let snapshot_len = snapshot.len();

        if sender.try_send(BroadcastEvent::Snapshot(snapshot)).is_err() {
            return Err(HubError::ChannelClosed);
        }

        let id = SubscriberId(state.next_id);
        state.next_id += 1;
        state.subscribers.insert(id, Registration { sender, watermark });

        metrics::gauge!("calc_subscribers", state.subscribers.len() as f64);
        info!("Subscriber {} registered with {} records (watermark {})", id, snapshot_len, watermark);

        Ok(Subscriber { id, watermark })
    }

    /// Fan out every record up to and including `record`
    ///
    /// Records between the last delivered sequence and `record` are taken from
    /// the ledger, so an earlier record whose own publish has not run yet is
    /// delivered first. Subscribers whose queue is full or closed are removed.
    /// Returns the number of records fanned out.
    pub fn publish(&self, record: &CalculationRecord) -> usize {
        let mut state = self.state.lock();

        if record.sequence <= state.last_delivered {
            debug!("Record {} already delivered", record.sequence);
            return 0;
        }

        let pending = self.ledger.records_between(state.last_delivered, record.sequence);
        let mut failed: Vec<(SubscriberId, DeliveryFailure)> = Vec::new();

        for pending_record in &pending {
            for (id, registration) in state.subscribers.iter() {
                if pending_record.sequence <= registration.watermark {
                    continue;
                }
                if failed.iter().any(|(failed_id, _)| failed_id == id) {
                    continue;
                }

                let event = BroadcastEvent::Update(pending_record.clone());
                if let Err(e) = registration.sender.try_send(event) {
                    failed.push((*id, DeliveryFailure::from(e)));
                }
            }
        }

        for (id, reason) in &failed {
            state.subscribers.remove(id);
            warn!("Dropping subscriber {}: {}", id, reason);
            metrics::increment_counter!("calc_subscribers_dropped_total");
        }
        if !failed.is_empty() {
            metrics::gauge!("calc_subscribers", state.subscribers.len() as f64);
        }

        state.last_delivered = record.sequence;
        pending.len()
    }

    /// Remove a subscriber; returns whether it was registered
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut state = self.state.lock();
        let removed = state.subscribers.remove(&id).is_some();

        if removed {
            metrics::gauge!("calc_subscribers", state.subscribers.len() as f64);
            info!("Subscriber {} unsubscribed", id);
        }

        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    pub fn is_subscribed(&self, id: SubscriberId) -> bool {
        self.state.lock().subscribers.contains_key(&id)
    }

    /// Highest sequence already fanned out
    pub fn last_delivered(&self) -> u64 {
        self.state.lock().last_delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calc_protocol::{CalculationRequest, Mode, Snapshot};

    fn hub_with(max_subscribers: usize) -> (Arc<HistoryLedger>, BroadcastHub) {
        let ledger = Arc::new(HistoryLedger::in_memory());
        let config = HubConfig { max_subscribers, ..HubConfig::default() };
        let hub = BroadcastHub::new(ledger.clone(), &config);
        (ledger, hub)
    }

    fn append(ledger: &HistoryLedger, expression: &str) -> CalculationRecord {
        ledger.append(&CalculationRequest::new(expression, Mode::Integer), "0").unwrap()
    }

    fn expect_snapshot(rx: &mut mpsc::Receiver<BroadcastEvent>) -> Snapshot {
        match rx.try_recv() {
            Ok(BroadcastEvent::Snapshot(snapshot)) => snapshot,
            other => panic!("Expected snapshot, got {other:?}"),
        }
    }

    fn drain_updates(rx: &mut mpsc::Receiver<BroadcastEvent>) -> Vec<u64> {
        let mut sequences = Vec::new();
        while let Ok(event) = rx.try_recv() {
            match event {
                BroadcastEvent::Update(record) => sequences.push(record.sequence),
                BroadcastEvent::Snapshot(_) => panic!("Unexpected second snapshot"),
            }
        }
        sequences
    }

    #[test]
    fn test_subscribe_delivers_snapshot_first() {
        let (ledger, hub) = hub_with(8);
        append(&ledger, "1 + 1");
        append(&ledger, "2 + 2");

        let (tx, mut rx) = mpsc::channel(16);
        let subscriber = hub.subscribe(tx).unwrap();

        assert_eq!(subscriber.watermark, 2);
        assert_eq!(expect_snapshot(&mut rx).len(), 2);
        assert!(hub.is_subscribed(subscriber.id));
    }

    #[test]
    fn test_publish_delivers_in_order() {
        let (ledger, hub) = hub_with(8);
        let (tx, mut rx) = mpsc::channel(16);
        hub.subscribe(tx).unwrap();
        expect_snapshot(&mut rx);

        let first = append(&ledger, "1");
        let second = append(&ledger, "2");
        hub.publish(&first);
        hub.publish(&second);

        assert_eq!(drain_updates(&mut rx), vec![1, 2]);
    }

    #[test]
    fn test_out_of_order_publish_neither_drops_nor_duplicates() {
        let (ledger, hub) = hub_with(8);
        let (tx, mut rx) = mpsc::channel(16);
        hub.subscribe(tx).unwrap();
        expect_snapshot(&mut rx);

        let first = append(&ledger, "1");
        let second = append(&ledger, "2");

        assert_eq!(hub.publish(&second), 2);
        assert_eq!(hub.publish(&first), 0);

        assert_eq!(drain_updates(&mut rx), vec![1, 2]);
    }

    #[test]
    fn test_snapshot_taken_before_publish_is_not_duplicated() {
        let (ledger, hub) = hub_with(8);

        // Appended but not yet published when the subscriber joins
        let pending = append(&ledger, "1");

        let (tx, mut rx) = mpsc::channel(16);
        let subscriber = hub.subscribe(tx).unwrap();
        assert_eq!(subscriber.watermark, 1);
        assert_eq!(expect_snapshot(&mut rx).last_sequence(), 1);

        hub.publish(&pending);
        let next = append(&ledger, "2");
        hub.publish(&next);

        assert_eq!(drain_updates(&mut rx), vec![2]);
    }

    #[test]
    fn test_duplicate_channel_rejected() {
        let (_ledger, hub) = hub_with(8);
        let (tx, _rx) = mpsc::channel(16);

        hub.subscribe(tx.clone()).unwrap();
        assert_eq!(hub.subscribe(tx), Err(HubError::AlreadySubscribed));
        assert_eq!(hub.subscriber_count(), 1);
    }

    #[test]
    fn test_capacity_enforced() {
        let (_ledger, hub) = hub_with(1);
        let (tx1, _rx1) = mpsc::channel(4);
        let (tx2, _rx2) = mpsc::channel(4);

        hub.subscribe(tx1).unwrap();
        assert_eq!(hub.subscribe(tx2), Err(HubError::CapacityExceeded(1)));
    }

    #[test]
    fn test_closed_channel_rejected_at_subscribe() {
        let (_ledger, hub) = hub_with(8);
        let (tx, rx) = mpsc::channel(4);
        drop(rx);

        assert_eq!(hub.subscribe(tx), Err(HubError::ChannelClosed));
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn test_severed_subscriber_removed_without_affecting_others() {
        let (ledger, hub) = hub_with(8);

        let (dead_tx, dead_rx) = mpsc::channel(4);
        let dead = hub.subscribe(dead_tx).unwrap();
        drop(dead_rx);

        let (live_tx, mut live_rx) = mpsc::channel(4);
        hub.subscribe(live_tx).unwrap();
        expect_snapshot(&mut live_rx);

        let record = append(&ledger, "1");
        hub.publish(&record);

        assert!(!hub.is_subscribed(dead.id));
        assert_eq!(hub.subscriber_count(), 1);
        assert_eq!(drain_updates(&mut live_rx), vec![1]);
    }

    #[test]
    fn test_slow_subscriber_dropped_when_queue_full() {
        let (ledger, hub) = hub_with(8);

        // Room for the snapshot and one update
        let (tx, mut rx) = mpsc::channel(2);
        let subscriber = hub.subscribe(tx).unwrap();

        for i in 0..3 {
            let record = append(&ledger, &i.to_string());
            hub.publish(&record);
        }

        assert!(!hub.is_subscribed(subscriber.id));
        expect_snapshot(&mut rx);
        assert_eq!(drain_updates(&mut rx), vec![1]);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let (_ledger, hub) = hub_with(8);
        let (tx, _rx) = mpsc::channel(4);
        let subscriber = hub.subscribe(tx).unwrap();

        assert!(hub.unsubscribe(subscriber.id));
        assert!(!hub.unsubscribe(subscriber.id));
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn test_existing_history_counts_as_delivered() {
        let ledger = Arc::new(HistoryLedger::in_memory());
        let old = append(&ledger, "1");

        let hub = BroadcastHub::new(ledger.clone(), &HubConfig::default());
        assert_eq!(hub.last_delivered(), 1);
        assert_eq!(hub.publish(&old), 0);
    }

    #[test]
    fn test_concurrent_publishers_keep_stream_gap_free() {
        let (ledger, hub) = hub_with(8);
        let hub = Arc::new(hub);

        let (tx, mut rx) = mpsc::channel(1024);
        hub.subscribe(tx).unwrap();
        expect_snapshot(&mut rx);

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let ledger = ledger.clone();
                let hub = hub.clone();
                std::thread::spawn(move || {
                    for i in 0..20 {
                        let record = append(&ledger, &format!("{t} + {i}"));
                        hub.publish(&record);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let expected: Vec<u64> = (1..=160).collect();
        assert_eq!(drain_updates(&mut rx), expected);
    }

    #[test]
    fn test_subscribers_joining_mid_stream_see_every_record_once() {
        let (ledger, hub) = hub_with(64);
        let hub = Arc::new(hub);
        let (writers, per_writer, joiners) = (6u64, 40u64, 24);

        let writer_handles: Vec<_> = (0..writers)
            .map(|t| {
                let ledger = ledger.clone();
                let hub = hub.clone();
                std::thread::spawn(move || {
                    for i in 0..per_writer {
                        let record = append(&ledger, &format!("{t} + {i}"));
                        hub.publish(&record);
                    }
                })
            })
            .collect();

        let joiner_handles: Vec<_> = (0..joiners)
            .map(|j| {
                let hub = hub.clone();
                std::thread::spawn(move || {
                    std::thread::sleep(std::time::Duration::from_micros(j * 150));
                    let (tx, rx) = mpsc::channel(1024);
                    hub.subscribe(tx).unwrap();
                    rx
                })
            })
            .collect();

        for handle in writer_handles {
            handle.join().unwrap();
        }
        let receivers: Vec<_> = joiner_handles.into_iter().map(|h| h.join().unwrap()).collect();

        let total = writers * per_writer;
        for mut rx in receivers {
            let snapshot = expect_snapshot(&mut rx);
            let mut seen: Vec<u64> = snapshot.records().iter().map(|r| r.sequence).collect();
            seen.extend(drain_updates(&mut rx));

            let expected: Vec<u64> = (1..=total).collect();
            assert_eq!(seen, expected, "snapshot ended at {}", snapshot.last_sequence());
        }
    }
}
