//! # Message router
//!
//! [`Router`] keeps the live set of stream subscriptions and fans inbound
//! messages out to every subscriber whose filter matches. A subscriber whose
//! writer reports failure is marked inactive and skipped from then on;
//! [`Router::cleanup_inactive`] compacts the set.

use parking_lot::Mutex;

use crate::grpc::proto::{MavlinkMessage, StreamFilter};

/// Delivery function of a single subscription.
///
/// Returns `false` when the delivery channel has failed and the
/// subscription must be retired. Writers run while the router lock is held,
/// so they must neither block nor call back into the router.
pub type SubscriberWriter = Box<dyn Fn(&MavlinkMessage) -> bool + Send>;

/// Returns `true` if `message` passes `filter`.
///
/// Each of the three predicates accepts on its zero/empty value: a filter
/// of all defaults matches everything.
pub fn filter_matches(filter: &StreamFilter, message: &MavlinkMessage) -> bool {
    if filter.system_id != 0 && message.system_id != filter.system_id {
        return false;
    }

    if filter.component_id != 0 && message.component_id != filter.component_id {
        return false;
    }

    if !filter.message_ids.is_empty() && !filter.message_ids.contains(&message.message_id) {
        return false;
    }

    true
}

struct Subscription {
    id: u64,
    filter: StreamFilter,
    writer: SubscriberWriter,
    active: bool,
}

#[derive(Default)]
struct RouterState {
    subscriptions: Vec<Subscription>,
    next_id: u64,
}

/// Thread-safe registry of stream subscriptions with fan-out delivery.
///
/// Subscription ids grow monotonically and are never reused within one
/// process lifetime. Within a single subscription, delivery order equals
/// the order messages were routed; no order is promised across subscribers.
#[derive(Default)]
pub struct Router {
    state: Mutex<RouterState>,
}

impl Router {
    /// Creates an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscription and returns its id.
    pub fn subscribe(&self, filter: StreamFilter, writer: SubscriberWriter) -> u64 {
        let mut state = self.state.lock();

        let id = state.next_id;
        state.next_id += 1;

        log::info!(
            "router: subscribed (id: {id}, sys: {}, comp: {}, msgs: {})",
            filter.system_id,
            filter.component_id,
            filter.message_ids.len()
        );

        state.subscriptions.push(Subscription {
            id,
            filter,
            writer,
            active: true,
        });

        id
    }

    /// Removes the subscription with the given id.
    ///
    /// Returns `true` iff a subscription was found and removed.
    pub fn unsubscribe(&self, id: u64) -> bool {
        let mut state = self.state.lock();

        match state.subscriptions.iter().position(|sub| sub.id == id) {
            Some(index) => {
                state.subscriptions.remove(index);
                log::info!("router: unsubscribed (id: {id})");
                true
            }
            None => false,
        }
    }

    /// Delivers `message` to every active matching subscription.
    ///
    /// A writer returning `false` marks its subscription inactive; the
    /// record is kept in place until [`cleanup_inactive`](Router::cleanup_inactive)
    /// or [`unsubscribe`](Router::unsubscribe) so that iteration stays
    /// simple. Returns the number of successful deliveries.
    pub fn route_message(&self, message: &MavlinkMessage) -> usize {
        let mut state = self.state.lock();
        let mut delivered = 0;

        for sub in state.subscriptions.iter_mut() {
            if !sub.active || !filter_matches(&sub.filter, message) {
                continue;
            }

            if (sub.writer)(message) {
                delivered += 1;
            } else {
                sub.active = false;
                log::warn!("router: stream write failed, marking inactive (id: {})", sub.id);
            }
        }

        delivered
    }

    /// Number of currently active subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.state
            .lock()
            .subscriptions
            .iter()
            .filter(|sub| sub.active)
            .count()
    }

    /// Drops inactive subscription records, returning how many were removed.
    pub fn cleanup_inactive(&self) -> usize {
        let mut state = self.state.lock();

        let before = state.subscriptions.len();
        state.subscriptions.retain(|sub| sub.active);
        let removed = before - state.subscriptions.len();

        if removed > 0 {
            log::info!("router: cleaned up {removed} inactive subscriptions");
        }

        removed
    }

    /// Removes every subscription, active or not.
    ///
    /// Dropping the writers closes their delivery channels, which ends the
    /// corresponding client streams. Used on bridge shutdown.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        let dropped = state.subscriptions.len();
        state.subscriptions.clear();

        if dropped > 0 {
            log::info!("router: dropped {dropped} subscriptions on shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn message(message_id: u32) -> MavlinkMessage {
        MavlinkMessage {
            system_id: 1,
            component_id: 1,
            message_id,
            sequence: 0,
            payload: None,
        }
    }

    fn message_from(system_id: u32, component_id: u32) -> MavlinkMessage {
        MavlinkMessage {
            system_id,
            component_id,
            message_id: 0,
            sequence: 0,
            payload: None,
        }
    }

    fn collector() -> (SubscriberWriter, Arc<Mutex<Vec<u32>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let writer: SubscriberWriter = Box::new(move |message: &MavlinkMessage| {
            sink.lock().push(message.message_id);
            true
        });
        (writer, seen)
    }

    #[test]
    fn filter_zero_values_match_anything() {
        let filter = StreamFilter::default();
        assert!(filter_matches(&filter, &message_from(42, 17)));
    }

    #[test]
    fn filter_predicates_are_conjunctive() {
        let filter = StreamFilter {
            system_id: 1,
            component_id: 2,
            message_ids: vec![0, 33],
        };

        assert!(filter_matches(&filter, &message_from(1, 2)));
        assert!(!filter_matches(&filter, &message_from(3, 2)));
        assert!(!filter_matches(&filter, &message_from(1, 3)));

        let mut wrong_id = message_from(1, 2);
        wrong_id.message_id = 76;
        assert!(!filter_matches(&filter, &wrong_id));
    }

    #[test]
    fn fan_out_respects_filters_and_preserves_order() {
        let router = Router::new();

        let (writer_a, seen_a) = collector();
        let (writer_b, seen_b) = collector();

        router.subscribe(StreamFilter::default(), writer_a);
        router.subscribe(
            StreamFilter {
                message_ids: vec![0],
                ..Default::default()
            },
            writer_b,
        );

        for id in [0, 1, 0] {
            router.route_message(&message(id));
        }

        assert_eq!(*seen_a.lock(), vec![0, 1, 0]);
        assert_eq!(*seen_b.lock(), vec![0, 0]);
    }

    #[test]
    fn route_returns_delivered_count() {
        let router = Router::new();
        let (writer_a, _) = collector();
        let (writer_b, _) = collector();

        router.subscribe(StreamFilter::default(), writer_a);
        router.subscribe(StreamFilter::default(), writer_b);

        assert_eq!(router.route_message(&message(0)), 2);
    }

    #[test]
    fn failing_writer_is_evicted_after_its_budget() {
        let router = Router::new();

        let budget = Arc::new(AtomicUsize::new(10));
        let countdown = budget.clone();
        let deliveries = Arc::new(AtomicUsize::new(0));
        let delivered = deliveries.clone();

        router.subscribe(
            StreamFilter::default(),
            Box::new(move |_| {
                if countdown.fetch_sub(1, Ordering::Relaxed) == 0 {
                    return false;
                }
                delivered.fetch_add(1, Ordering::Relaxed);
                true
            }),
        );

        // Writer accepts 10 messages, fails on the 11th, never sees a 12th.
        for _ in 0..12 {
            router.route_message(&message(0));
        }

        assert_eq!(deliveries.load(Ordering::Relaxed), 10);
        assert_eq!(router.subscription_count(), 0);
        assert_eq!(router.cleanup_inactive(), 1);
        assert_eq!(router.cleanup_inactive(), 0);
    }

    #[test]
    fn unsubscribe_removes_only_the_target() {
        let router = Router::new();
        let (writer_a, _) = collector();
        let (writer_b, _) = collector();

        let first = router.subscribe(StreamFilter::default(), writer_a);
        let second = router.subscribe(StreamFilter::default(), writer_b);

        assert!(router.unsubscribe(first));
        assert!(!router.unsubscribe(first));
        assert_eq!(router.subscription_count(), 1);
        assert!(router.unsubscribe(second));
    }

    #[test]
    fn ids_are_unique_and_monotonic() {
        let router = Router::new();
        let mut ids = Vec::new();

        for _ in 0..100 {
            let (writer, _) = collector();
            let id = router.subscribe(StreamFilter::default(), writer);
            router.unsubscribe(id);
            ids.push(id);
        }

        for pair in ids.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn clear_drops_everything() {
        let router = Router::new();
        for _ in 0..3 {
            let (writer, _) = collector();
            router.subscribe(StreamFilter::default(), writer);
        }

        router.clear();
        assert_eq!(router.subscription_count(), 0);
        assert_eq!(router.route_message(&message(0)), 0);
    }
}
