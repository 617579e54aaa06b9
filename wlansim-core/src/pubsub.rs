//! Topic-based publish/subscribe used to wake services blocked on
//! cross-device events (e.g. "AP aa:bb:cc:dd:ee:01 joined").
//!
//! Subscriptions are one-shot: publishing a matching event triggers and
//! deregisters every subscriber of that topic. A service that needs to keep
//! watching re-subscribes when it resumes. The bus is owned by a single
//! scheduler thread, so there is no locking here.

use std::collections::HashMap;

/// Subscription handle.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SubId(u64);

/// An event as delivered to a subscriber.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceEvent {
    pub topic: String,
    pub value: String,
}

/// Builds the conventional topic for a device-service event.
pub fn device_topic(device: impl std::fmt::Display, service: &str, value: &str) -> String {
    format!("device/{device}/{service}/{value}")
}

#[derive(Default)]
pub struct PubSub {
    next_id: u64,
    subs_by_topic: HashMap<String, Vec<SubId>>,
    topic_by_sub: HashMap<SubId, String>,
}

impl PubSub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a one-shot subscription on `topic`.
    pub fn subscribe(&mut self, topic: &str) -> SubId {
        let id = SubId(self.next_id);
        self.next_id += 1;
        self.subs_by_topic
            .entry(topic.to_string())
            .or_default()
            .push(id);
        self.topic_by_sub.insert(id, topic.to_string());
        id
    }

    /// Deregisters a subscription that has not fired yet.
    pub fn unsubscribe(&mut self, id: SubId) {
        if let Some(topic) = self.topic_by_sub.remove(&id) {
            if let Some(subs) = self.subs_by_topic.get_mut(&topic) {
                subs.retain(|s| *s != id);
                if subs.is_empty() {
                    self.subs_by_topic.remove(&topic);
                }
            }
        }
    }

    /// Publishes `value` on `topic`, returning every triggered subscriber
    /// together with the event payload. Triggered subscriptions are
    /// deregistered.
    pub fn publish(&mut self, topic: &str, value: &str) -> Vec<(SubId, ServiceEvent)> {
        let Some(subs) = self.subs_by_topic.remove(topic) else {
            return Vec::new();
        };
        let mut woken = Vec::with_capacity(subs.len());
        for id in subs {
            self.topic_by_sub.remove(&id);
            woken.push((
                id,
                ServiceEvent {
                    topic: topic.to_string(),
                    value: value.to_string(),
                },
            ));
        }
        woken
    }

    pub fn pending_subscriptions(&self) -> usize {
        self.topic_by_sub.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_wakes_all_subscribers_once() {
        let mut bus = PubSub::new();
        let a = bus.subscribe("device/m1/join/joined");
        let b = bus.subscribe("device/m1/join/joined");

        let woken = bus.publish("device/m1/join/joined", "joined");
        let ids: Vec<SubId> = woken.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![a, b]);
        assert_eq!(woken[0].1.value, "joined");

        // one-shot: a second publish finds nobody
        assert!(bus.publish("device/m1/join/joined", "joined").is_empty());
    }

    #[test]
    fn topics_are_independent() {
        let mut bus = PubSub::new();
        bus.subscribe("device/m1/join/joined");
        assert!(bus.publish("device/m2/join/joined", "joined").is_empty());
        assert_eq!(bus.pending_subscriptions(), 1);
    }

    #[test]
    fn unsubscribe_removes_pending_subscription() {
        let mut bus = PubSub::new();
        let id = bus.subscribe("t");
        bus.unsubscribe(id);
        assert!(bus.publish("t", "v").is_empty());
        assert_eq!(bus.pending_subscriptions(), 0);
    }
}
