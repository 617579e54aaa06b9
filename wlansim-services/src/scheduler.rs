//! Cooperative service scheduler.
//!
//! Runs many device services in one thread over logical time. Only one
//! service executes at any instant; a service yields by returning a
//! [`Step`] and is resumed when its timer fires, a frame for its device
//! arrives, or a topic it subscribed to is published. Services with the
//! same wake time resume in registration order.
//!
//! Admission is bounded: at most `max_concurrent` services are in flight
//! at once; as each reaches a terminal state the next pending one starts.

use std::collections::{HashMap, VecDeque};

use tracing::{debug, trace};
use wlansim_core::env::{Environment, TimerId};
use wlansim_core::pubsub::{device_topic, PubSub, SubId};
use wlansim_core::SimTime;

use crate::device::{Device, DeviceArena, DeviceId};
use crate::frame::Frame;
use crate::service::{Connection, DeviceService, Outcome, ServiceCtx, ServiceState, Step, Wake};

pub type SlotId = usize;

enum WaitKind {
    None,
    Packet,
    Event(SubId),
}

struct Slot {
    device: DeviceId,
    service: Box<dyn DeviceService + Send>,
    state: ServiceState,
    outcome: Option<Outcome>,
    timer: Option<TimerId>,
    wait: WaitKind,
}

/// Terminal-state counts for a batch of services.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub succeeded: usize,
    pub failed: usize,
    pub pending: usize,
}

impl RunReport {
    pub fn merge(&mut self, other: RunReport) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.pending += other.pending;
    }
}

pub struct Scheduler {
    env: Environment<SlotId>,
    bus: PubSub,
    arena: DeviceArena,
    slots: Vec<Slot>,
    subs: HashMap<SubId, SlotId>,
    pending: VecDeque<SlotId>,
    max_concurrent: usize,
    in_flight: usize,
}

impl Scheduler {
    pub fn new(max_concurrent: usize) -> Scheduler {
        Scheduler {
            env: Environment::new(),
            bus: PubSub::new(),
            arena: DeviceArena::new(),
            slots: Vec::new(),
            subs: HashMap::new(),
            pending: VecDeque::new(),
            max_concurrent: max_concurrent.max(1),
            in_flight: 0,
        }
    }

    pub fn add_device(&mut self, device: Device) -> DeviceId {
        self.arena.insert(device)
    }

    /// Adjusts the admission bound for subsequent batches; already-running
    /// services are unaffected.
    pub fn set_max_concurrent(&mut self, max_concurrent: usize) {
        self.max_concurrent = max_concurrent.max(1);
    }

    pub fn devices(&self) -> &DeviceArena {
        &self.arena
    }

    /// Queues a service for its device; it starts once admission allows.
    pub fn attach(&mut self, device: DeviceId, service: Box<dyn DeviceService + Send>) -> SlotId {
        let id = self.slots.len();
        self.slots.push(Slot {
            device,
            service,
            state: ServiceState::NotStarted,
            outcome: None,
            timer: None,
            wait: WaitKind::None,
        });
        self.pending.push_back(id);
        id
    }

    /// Starts queued services up to the concurrency bound.
    pub fn start_pending(&mut self, conn: &mut dyn Connection) {
        while self.in_flight < self.max_concurrent {
            let Some(id) = self.pending.pop_front() else {
                return;
            };
            self.start_slot(conn, id);
        }
    }

    pub fn now(&self) -> SimTime {
        self.env.now()
    }

    pub fn next_deadline(&mut self) -> Option<SimTime> {
        self.env.next_deadline()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn all_done(&self) -> bool {
        self.pending.is_empty() && self.slots.iter().all(|s| s.state == ServiceState::Done)
    }

    pub fn report(&self) -> RunReport {
        let mut report = RunReport::default();
        for slot in &self.slots {
            match slot.outcome {
                Some(Outcome::Success) => report.succeeded += 1,
                Some(Outcome::Failed) => report.failed += 1,
                None => report.pending += 1,
            }
        }
        report
    }

    /// Fires the single earliest due timer, if any is due by `deadline`.
    pub fn advance_next(&mut self, conn: &mut dyn Connection, deadline: SimTime) -> bool {
        match self.env.next_deadline() {
            Some(at) if at <= deadline => {
                if let Some((timer, slot)) = self.env.pop_due() {
                    self.on_timer(conn, timer, slot);
                }
                true
            }
            _ => false,
        }
    }

    /// Advances logical time to `deadline`, firing every due timer in
    /// (time, registration) order.
    pub fn advance_to(&mut self, conn: &mut dyn Connection, deadline: SimTime) {
        while self.advance_next(conn, deadline) {}
    }

    /// Routes an inbound frame to the waiting service of the destination
    /// device. Broadcast wakes every packet-waiting service; frames for
    /// unknown or non-waiting devices are dropped.
    pub fn deliver(&mut self, conn: &mut dyn Connection, frame: Frame) {
        let targets: Vec<SlotId> = if frame.dst.is_broadcast() {
            self.slots
                .iter()
                .enumerate()
                .filter(|(_, s)| matches!(s.wait, WaitKind::Packet))
                .map(|(id, _)| id)
                .collect()
        } else {
            match self.arena.find_by_mac(frame.dst) {
                Some(device) => self
                    .slots
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| s.device == device && matches!(s.wait, WaitKind::Packet))
                    .map(|(id, _)| id)
                    .collect(),
                None => {
                    trace!(dst = %frame.dst, "frame for unknown device dropped");
                    return;
                }
            }
        };
        for id in targets {
            self.resume_slot(conn, id, Wake::Packet(frame.clone()));
        }
    }

    /// Cancels everything: in-flight services get a final `stop`, queued
    /// ones never start, all non-terminal slots fail.
    pub fn stop_all(&mut self, conn: &mut dyn Connection) {
        self.pending.clear();
        for id in 0..self.slots.len() {
            if self.slots[id].state == ServiceState::Done {
                continue;
            }
            let started = self.slots[id].state != ServiceState::NotStarted;
            if started {
                let slot = &mut self.slots[id];
                if let Some(device) = self.arena.get_mut(slot.device) {
                    let mut ctx = ServiceCtx { device, conn };
                    slot.service.stop(&mut ctx);
                }
            }
            self.clear_wait(id);
            let slot = &mut self.slots[id];
            slot.state = ServiceState::Done;
            slot.outcome = Some(Outcome::Failed);
            if started {
                self.in_flight -= 1;
            }
        }
    }

    fn start_slot(&mut self, conn: &mut dyn Connection, id: SlotId) {
        let step = {
            let slot = &mut self.slots[id];
            let Some(device) = self.arena.get_mut(slot.device) else {
                slot.state = ServiceState::Done;
                slot.outcome = Some(Outcome::Failed);
                return;
            };
            slot.state = ServiceState::Running;
            debug!(service = slot.service.name(), device = %device.mac, "starting service");
            let mut ctx = ServiceCtx { device, conn };
            slot.service.start(&mut ctx)
        };
        self.in_flight += 1;
        self.apply_step(conn, id, step);
    }

    fn resume_slot(&mut self, conn: &mut dyn Connection, id: SlotId, wake: Wake) {
        let step = {
            let slot = &mut self.slots[id];
            if slot.state != ServiceState::Waiting {
                return;
            }
            let Some(device) = self.arena.get_mut(slot.device) else {
                return;
            };
            slot.state = ServiceState::Running;
            let mut ctx = ServiceCtx { device, conn };
            slot.service.resume(&mut ctx, wake)
        };
        if matches!(step, Step::KeepWaiting) {
            // The previous wait and its timer stay armed.
            self.slots[id].state = ServiceState::Waiting;
            return;
        }
        self.clear_wait(id);
        self.apply_step(conn, id, step);
    }

    fn apply_step(&mut self, conn: &mut dyn Connection, id: SlotId, step: Step) {
        match step {
            Step::Sleep(delay) => {
                let slot = &mut self.slots[id];
                slot.timer = Some(self.env.schedule_after(delay, id));
                slot.wait = WaitKind::None;
                slot.state = ServiceState::Waiting;
            }
            Step::WaitPacket { timeout } => {
                let slot = &mut self.slots[id];
                slot.timer = Some(self.env.schedule_after(timeout, id));
                slot.wait = WaitKind::Packet;
                slot.state = ServiceState::Waiting;
            }
            Step::WaitEvent { topic, timeout } => {
                let sub = self.bus.subscribe(&topic);
                self.subs.insert(sub, id);
                let slot = &mut self.slots[id];
                slot.timer = timeout.map(|t| self.env.schedule_after(t, id));
                slot.wait = WaitKind::Event(sub);
                slot.state = ServiceState::Waiting;
            }
            Step::KeepWaiting => {
                // Only meaningful from resume; from start it means wait
                // for nothing, treat as done-failed to surface the bug.
                let slot = &mut self.slots[id];
                slot.state = ServiceState::Done;
                slot.outcome = Some(Outcome::Failed);
                self.in_flight -= 1;
            }
            Step::Done(outcome) => self.finish_slot(conn, id, outcome),
        }
    }

    fn finish_slot(&mut self, conn: &mut dyn Connection, id: SlotId, outcome: Outcome) {
        let topic = {
            let slot = &mut self.slots[id];
            slot.state = ServiceState::Done;
            slot.outcome = Some(outcome);
            let mac = self.arena.get(slot.device).map(|d| d.mac);
            mac.map(|mac| device_topic(mac, slot.service.name(), "complete"))
        };
        self.in_flight -= 1;
        if let Some(topic) = topic {
            // One topic per service; the outcome travels in the value so
            // waiters learn about failures too.
            let value = match outcome {
                Outcome::Success => "done",
                Outcome::Failed => "failed",
            };
            debug!(%topic, value, "service finished");
            let woken = self.bus.publish(&topic, value);
            for (sub, event) in woken {
                if let Some(waiter) = self.subs.remove(&sub) {
                    self.resume_slot(
                        conn,
                        waiter,
                        Wake::Event {
                            topic: event.topic,
                            value: event.value,
                        },
                    );
                }
            }
        }
        self.start_pending(conn);
    }

    fn on_timer(&mut self, conn: &mut dyn Connection, timer: TimerId, id: SlotId) {
        let slot = &mut self.slots[id];
        if slot.timer != Some(timer) {
            return;
        }
        slot.timer = None;
        self.resume_slot(conn, id, Wake::Timer);
    }

    fn clear_wait(&mut self, id: SlotId) {
        let slot = &mut self.slots[id];
        if let Some(timer) = slot.timer.take() {
            self.env.cancel(timer);
        }
        if let WaitKind::Event(sub) = slot.wait {
            self.bus.unsubscribe(sub);
            self.subs.remove(&sub);
        }
        slot.wait = WaitKind::None;
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use wlansim_core::MacAddr;

    use super::*;
    use crate::error::ServicesError;
    use crate::frame::FrameKind;

    struct NullConn;

    impl Connection for NullConn {
        fn send(&mut self, _frame: &Frame) -> Result<(), ServicesError> {
            Ok(())
        }
    }

    fn mac(last: u8) -> MacAddr {
        MacAddr::new([0x02, 0, 0, 0, 0, last])
    }

    fn ap(last: u8) -> Device {
        Device::ap(
            mac(last),
            Ipv4Addr::new(10, 0, 0, last),
            9000 + last as u16,
            mac(0x80 + last),
            0,
        )
    }

    /// Sleeps once, then succeeds; records its wake order.
    struct SleepOnce {
        delay: Duration,
        order: Arc<Mutex<Vec<usize>>>,
        tag: usize,
    }

    impl DeviceService for SleepOnce {
        fn name(&self) -> &'static str {
            "sleep-once"
        }

        fn start(&mut self, _ctx: &mut ServiceCtx<'_>) -> Step {
            Step::Sleep(self.delay)
        }

        fn resume(&mut self, _ctx: &mut ServiceCtx<'_>, _wake: Wake) -> Step {
            if let Ok(mut order) = self.order.lock() {
                order.push(self.tag);
            }
            Step::Done(Outcome::Success)
        }
    }

    fn sleeper(delay: Duration, order: &Arc<Mutex<Vec<usize>>>, tag: usize) -> Box<SleepOnce> {
        Box::new(SleepOnce {
            delay,
            order: Arc::clone(order),
            tag,
        })
    }

    #[test]
    fn concurrency_never_exceeds_the_bound() {
        let mut sched = Scheduler::new(3);
        let mut conn = NullConn;
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..10u8 {
            let dev = sched.add_device(ap(i + 1));
            sched.attach(dev, sleeper(Duration::from_secs(1), &order, i as usize));
        }
        sched.start_pending(&mut conn);
        assert_eq!(sched.in_flight(), 3);
        let far = SimTime::from_secs_f64(100.0);
        while !sched.all_done() {
            assert!(sched.in_flight() <= 3);
            assert!(sched.advance_next(&mut conn, far), "stalled before done");
        }
        assert_eq!(
            sched.report(),
            RunReport {
                succeeded: 10,
                failed: 0,
                pending: 0
            }
        );
    }

    #[test]
    fn equal_deadlines_resume_in_registration_order() {
        let mut sched = Scheduler::new(8);
        let mut conn = NullConn;
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..4 {
            let dev = sched.add_device(ap(i + 1));
            sched.attach(dev, sleeper(Duration::from_secs(5), &order, i as usize));
        }
        sched.start_pending(&mut conn);
        sched.advance_to(&mut conn, SimTime::from_secs_f64(10.0));
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    /// Waits for a frame; noise keeps the wait armed.
    struct WaitForJoin;

    impl DeviceService for WaitForJoin {
        fn name(&self) -> &'static str {
            "wait-for-join"
        }

        fn start(&mut self, _ctx: &mut ServiceCtx<'_>) -> Step {
            Step::WaitPacket {
                timeout: Duration::from_secs(30),
            }
        }

        fn resume(&mut self, _ctx: &mut ServiceCtx<'_>, wake: Wake) -> Step {
            match wake {
                Wake::Packet(frame) if frame.kind == FrameKind::JoinResponse => {
                    Step::Done(Outcome::Success)
                }
                Wake::Packet(_) => Step::KeepWaiting,
                _ => Step::Done(Outcome::Failed),
            }
        }
    }

    #[test]
    fn frames_wake_only_the_addressed_device_and_noise_is_ignored() {
        let mut sched = Scheduler::new(4);
        let mut conn = NullConn;
        let a = sched.add_device(ap(1));
        let b = sched.add_device(ap(2));
        sched.attach(a, Box::new(WaitForJoin));
        sched.attach(b, Box::new(WaitForJoin));
        sched.start_pending(&mut conn);

        // Noise for device a: still waiting afterwards.
        sched.deliver(&mut conn, Frame::new(mac(1), mac(9), FrameKind::Data));
        assert_eq!(sched.report().pending, 2);

        sched.deliver(&mut conn, Frame::new(mac(1), mac(9), FrameKind::JoinResponse));
        let report = sched.report();
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.pending, 1);

        // Unknown destination is dropped silently.
        sched.deliver(&mut conn, Frame::new(mac(7), mac(9), FrameKind::JoinResponse));
        assert_eq!(sched.report().pending, 1);
    }

    #[test]
    fn broadcast_wakes_every_waiting_service() {
        let mut sched = Scheduler::new(4);
        let mut conn = NullConn;
        for i in 0..3 {
            let dev = sched.add_device(ap(i + 1));
            sched.attach(dev, Box::new(WaitForJoin));
        }
        sched.start_pending(&mut conn);
        sched.deliver(
            &mut conn,
            Frame::new(MacAddr::BROADCAST, mac(9), FrameKind::JoinResponse),
        );
        assert_eq!(sched.report().succeeded, 3);
    }

    /// Completes immediately so others can wait on its completion topic.
    struct Instant;

    impl DeviceService for Instant {
        fn name(&self) -> &'static str {
            "instant"
        }

        fn start(&mut self, _ctx: &mut ServiceCtx<'_>) -> Step {
            Step::Done(Outcome::Success)
        }

        fn resume(&mut self, _ctx: &mut ServiceCtx<'_>, _wake: Wake) -> Step {
            Step::Done(Outcome::Failed)
        }
    }

    struct WaitForTopic {
        topic: String,
    }

    impl DeviceService for WaitForTopic {
        fn name(&self) -> &'static str {
            "wait-for-topic"
        }

        fn start(&mut self, _ctx: &mut ServiceCtx<'_>) -> Step {
            Step::WaitEvent {
                topic: self.topic.clone(),
                timeout: None,
            }
        }

        fn resume(&mut self, _ctx: &mut ServiceCtx<'_>, wake: Wake) -> Step {
            match wake {
                Wake::Event { value, .. } if value == "done" => Step::Done(Outcome::Success),
                _ => Step::Done(Outcome::Failed),
            }
        }
    }

    #[test]
    fn completion_events_wake_subscribed_services() {
        let mut sched = Scheduler::new(4);
        let mut conn = NullConn;
        let a = sched.add_device(ap(1));
        let b = sched.add_device(ap(2));
        let topic = device_topic(mac(1), "instant", "complete");
        sched.attach(b, Box::new(WaitForTopic { topic }));
        sched.attach(a, Box::new(Instant));
        sched.start_pending(&mut conn);
        assert_eq!(sched.report().succeeded, 2);
    }

    /// Fails immediately; waiters on its completion topic see "failed".
    struct InstantFail;

    impl DeviceService for InstantFail {
        fn name(&self) -> &'static str {
            "instant-fail"
        }

        fn start(&mut self, _ctx: &mut ServiceCtx<'_>) -> Step {
            Step::Done(Outcome::Failed)
        }

        fn resume(&mut self, _ctx: &mut ServiceCtx<'_>, _wake: Wake) -> Step {
            Step::Done(Outcome::Failed)
        }
    }

    #[test]
    fn failed_completions_still_wake_waiters_with_the_outcome() {
        let mut sched = Scheduler::new(4);
        let mut conn = NullConn;
        let a = sched.add_device(ap(1));
        let b = sched.add_device(ap(2));
        let topic = device_topic(mac(1), "instant-fail", "complete");
        sched.attach(b, Box::new(WaitForTopic { topic }));
        sched.attach(a, Box::new(InstantFail));
        sched.start_pending(&mut conn);
        // Nobody is left waiting; the waiter failed instead of hanging.
        assert!(sched.all_done());
        assert_eq!(
            sched.report(),
            RunReport {
                succeeded: 0,
                failed: 2,
                pending: 0
            }
        );
    }

    #[test]
    fn stop_all_fails_everything_and_cancels_timers() {
        let mut sched = Scheduler::new(2);
        let mut conn = NullConn;
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5u8 {
            let dev = sched.add_device(ap(i + 1));
            sched.attach(dev, sleeper(Duration::from_secs(60), &order, i as usize));
        }
        sched.start_pending(&mut conn);
        assert_eq!(sched.in_flight(), 2);
        sched.stop_all(&mut conn);
        assert_eq!(
            sched.report(),
            RunReport {
                succeeded: 0,
                failed: 5,
                pending: 0
            }
        );
        assert_eq!(sched.in_flight(), 0);
        // Cancelled timers never fire.
        sched.advance_to(&mut conn, SimTime::from_secs_f64(1000.0));
        assert!(order.lock().unwrap().is_empty());
    }
}
