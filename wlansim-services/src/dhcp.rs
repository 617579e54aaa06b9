//! DHCP address acquisition: DISCOVER → OFFER → REQUEST → ACK.
//!
//! Runs after association; when attached to a still-associating client it
//! parks on the association service's completion event first and fails if
//! the association never happens. The ACK
//! payload carries the leased address as 4 raw octets. Each outstanding
//! message retransmits on timeout with slot-time 2 s and a 3-retry cycle.

use std::net::Ipv4Addr;

use bytes::Bytes;
use wlansim_core::pubsub::device_topic;
use wlansim_core::MacAddr;

use crate::association;
use crate::backoff::Backoff;
use crate::device::{ClientState, DeviceState};
use crate::frame::{Frame, FrameKind};
use crate::service::{send_or_fail, DeviceService, Outcome, ServiceCtx, Step, Wake};

pub const SLOT_TIME: f64 = 2.0;
pub const MAX_RETRIES: u32 = 3;

pub const SERVICE_NAME: &str = "dhcp";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitAssociation,
    Discover,
    Request,
}

pub struct DhcpService {
    phase: Phase,
    server: Option<MacAddr>,
    backoff: Backoff,
}

impl DhcpService {
    pub fn new() -> DhcpService {
        DhcpService {
            phase: Phase::AwaitAssociation,
            server: None,
            backoff: Backoff::new(SLOT_TIME, MAX_RETRIES),
        }
    }

    pub fn with_seed(seed: u64) -> DhcpService {
        DhcpService::with_backoff(Backoff::with_seed(SLOT_TIME, MAX_RETRIES, seed))
    }

    pub fn with_backoff(backoff: Backoff) -> DhcpService {
        DhcpService {
            phase: Phase::AwaitAssociation,
            server: None,
            backoff,
        }
    }

    fn current_request(&self, src: MacAddr) -> Frame {
        match self.phase {
            Phase::Request => Frame::new(
                self.server.unwrap_or(MacAddr::BROADCAST),
                src,
                FrameKind::DhcpRequest,
            ),
            _ => Frame::new(MacAddr::BROADCAST, src, FrameKind::DhcpDiscover),
        }
    }

    fn send_and_wait(&mut self, ctx: &mut ServiceCtx<'_>) -> Step {
        let request = self.current_request(ctx.device.mac);
        if let Err(step) = send_or_fail(ctx, &request) {
            return step;
        }
        Step::WaitPacket {
            timeout: self.backoff.next_wait(),
        }
    }

    fn begin_discover(&mut self, ctx: &mut ServiceCtx<'_>) -> Step {
        self.phase = Phase::Discover;
        self.send_and_wait(ctx)
    }

    fn complete(&mut self, ctx: &mut ServiceCtx<'_>, ip: Ipv4Addr) -> Step {
        ctx.device.ipv4 = Some(ip);
        let announce = Frame::with_payload(
            MacAddr::BROADCAST,
            ctx.device.mac,
            FrameKind::ArpAnnounce,
            Bytes::copy_from_slice(&ip.octets()),
        );
        if let Err(step) = send_or_fail(ctx, &announce) {
            return step;
        }
        ctx.device.state = DeviceState::Client(ClientState::Run);
        Step::Done(Outcome::Success)
    }
}

impl Default for DhcpService {
    fn default() -> Self {
        DhcpService::new()
    }
}

impl DeviceService for DhcpService {
    fn name(&self) -> &'static str {
        SERVICE_NAME
    }

    fn start(&mut self, ctx: &mut ServiceCtx<'_>) -> Step {
        if ctx.device.ipv4.is_some() {
            // Statically addressed; nothing to acquire.
            return Step::Done(Outcome::Success);
        }
        if ctx.device.state == DeviceState::Client(ClientState::Close) {
            // Association already gave up on this client.
            return Step::Done(Outcome::Failed);
        }
        if ctx.device.state == DeviceState::Client(ClientState::Association) {
            return Step::WaitEvent {
                topic: device_topic(ctx.device.mac, association::SERVICE_NAME, "complete"),
                timeout: None,
            };
        }
        self.begin_discover(ctx)
    }

    fn resume(&mut self, ctx: &mut ServiceCtx<'_>, wake: Wake) -> Step {
        match wake {
            Wake::Event { value, .. } if self.phase == Phase::AwaitAssociation => {
                if value == "done" {
                    self.begin_discover(ctx)
                } else {
                    // No address without an association.
                    Step::Done(Outcome::Failed)
                }
            }
            Wake::Packet(frame) => match (self.phase, frame.kind) {
                (Phase::Discover, FrameKind::DhcpOffer) => {
                    self.server = Some(frame.src);
                    self.phase = Phase::Request;
                    self.backoff.reset();
                    self.send_and_wait(ctx)
                }
                (Phase::Request, FrameKind::DhcpAck) => match parse_lease(&frame.payload) {
                    Some(ip) => self.complete(ctx, ip),
                    None => {
                        tracing::warn!(device = %ctx.device.mac, "malformed lease in ack");
                        Step::KeepWaiting
                    }
                },
                _ => Step::KeepWaiting,
            },
            Wake::Timer => self.send_and_wait(ctx),
            _ => Step::KeepWaiting,
        }
    }

    fn stop(&mut self, ctx: &mut ServiceCtx<'_>) {
        ctx.device.state = DeviceState::Client(ClientState::Close);
    }
}

fn parse_lease(payload: &Bytes) -> Option<Ipv4Addr> {
    let octets: [u8; 4] = payload.get(..4)?.try_into().ok()?;
    Some(Ipv4Addr::from(octets))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wlansim_core::SimTime;

    use super::*;
    use crate::association::AssociationService;
    use crate::device::Device;
    use crate::error::ServicesError;
    use crate::scheduler::Scheduler;
    use crate::service::Connection;

    #[derive(Default)]
    struct RecordingConn {
        sent: Vec<Frame>,
    }

    impl Connection for RecordingConn {
        fn send(&mut self, frame: &Frame) -> Result<(), ServicesError> {
            self.sent.push(frame.clone());
            Ok(())
        }
    }

    fn client_mac() -> MacAddr {
        MacAddr::new([0x06, 0, 0, 0, 0, 1])
    }

    fn ap_mac() -> MacAddr {
        MacAddr::new([0x02, 0, 0, 0, 0, 1])
    }

    fn server_mac() -> MacAddr {
        MacAddr::new([0x0c, 0, 0, 0, 0, 1])
    }

    fn ack(ip: [u8; 4]) -> Frame {
        Frame::with_payload(
            client_mac(),
            server_mac(),
            FrameKind::DhcpAck,
            Bytes::copy_from_slice(&ip),
        )
    }

    #[test]
    fn full_exchange_after_association() {
        let mut sched = Scheduler::new(4);
        let mut conn = RecordingConn::default();
        let dev = sched.add_device(Device::client(client_mac(), None, ap_mac(), 0));
        sched.attach(dev, Box::new(AssociationService::with_seed(1)));
        sched.attach(dev, Box::new(DhcpService::with_seed(2)));
        sched.start_pending(&mut conn);

        // Only the association request so far; DHCP is parked on its event.
        assert_eq!(conn.sent.len(), 1);
        sched.deliver(
            &mut conn,
            Frame::new(client_mac(), ap_mac(), FrameKind::AssocResponse),
        );
        // Association done wakes DHCP, which broadcasts DISCOVER.
        assert_eq!(conn.sent.len(), 2);
        assert_eq!(conn.sent[1].kind, FrameKind::DhcpDiscover);
        assert!(conn.sent[1].dst.is_broadcast());

        sched.deliver(
            &mut conn,
            Frame::new(client_mac(), server_mac(), FrameKind::DhcpOffer),
        );
        assert_eq!(conn.sent[2].kind, FrameKind::DhcpRequest);
        assert_eq!(conn.sent[2].dst, server_mac());

        sched.deliver(&mut conn, ack([10, 0, 2, 7]));
        assert_eq!(conn.sent[3].kind, FrameKind::ArpAnnounce);
        assert_eq!(sched.report().succeeded, 2);
        let device = sched.devices().get(dev).unwrap();
        assert_eq!(device.ipv4, Some(Ipv4Addr::new(10, 0, 2, 7)));
        assert_eq!(device.state, DeviceState::Client(ClientState::Run));
    }

    #[test]
    fn lost_offer_retransmits_discover() {
        let mut sched = Scheduler::new(4);
        let mut conn = RecordingConn::default();
        let mut dev_template = Device::client(client_mac(), None, ap_mac(), 0);
        dev_template.state = DeviceState::Client(ClientState::IpLearn);
        let dev = sched.add_device(dev_template);
        sched.attach(dev, Box::new(DhcpService::with_seed(2)));
        sched.start_pending(&mut conn);

        assert_eq!(conn.sent.len(), 1);
        sched.advance_to(&mut conn, SimTime::ZERO + Duration::from_secs(30));
        assert!(conn.sent.len() > 2);
        assert!(conn.sent.iter().all(|f| f.kind == FrameKind::DhcpDiscover));
    }

    /// Accepts a fixed number of sends, then reports the connection dead.
    struct FailAfter {
        remaining: usize,
    }

    impl Connection for FailAfter {
        fn send(&mut self, _frame: &Frame) -> Result<(), ServicesError> {
            if self.remaining == 0 {
                return Err(ServicesError::ConnectionClosed);
            }
            self.remaining -= 1;
            Ok(())
        }
    }

    #[test]
    fn failed_association_also_fails_parked_dhcp() {
        let mut sched = Scheduler::new(4);
        let mut conn = FailAfter { remaining: 1 };
        let dev = sched.add_device(Device::client(client_mac(), None, ap_mac(), 0));
        sched.attach(dev, Box::new(AssociationService::with_seed(1)));
        sched.attach(dev, Box::new(DhcpService::with_seed(2)));
        sched.start_pending(&mut conn);

        // Association got its request out and DHCP is parked on its
        // completion; the retransmit then hits the dead connection.
        assert_eq!(sched.report().pending, 2);
        sched.advance_to(&mut conn, SimTime::ZERO + Duration::from_secs(100));
        assert!(sched.all_done());
        assert_eq!(sched.report().failed, 2);
    }

    #[test]
    fn association_dead_before_dhcp_starts_fails_both() {
        let mut sched = Scheduler::new(4);
        let mut conn = FailAfter { remaining: 0 };
        let dev = sched.add_device(Device::client(client_mac(), None, ap_mac(), 0));
        sched.attach(dev, Box::new(AssociationService::with_seed(1)));
        sched.attach(dev, Box::new(DhcpService::with_seed(2)));
        sched.start_pending(&mut conn);
        assert!(sched.all_done());
        assert_eq!(sched.report().failed, 2);
    }

    #[test]
    fn static_ip_is_a_no_op() {
        let mut sched = Scheduler::new(4);
        let mut conn = RecordingConn::default();
        let dev = sched.add_device(Device::client(
            client_mac(),
            Some(Ipv4Addr::new(10, 9, 9, 9)),
            ap_mac(),
            0,
        ));
        sched.attach(dev, Box::new(DhcpService::with_seed(2)));
        sched.start_pending(&mut conn);
        assert!(conn.sent.is_empty());
        assert_eq!(sched.report().succeeded, 1);
    }

    #[test]
    fn malformed_ack_is_ignored() {
        let mut sched = Scheduler::new(4);
        let mut conn = RecordingConn::default();
        let mut dev_template = Device::client(client_mac(), None, ap_mac(), 0);
        dev_template.state = DeviceState::Client(ClientState::IpLearn);
        let dev = sched.add_device(dev_template);
        sched.attach(dev, Box::new(DhcpService::with_seed(2)));
        sched.start_pending(&mut conn);
        sched.deliver(
            &mut conn,
            Frame::new(client_mac(), server_mac(), FrameKind::DhcpOffer),
        );
        sched.deliver(
            &mut conn,
            Frame::with_payload(
                client_mac(),
                server_mac(),
                FrameKind::DhcpAck,
                Bytes::from_static(&[1, 2]),
            ),
        );
        assert_eq!(sched.report().pending, 1);
        sched.deliver(&mut conn, ack([10, 0, 2, 8]));
        assert_eq!(sched.report().succeeded, 1);
    }
}
