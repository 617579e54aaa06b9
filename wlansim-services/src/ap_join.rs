//! AP controller-join service: discover the controller, then join it.
//!
//! Discovery goes to broadcast; the responding controller's address is
//! learned from the response and the join request goes there directly.
//! Each outstanding request is retransmitted on timeout with [`Backoff`].

use wlansim_core::MacAddr;

use crate::backoff::Backoff;
use crate::device::{ApState, DeviceState};
use crate::frame::{Frame, FrameKind};
use crate::service::{send_or_fail, DeviceService, Outcome, ServiceCtx, Step, Wake};

pub const SLOT_TIME: f64 = 2.0;
pub const MAX_RETRIES: u32 = 3;

pub const SERVICE_NAME: &str = "ap-join";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Discover,
    Join,
}

pub struct ApJoinService {
    phase: Phase,
    controller: Option<MacAddr>,
    backoff: Backoff,
}

impl ApJoinService {
    pub fn new() -> ApJoinService {
        ApJoinService {
            phase: Phase::Discover,
            controller: None,
            backoff: Backoff::new(SLOT_TIME, MAX_RETRIES),
        }
    }

    pub fn with_seed(seed: u64) -> ApJoinService {
        ApJoinService::with_backoff(Backoff::with_seed(SLOT_TIME, MAX_RETRIES, seed))
    }

    pub fn with_backoff(backoff: Backoff) -> ApJoinService {
        ApJoinService {
            phase: Phase::Discover,
            controller: None,
            backoff,
        }
    }

    fn current_request(&self, src: MacAddr) -> Frame {
        match self.phase {
            Phase::Discover => Frame::new(MacAddr::BROADCAST, src, FrameKind::Discovery),
            // controller is always known once we are in Join.
            Phase::Join => Frame::new(
                self.controller.unwrap_or(MacAddr::BROADCAST),
                src,
                FrameKind::JoinRequest,
            ),
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
}

impl Default for ApJoinService {
    fn default() -> Self {
        ApJoinService::new()
    }
}

impl DeviceService for ApJoinService {
    fn name(&self) -> &'static str {
        SERVICE_NAME
    }

    fn start(&mut self, ctx: &mut ServiceCtx<'_>) -> Step {
        ctx.device.state = DeviceState::Ap(ApState::Discover);
        self.send_and_wait(ctx)
    }

    fn resume(&mut self, ctx: &mut ServiceCtx<'_>, wake: Wake) -> Step {
        match wake {
            Wake::Packet(frame) => match (self.phase, frame.kind) {
                (Phase::Discover, FrameKind::DiscoveryResponse) => {
                    self.controller = Some(frame.src);
                    self.phase = Phase::Join;
                    self.backoff.reset();
                    ctx.device.state = DeviceState::Ap(ApState::Join);
                    self.send_and_wait(ctx)
                }
                (Phase::Join, FrameKind::JoinResponse) => {
                    ctx.device.state = DeviceState::Ap(ApState::Run);
                    Step::Done(Outcome::Success)
                }
                _ => Step::KeepWaiting,
            },
            Wake::Timer => self.send_and_wait(ctx),
            Wake::Event { .. } => Step::KeepWaiting,
        }
    }

    fn stop(&mut self, ctx: &mut ServiceCtx<'_>) {
        ctx.device.state = DeviceState::Ap(ApState::Closed);
    }
}
