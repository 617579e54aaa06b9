//! Client association service.
//!
//! Associates the client with its AP, then learns/announces its IP. A
//! client created with a static IP announces it with a gratuitous ARP and
//! goes straight to Run; one without leaves IP acquisition to the DHCP
//! service and finishes in IpLearn. A deauth received mid-exchange rolls
//! the client back to Association and the exchange starts over.

use bytes::Bytes;
use wlansim_core::MacAddr;

use crate::backoff::Backoff;
use crate::device::{ClientState, DeviceState};
use crate::frame::{Frame, FrameKind};
use crate::service::{send_or_fail, DeviceService, Outcome, ServiceCtx, Step, Wake};

pub const SLOT_TIME: f64 = 2.0;
pub const MAX_RETRIES: u32 = 3;

pub const SERVICE_NAME: &str = "association";

pub struct AssociationService {
    backoff: Backoff,
}

impl AssociationService {
    pub fn new() -> AssociationService {
        AssociationService {
            backoff: Backoff::new(SLOT_TIME, MAX_RETRIES),
        }
    }

    pub fn with_seed(seed: u64) -> AssociationService {
        AssociationService::with_backoff(Backoff::with_seed(SLOT_TIME, MAX_RETRIES, seed))
    }

    pub fn with_backoff(backoff: Backoff) -> AssociationService {
        AssociationService { backoff }
    }

    fn send_assoc_and_wait(&mut self, ctx: &mut ServiceCtx<'_>) -> Step {
        let dst = match ctx.device.ap_mac {
            Some(ap) => ap,
            None => {
                tracing::warn!(device = %ctx.device.mac, "client has no AP to associate with");
                ctx.device.state = DeviceState::Client(ClientState::Close);
                return Step::Done(Outcome::Failed);
            }
        };
        let request = Frame::new(dst, ctx.device.mac, FrameKind::AssocRequest);
        if let Err(step) = send_or_fail(ctx, &request) {
            ctx.device.state = DeviceState::Client(ClientState::Close);
            return step;
        }
        Step::WaitPacket {
            timeout: self.backoff.next_wait(),
        }
    }
}

impl Default for AssociationService {
    fn default() -> Self {
        AssociationService::new()
    }
}

impl DeviceService for AssociationService {
    fn name(&self) -> &'static str {
        SERVICE_NAME
    }

    fn start(&mut self, ctx: &mut ServiceCtx<'_>) -> Step {
        ctx.device.state = DeviceState::Client(ClientState::Association);
        self.send_assoc_and_wait(ctx)
    }

    fn resume(&mut self, ctx: &mut ServiceCtx<'_>, wake: Wake) -> Step {
        match wake {
            Wake::Packet(frame) => match frame.kind {
                FrameKind::AssocResponse => {
                    ctx.device.state = DeviceState::Client(ClientState::IpLearn);
                    match ctx.device.ipv4 {
                        Some(ip) => {
                            let announce = Frame::with_payload(
                                MacAddr::BROADCAST,
                                ctx.device.mac,
                                FrameKind::ArpAnnounce,
                                Bytes::copy_from_slice(&ip.octets()),
                            );
                            if let Err(step) = send_or_fail(ctx, &announce) {
                                ctx.device.state = DeviceState::Client(ClientState::Close);
                                return step;
                            }
                            ctx.device.state = DeviceState::Client(ClientState::Run);
                            Step::Done(Outcome::Success)
                        }
                        None => Step::Done(Outcome::Success),
                    }
                }
                FrameKind::Deauth => {
                    ctx.device.state = DeviceState::Client(ClientState::Association);
                    self.backoff.reset();
                    self.send_assoc_and_wait(ctx)
                }
                _ => Step::KeepWaiting,
            },
            Wake::Timer => self.send_assoc_and_wait(ctx),
            Wake::Event { .. } => Step::KeepWaiting,
        }
    }

    fn stop(&mut self, ctx: &mut ServiceCtx<'_>) {
        ctx.device.state = DeviceState::Client(ClientState::Close);
    }
}
