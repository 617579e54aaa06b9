//! The device-service contract.
//!
//! A service is an explicit state machine with a `resume(wake)` entry point
//! rather than a parked coroutine: `attempt`, backoff, and protocol state
//! all live in named fields the scheduler can inspect.

use std::time::Duration;

use crate::device::Device;
use crate::error::ServicesError;
use crate::frame::Frame;

/// Scheduler-visible lifecycle of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    NotStarted,
    Running,
    Waiting,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failed,
}

/// What a service asks the scheduler to wait for next.
#[derive(Debug, Clone)]
pub enum Step {
    /// Resume after `Duration` of logical time.
    Sleep(Duration),
    /// Resume on the next frame addressed to the device, or on timeout.
    WaitPacket { timeout: Duration },
    /// Resume when `topic` is published, or on timeout if given.
    WaitEvent {
        topic: String,
        timeout: Option<Duration>,
    },
    /// The current wait (and its timer) stays armed; used to ignore noise.
    KeepWaiting,
    Done(Outcome),
}

/// Why the service is being resumed.
#[derive(Debug, Clone)]
pub enum Wake {
    Timer,
    Packet(Frame),
    Event { topic: String, value: String },
}

/// Outbound path from a device to its traffic connection.
pub trait Connection {
    fn send(&mut self, frame: &Frame) -> Result<(), ServicesError>;
}

/// Per-resumption context: the owning device's state and its connection.
/// Passed in on every call so services hold no references between
/// suspensions.
pub struct ServiceCtx<'a> {
    pub device: &'a mut Device,
    pub conn: &'a mut dyn Connection,
}

/// `Err(Done(Failed))` on a dead connection, which a service propagates
/// as its next step. A closed connection is unrecoverable for the device.
pub(crate) fn send_or_fail(ctx: &mut ServiceCtx<'_>, frame: &Frame) -> Result<(), Step> {
    ctx.conn.send(frame).map_err(|err| {
        tracing::warn!(%err, device = %ctx.device.mac, "frame send failed");
        Step::Done(Outcome::Failed)
    })
}

pub trait DeviceService {
    fn name(&self) -> &'static str;

    /// First transition; sends the opening protocol message.
    fn start(&mut self, ctx: &mut ServiceCtx<'_>) -> Step;

    fn resume(&mut self, ctx: &mut ServiceCtx<'_>, wake: Wake) -> Step;

    /// External cancellation. Any non-terminal state becomes failed; the
    /// scheduler cancels pending timers afterwards.
    fn stop(&mut self, _ctx: &mut ServiceCtx<'_>) {}
}
