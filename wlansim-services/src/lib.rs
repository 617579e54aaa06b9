//! # wlansim-services
//!
//! Protocol state machines for simulated devices and the cooperative
//! scheduler that drives them.
//!
//! A [`DeviceService`] is one resumable unit of protocol logic bound to one
//! device. It never blocks: `start` and `resume` run to the next suspension
//! point and return a [`Step`] telling the [`Scheduler`] what to wait for
//! (a timer, an inbound frame, a published event). The scheduler runs many
//! services in a single thread on logical time, so interleaving is
//! deterministic and per-device state needs no locks.

pub mod ap_join;
pub mod association;
pub mod backoff;
pub mod device;
pub mod dhcp;
pub mod error;
pub mod frame;
pub mod scheduler;
pub mod service;

pub use ap_join::ApJoinService;
pub use association::AssociationService;
pub use backoff::Backoff;
pub use device::{ApState, ClientState, Device, DeviceArena, DeviceId, DeviceState};
pub use dhcp::DhcpService;
pub use error::ServicesError;
pub use frame::{Frame, FrameKind};
pub use scheduler::{RunReport, Scheduler, SlotId};
pub use service::{Connection, DeviceService, Outcome, ServiceCtx, ServiceState, Step, Wake};
