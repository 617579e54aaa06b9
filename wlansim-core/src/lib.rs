//! # wlansim-core
//!
//! Foundation layer for the wireless-device simulator: MAC addressing,
//! logical time, the timer environment that drives suspendable device
//! services, the pub/sub bus used to wake services on cross-device events,
//! and the identity allocation pools.
//!
//! Everything here is deterministic by construction: the clock only advances
//! when the environment dispatches a timer, and ties are broken by insertion
//! order.

pub mod env;
pub mod error;
pub mod mac;
pub mod pool;
pub mod pubsub;
pub mod time;

pub mod prelude {
    pub use crate::env::{Environment, TimerId};
    pub use crate::error::CoreError;
    pub use crate::mac::MacAddr;
    pub use crate::pool::{round_robin_list, Ipv4Pool, MacPool, UdpPortPool};
    pub use crate::pubsub::{PubSub, ServiceEvent, SubId};
    pub use crate::time::{LogicalClock, SimTime};
}

pub use error::CoreError;
pub use mac::MacAddr;
pub use time::SimTime;
