//! # wlansim-traffic
//!
//! Frame transport between simulated devices and the wire.
//!
//! One [`TrafficHandler`] per port owns the MAC routing table and moves raw
//! link-layer frames between a fixed set of worker connections and a single
//! wire socket. Three OS threads per handler:
//!
//! - `up_down`: drains all worker connections and forwards frames unmodified
//!   to the wire,
//! - `down_up`: switches frames from the wire to the owning worker by
//!   destination MAC (broadcast goes to everyone, unknown MACs are dropped),
//! - `management`: executes remote calls against the routing table, one
//!   response per call in request order.
//!
//! Thread count is bounded by the handler, not by the number of simulated
//! devices: both traffic loops multiplex over all their channels with a
//! single poll per iteration.

pub mod error;
pub mod handler;
pub mod routing;
pub mod rpc;
pub mod wire;
pub mod worker;

pub use error::TrafficError;
pub use handler::{HandlerHandle, TrafficHandler};
pub use routing::{RouteMap, RoutingTable, RoutingView};
pub use rpc::{
    ControlChannel, ExceptionKind, HandlerCall, HandlerResponse, PortLayerCfg, ResponseValue,
};
pub use wire::{capture_endpoint, memory_wire_pair, MemoryWire, WireSocket};
pub use worker::{worker_channel_pair, WorkerChannel};
