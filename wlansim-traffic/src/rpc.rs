//! Management-channel remote-call protocol.
//!
//! Calls are a closed command enum rather than name-based dispatch, so an
//! unknown command is unrepresentable. Correlation is strictly by order:
//! the channel is single-producer/single-consumer in each direction and a
//! caller must await the response before sending the next call, so the
//! handler's FIFO of responses lines up with the FIFO of requests. No call
//! ids, no pipelining.

use std::collections::HashMap;

use crossbeam::channel::{Receiver, Sender};
use wlansim_core::MacAddr;

use crate::error::TrafficError;

/// A command sent manager → handler.
#[derive(Debug, Clone)]
pub enum HandlerCall {
    /// Merge `mapping` into the routing table after validating that every
    /// referenced connection id exists.
    RouteMacs(HashMap<MacAddr, usize>),
    /// Read-only introspection of the handler's port configuration.
    GetPortLayerCfg,
    /// Stop all three loops; acknowledged once fully stopped.
    Stop,
}

/// Exactly one response per call, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerResponse {
    Success(ResponseValue),
    Exception(ExceptionKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseValue {
    None,
    PortLayerCfg(PortLayerCfg),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExceptionKind {
    InvalidConnectionId { id: usize, num_connections: usize },
    Internal(String),
}

/// Static description of the port a handler serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortLayerCfg {
    pub port_id: u8,
    pub num_connections: usize,
    pub endpoint: String,
}

pub(crate) fn capture_cfg(port_id: u8, num_connections: usize) -> PortLayerCfg {
    PortLayerCfg {
        port_id,
        num_connections,
        endpoint: crate::wire::capture_endpoint(port_id),
    }
}

/// Manager-side end of the management channel.
///
/// `call` enforces the FIFO contract by sending and then blocking for the
/// matching response before returning.
pub struct ControlChannel {
    tx: Sender<HandlerCall>,
    rx: Receiver<HandlerResponse>,
}

impl ControlChannel {
    pub(crate) fn new(tx: Sender<HandlerCall>, rx: Receiver<HandlerResponse>) -> Self {
        Self { tx, rx }
    }

    pub fn call(&self, call: HandlerCall) -> Result<ResponseValue, TrafficError> {
        self.tx
            .send(call)
            .map_err(|_| TrafficError::ChannelClosed("management"))?;
        match self
            .rx
            .recv()
            .map_err(|_| TrafficError::ChannelClosed("management"))?
        {
            HandlerResponse::Success(value) => Ok(value),
            HandlerResponse::Exception(ExceptionKind::InvalidConnectionId {
                id,
                num_connections,
            }) => Err(TrafficError::InvalidConnectionId {
                id,
                num_connections,
            }),
            HandlerResponse::Exception(ExceptionKind::Internal(message)) => {
                Err(TrafficError::Remote(message))
            }
        }
    }

    /// Registers `mapping` (MAC → connection id) in the handler's routing
    /// table.
    pub fn route_macs(&self, mapping: HashMap<MacAddr, usize>) -> Result<(), TrafficError> {
        self.call(HandlerCall::RouteMacs(mapping)).map(|_| ())
    }

    pub fn get_port_layer_cfg(&self) -> Result<PortLayerCfg, TrafficError> {
        match self.call(HandlerCall::GetPortLayerCfg)? {
            ResponseValue::PortLayerCfg(cfg) => Ok(cfg),
            other => Err(TrafficError::Remote(format!(
                "unexpected response to GetPortLayerCfg: {other:?}"
            ))),
        }
    }

    /// Stops the handler; returns once all three loops have exited.
    pub fn stop(&self) -> Result<(), TrafficError> {
        self.call(HandlerCall::Stop).map(|_| ())
    }
}
