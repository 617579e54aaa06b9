//! MAC → connection-id routing table.
//!
//! Lookups happen on the downlink hot path from a different thread than
//! updates, so the table is published as immutable snapshots: the single
//! writer (the management loop) builds a new map and swaps it in through a
//! `watch` channel. Readers borrow the current `Arc` without taking any
//! lock shared with the writer.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;
use wlansim_core::MacAddr;

use crate::error::TrafficError;

pub type RouteMap = HashMap<MacAddr, usize>;

/// Writer half, owned by the management loop.
pub struct RoutingTable {
    num_connections: usize,
    tx: watch::Sender<Arc<RouteMap>>,
}

/// Read-only view, cheap to clone into reader threads.
#[derive(Clone)]
pub struct RoutingView {
    rx: watch::Receiver<Arc<RouteMap>>,
}

impl RoutingTable {
    pub fn new(num_connections: usize) -> (Self, RoutingView) {
        let (tx, rx) = watch::channel(Arc::new(RouteMap::new()));
        (
            Self {
                num_connections,
                tx,
            },
            RoutingView { rx },
        )
    }

    /// Merges `mapping` into the table. Every connection id is validated
    /// before any entry is applied; on error the table is unchanged.
    pub fn route_macs(&mut self, mapping: &RouteMap) -> Result<(), TrafficError> {
        for (&mac, &id) in mapping {
            if id >= self.num_connections {
                debug!(%mac, id, "rejecting route to unknown connection");
                return Err(TrafficError::InvalidConnectionId {
                    id,
                    num_connections: self.num_connections,
                });
            }
        }
        let mut next: RouteMap = (**self.tx.borrow()).clone();
        for (&mac, &id) in mapping {
            next.insert(mac, id);
        }
        debug!(entries = next.len(), "published routing snapshot");
        // send_replace never fails and updates even with no active readers.
        self.tx.send_replace(Arc::new(next));
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn snapshot(&self) -> Arc<RouteMap> {
        self.tx.borrow().clone()
    }
}

impl RoutingView {
    /// Connection id owning `mac`, if any route is registered.
    pub fn lookup(&self, mac: MacAddr) -> Option<usize> {
        self.rx.borrow().get(&mac).copied()
    }

    pub fn snapshot(&self) -> Arc<RouteMap> {
        self.rx.borrow().clone()
    }
}
