//! The traffic handler process: three loops around one wire socket.
//!
//! * up/down multiplexes uplink frames from every worker onto the wire,
//! * down/up routes wire frames to workers by destination MAC,
//! * management serves the control channel and owns the routing table.
//!
//! All three run on dedicated OS threads and share only a stop flag and
//! the routing snapshots; stopping is cooperative and joins in order so
//! the `Stop` acknowledgement means fully stopped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Select, Sender};
use tracing::{debug, info, warn};
use wlansim_core::MacAddr;

use crate::error::TrafficError;
use crate::routing::{RoutingTable, RoutingView};
use crate::rpc::{
    capture_cfg, ControlChannel, ExceptionKind, HandlerCall, HandlerResponse, PortLayerCfg,
    ResponseValue,
};
use crate::wire::WireSocket;
use crate::worker::WorkerChannel;

const POLL_INTERVAL: Duration = Duration::from_millis(1);
const MGMT_TIMEOUT: Duration = Duration::from_millis(10);

/// Spawns and owns a handler's threads.
pub struct TrafficHandler;

/// Manager-side handle: the control channel plus the management thread's
/// join handle.
pub struct HandlerHandle {
    control: ControlChannel,
    mgmt: Option<JoinHandle<()>>,
}

impl TrafficHandler {
    /// Starts the three loops for one capture port. `workers` are the
    /// handler-side ends of the worker channels; their index is the
    /// connection id used by the routing table.
    pub fn spawn<W: WireSocket>(
        port_id: u8,
        wire: W,
        workers: Vec<WorkerChannel>,
    ) -> HandlerHandle {
        let num_connections = workers.len();
        let cfg = capture_cfg(port_id, num_connections);
        let wire = Arc::new(wire);
        let stop = Arc::new(AtomicBool::new(false));
        let (table, view) = RoutingTable::new(num_connections);

        let uplinks: Vec<Receiver<Bytes>> =
            workers.iter().map(|w| w.receiver().clone()).collect();
        let downlinks: Vec<Sender<Bytes>> = workers.iter().map(|w| w.sender().clone()).collect();

        let up_down = {
            let wire = Arc::clone(&wire);
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name(format!("traffic-up-{port_id}"))
                .spawn(move || up_down_loop(&uplinks, wire.as_ref(), &stop))
        };
        let down_up = {
            let wire = Arc::clone(&wire);
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name(format!("traffic-down-{port_id}"))
                .spawn(move || down_up_loop(wire.as_ref(), &downlinks, &view, &stop))
        };

        let (call_tx, call_rx) = channel::unbounded();
        let (resp_tx, resp_rx) = channel::unbounded();
        let mgmt = thread::Builder::new()
            .name(format!("traffic-mgmt-{port_id}"))
            .spawn(move || {
                let loops: Vec<JoinHandle<()>> =
                    [up_down, down_up].into_iter().flatten().collect();
                management_loop(call_rx, resp_tx, table, cfg, &stop, loops);
            })
            .ok();

        HandlerHandle {
            control: ControlChannel::new(call_tx, resp_rx),
            mgmt,
        }
    }
}

impl HandlerHandle {
    pub fn control(&self) -> &ControlChannel {
        &self.control
    }

    /// Stops the handler and joins its threads.
    pub fn stop(mut self) -> Result<(), TrafficError> {
        let acked = match self.control.stop() {
            // The loops shut down on their own when a worker channel or
            // the wire closes; a dead management channel means stopped.
            Err(TrafficError::ChannelClosed(_)) => Ok(()),
            other => other,
        };
        if let Some(mgmt) = self.mgmt.take() {
            let _ = mgmt.join();
        }
        acked
    }
}

/// Multiplexes uplink frames from every worker onto the wire.
fn up_down_loop(uplinks: &[Receiver<Bytes>], wire: &dyn WireSocket, stop: &AtomicBool) {
    let mut select = Select::new();
    for rx in uplinks {
        select.recv(rx);
    }
    while !stop.load(Ordering::Acquire) {
        let op = match select.select_timeout(POLL_INTERVAL) {
            Ok(op) => op,
            Err(_) => continue,
        };
        let index = op.index();
        match op.recv(&uplinks[index]) {
            Ok(frame) => {
                if let Err(err) = wire.send(frame) {
                    warn!(%err, "wire send failed, stopping");
                    stop.store(true, Ordering::Release);
                }
            }
            Err(_) => {
                debug!(connection = index, "worker uplink closed, stopping");
                stop.store(true, Ordering::Release);
            }
        }
    }
}

/// Routes wire frames to workers by destination MAC.
fn down_up_loop(
    wire: &dyn WireSocket,
    downlinks: &[Sender<Bytes>],
    view: &RoutingView,
    stop: &AtomicBool,
) {
    while !stop.load(Ordering::Acquire) {
        let frame = match wire.recv() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                thread::sleep(POLL_INTERVAL);
                continue;
            }
            Err(err) => {
                debug!(%err, "wire closed, stopping");
                stop.store(true, Ordering::Release);
                break;
            }
        };
        let Some(dst) = MacAddr::from_frame(&frame) else {
            debug!(len = frame.len(), "dropping short frame");
            continue;
        };
        if dst.is_broadcast() {
            for tx in downlinks {
                if tx.send(frame.clone()).is_err() {
                    stop.store(true, Ordering::Release);
                    return;
                }
            }
        } else if let Some(id) = view.lookup(dst) {
            if downlinks[id].send(frame).is_err() {
                stop.store(true, Ordering::Release);
                return;
            }
        } else {
            debug!(%dst, "dropping frame for unrouted destination");
        }
    }
}

/// Serves the control channel; owns the routing table and the loop joins.
fn management_loop(
    calls: Receiver<HandlerCall>,
    responses: Sender<HandlerResponse>,
    mut table: RoutingTable,
    cfg: PortLayerCfg,
    stop: &AtomicBool,
    loops: Vec<JoinHandle<()>>,
) {
    let mut loops = Some(loops);
    loop {
        let call = match calls.recv_timeout(MGMT_TIMEOUT) {
            Ok(call) => call,
            Err(RecvTimeoutError::Timeout) => {
                if stop.load(Ordering::Acquire) {
                    // Traffic loops died on their own; nothing left to serve.
                    join_loops(&mut loops);
                    return;
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => {
                stop.store(true, Ordering::Release);
                join_loops(&mut loops);
                return;
            }
        };
        let response = match call {
            HandlerCall::RouteMacs(mapping) => match table.route_macs(&mapping) {
                Ok(()) => HandlerResponse::Success(ResponseValue::None),
                Err(TrafficError::InvalidConnectionId {
                    id,
                    num_connections,
                }) => HandlerResponse::Exception(ExceptionKind::InvalidConnectionId {
                    id,
                    num_connections,
                }),
                Err(err) => HandlerResponse::Exception(ExceptionKind::Internal(err.to_string())),
            },
            HandlerCall::GetPortLayerCfg => {
                HandlerResponse::Success(ResponseValue::PortLayerCfg(cfg.clone()))
            }
            HandlerCall::Stop => {
                info!(port = cfg.port_id, "stopping traffic handler");
                stop.store(true, Ordering::Release);
                join_loops(&mut loops);
                let _ = responses.send(HandlerResponse::Success(ResponseValue::None));
                return;
            }
        };
        if responses.send(response).is_err() {
            stop.store(true, Ordering::Release);
            join_loops(&mut loops);
            return;
        }
    }
}

fn join_loops(loops: &mut Option<Vec<JoinHandle<()>>>) {
    if let Some(handles) = loops.take() {
        for handle in handles {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::wire::memory_wire_pair;
    use crate::worker::worker_channel_pair;

    fn mac(last: u8) -> MacAddr {
        MacAddr::new([0x02, 0, 0, 0, 0, last])
    }

    fn frame(dst: MacAddr, src: MacAddr, payload: &[u8]) -> Bytes {
        let mut buf = Vec::with_capacity(12 + payload.len());
        buf.extend_from_slice(&dst.octets());
        buf.extend_from_slice(&src.octets());
        buf.extend_from_slice(payload);
        Bytes::from(buf)
    }

    fn recv_within(worker: &WorkerChannel, wait: Duration) -> Option<Bytes> {
        let deadline = std::time::Instant::now() + wait;
        while std::time::Instant::now() < deadline {
            if let Ok(Some(frame)) = worker.recv() {
                return Some(frame);
            }
            thread::sleep(Duration::from_millis(1));
        }
        None
    }

    fn spawn_with_workers(count: usize) -> (HandlerHandle, Vec<WorkerChannel>, crate::MemoryWire) {
        let (near, far) = memory_wire_pair();
        let mut worker_ends = Vec::new();
        let mut handler_ends = Vec::new();
        for _ in 0..count {
            let (w, h) = worker_channel_pair();
            worker_ends.push(w);
            handler_ends.push(h);
        }
        let handle = TrafficHandler::spawn(0, near, handler_ends);
        (handle, worker_ends, far)
    }

    #[test]
    fn uplink_frames_reach_the_wire() {
        let (handle, workers, far) = spawn_with_workers(2);
        let f = frame(mac(9), mac(1), b"up");
        workers[1].send(f.clone()).expect("send");
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        let mut got = None;
        while std::time::Instant::now() < deadline {
            if let Ok(Some(frame)) = far.recv() {
                got = Some(frame);
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(got, Some(f));
        handle.stop().expect("stop acked");
    }

    #[test]
    fn unicast_goes_only_to_the_owner() {
        let (handle, workers, far) = spawn_with_workers(3);
        handle
            .control()
            .route_macs(HashMap::from([(mac(1), 1)]))
            .expect("route");
        far.send(frame(mac(1), mac(9), b"down")).expect("send");
        let got = recv_within(&workers[1], Duration::from_secs(2)).expect("owner delivery");
        assert_eq!(MacAddr::from_frame(&got), Some(mac(1)));
        assert!(recv_within(&workers[0], Duration::from_millis(30)).is_none());
        assert!(recv_within(&workers[2], Duration::from_millis(30)).is_none());
        handle.stop().expect("stop acked");
    }

    #[test]
    fn unrouted_unicast_is_dropped() {
        let (handle, workers, far) = spawn_with_workers(2);
        far.send(frame(mac(7), mac(9), b"down")).expect("send");
        assert!(recv_within(&workers[0], Duration::from_millis(50)).is_none());
        assert!(recv_within(&workers[1], Duration::from_millis(30)).is_none());
        handle.stop().expect("stop acked");
    }

    #[test]
    fn broadcast_reaches_every_worker_once() {
        let (handle, workers, far) = spawn_with_workers(3);
        far.send(frame(MacAddr::BROADCAST, mac(9), b"hello"))
            .expect("send");
        for worker in &workers {
            let got = recv_within(worker, Duration::from_secs(2)).expect("broadcast delivery");
            assert_eq!(MacAddr::from_frame(&got), Some(MacAddr::BROADCAST));
            assert!(recv_within(worker, Duration::from_millis(30)).is_none());
        }
        handle.stop().expect("stop acked");
    }

    #[test]
    fn remap_switches_delivery_between_workers() {
        let (handle, workers, far) = spawn_with_workers(3);
        let target = mac(5);
        for id in [0usize, 2, 1] {
            handle
                .control()
                .route_macs(HashMap::from([(target, id)]))
                .expect("route");
            far.send(frame(target, mac(9), b"ping")).expect("send");
            assert!(recv_within(&workers[id], Duration::from_secs(2)).is_some());
            for (other, worker) in workers.iter().enumerate() {
                if other != id {
                    assert!(recv_within(worker, Duration::from_millis(20)).is_none());
                }
            }
        }
        handle.stop().expect("stop acked");
    }

    #[test]
    fn invalid_connection_id_is_a_remote_exception() {
        let (handle, _workers, _far) = spawn_with_workers(2);
        let err = handle
            .control()
            .route_macs(HashMap::from([(mac(1), 5)]))
            .expect_err("out of range");
        assert!(matches!(
            err,
            TrafficError::InvalidConnectionId {
                id: 5,
                num_connections: 2
            }
        ));
        handle.stop().expect("stop acked");
    }

    #[test]
    fn port_layer_cfg_reports_the_capture_endpoint() {
        let (handle, _workers, _far) = spawn_with_workers(4);
        let cfg = handle.control().get_port_layer_cfg().expect("cfg");
        assert_eq!(cfg.port_id, 0);
        assert_eq!(cfg.num_connections, 4);
        assert_eq!(cfg.endpoint, "ipc:///tmp/trex_capture_port_0");
        handle.stop().expect("stop acked");
    }
}
