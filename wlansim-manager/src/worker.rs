//! Worker threads: one cooperative scheduler per worker.
//!
//! Each worker owns the devices assigned to it and runs their services on
//! a single thread. The logical clock is paced against wall time, so
//! retransmission timeouts happen in real time while frame delivery stays
//! immediate. The manager talks to a worker over a strict-FIFO
//! call/response channel, same contract as the traffic management channel.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use tracing::{debug, info};
use wlansim_config::{BackoffConfig, ServicesConfig};
use wlansim_core::SimTime;
use wlansim_services::{
    ApJoinService, AssociationService, Backoff, Connection, Device, DeviceId, DeviceService,
    DhcpService, Frame, RunReport, Scheduler, ServicesError,
};
use wlansim_telemetry::MetricsRecorder;
use wlansim_traffic::WorkerChannel;

use crate::error::ManagerError;

#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    pub association: BackoffConfig,
    pub dhcp: BackoffConfig,
    pub poll_interval: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        WorkerSettings::from_config(&ServicesConfig::default(), 1)
    }
}

impl WorkerSettings {
    pub fn from_config(services: &ServicesConfig, poll_interval_ms: u64) -> WorkerSettings {
        WorkerSettings {
            association: services.association,
            dhcp: services.dhcp,
            poll_interval: Duration::from_millis(poll_interval_ms.max(1)),
        }
    }
}

#[derive(Debug)]
pub enum WorkerCall {
    AddDevice(Device),
    /// Attach join services to every AP not yet joining and admit up to
    /// `max_concurrent` at a time.
    JoinAps { max_concurrent: usize },
    JoinClients { max_concurrent: usize },
    /// Responds once every started service has reached a terminal state,
    /// with the outcome counts of the current batch.
    AwaitIdle,
    Stop,
}

#[derive(Debug)]
pub enum WorkerResponse {
    Ok,
    DeviceAdded(DeviceId),
    Report(RunReport),
}

/// Manager-side handle; calls follow the one-outstanding-call FIFO rule.
pub struct WorkerHandle {
    index: usize,
    tx: Sender<WorkerCall>,
    rx: Receiver<WorkerResponse>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn spawn(
        index: usize,
        channel: WorkerChannel,
        settings: WorkerSettings,
        metrics: MetricsRecorder,
    ) -> WorkerHandle {
        let (call_tx, call_rx) = channel::unbounded();
        let (resp_tx, resp_rx) = channel::unbounded();
        let thread = thread::Builder::new()
            .name(format!("worker-{index}"))
            .spawn(move || worker_loop(index, channel, call_rx, resp_tx, settings, metrics))
            .ok();
        WorkerHandle {
            index,
            tx: call_tx,
            rx: resp_rx,
            thread,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn call(&self, call: WorkerCall) -> Result<WorkerResponse, ManagerError> {
        self.tx
            .send(call)
            .map_err(|_| ManagerError::WorkerClosed)?;
        self.rx.recv().map_err(|_| ManagerError::WorkerClosed)
    }

    pub fn add_device(&self, device: Device) -> Result<DeviceId, ManagerError> {
        match self.call(WorkerCall::AddDevice(device))? {
            WorkerResponse::DeviceAdded(id) => Ok(id),
            _ => Err(ManagerError::UnexpectedResponse),
        }
    }

    pub fn join_aps(&self, max_concurrent: usize) -> Result<(), ManagerError> {
        match self.call(WorkerCall::JoinAps { max_concurrent })? {
            WorkerResponse::Ok => Ok(()),
            _ => Err(ManagerError::UnexpectedResponse),
        }
    }

    pub fn join_clients(&self, max_concurrent: usize) -> Result<(), ManagerError> {
        match self.call(WorkerCall::JoinClients { max_concurrent })? {
            WorkerResponse::Ok => Ok(()),
            _ => Err(ManagerError::UnexpectedResponse),
        }
    }

    pub fn await_idle(&self) -> Result<RunReport, ManagerError> {
        match self.call(WorkerCall::AwaitIdle)? {
            WorkerResponse::Report(report) => Ok(report),
            _ => Err(ManagerError::UnexpectedResponse),
        }
    }

    /// Stops the scheduler and joins the thread. Safe to call once.
    pub fn stop(mut self) -> Result<(), ManagerError> {
        let acked = self.call(WorkerCall::Stop).map(|_| ());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        acked
    }
}

/// Outbound frames go through the worker's channel to the handler.
struct ChannelConnection<'a> {
    channel: &'a WorkerChannel,
    metrics: &'a MetricsRecorder,
}

impl Connection for ChannelConnection<'_> {
    fn send(&mut self, frame: &Frame) -> Result<(), ServicesError> {
        self.channel
            .send(frame.encode())
            .map_err(|_| ServicesError::ConnectionClosed)?;
        self.metrics.inc_frames_up();
        Ok(())
    }
}

fn attach_join_services(
    sched: &mut Scheduler,
    settings: &WorkerSettings,
    devices: &[DeviceId],
    aps: bool,
) {
    for &id in devices {
        let Some(device) = sched.devices().get(id) else {
            continue;
        };
        let services: Vec<Box<dyn DeviceService + Send>> = if aps {
            vec![Box::new(ApJoinService::with_backoff(Backoff::new(
                settings.association.slot_time,
                settings.association.max_retries,
            )))]
        } else {
            let mut list: Vec<Box<dyn DeviceService + Send>> =
                vec![Box::new(AssociationService::with_backoff(Backoff::new(
                    settings.association.slot_time,
                    settings.association.max_retries,
                )))];
            if device.ipv4.is_none() {
                list.push(Box::new(DhcpService::with_backoff(Backoff::new(
                    settings.dhcp.slot_time,
                    settings.dhcp.max_retries,
                ))));
            }
            list
        };
        for service in services {
            sched.attach(id, service);
        }
    }
}

fn worker_loop(
    index: usize,
    channel: WorkerChannel,
    calls: Receiver<WorkerCall>,
    responses: Sender<WorkerResponse>,
    settings: WorkerSettings,
    metrics: MetricsRecorder,
) {
    let mut sched = Scheduler::new(1);
    let mut conn = ChannelConnection {
        channel: &channel,
        metrics: &metrics,
    };
    let mut ap_ids: Vec<DeviceId> = Vec::new();
    let mut client_ids: Vec<DeviceId> = Vec::new();
    // Joined devices are not re-attached on a later join call.
    let mut ap_join_mark = 0usize;
    let mut client_join_mark = 0usize;
    let mut awaiting = false;
    let mut batch_base = RunReport::default();
    let start = Instant::now();

    info!(worker = index, "worker started");
    loop {
        match calls.try_recv() {
            Ok(WorkerCall::AddDevice(device)) => {
                let id = sched.add_device(device);
                match sched.devices().get(id).map(|d| d.state.is_ap()) {
                    Some(true) => ap_ids.push(id),
                    Some(false) => client_ids.push(id),
                    None => {}
                }
                if responses.send(WorkerResponse::DeviceAdded(id)).is_err() {
                    break;
                }
            }
            Ok(WorkerCall::JoinAps { max_concurrent }) => {
                batch_base = sched.report();
                sched.set_max_concurrent(max_concurrent);
                attach_join_services(&mut sched, &settings, &ap_ids[ap_join_mark..], true);
                ap_join_mark = ap_ids.len();
                sched.start_pending(&mut conn);
                if responses.send(WorkerResponse::Ok).is_err() {
                    break;
                }
            }
            Ok(WorkerCall::JoinClients { max_concurrent }) => {
                batch_base = sched.report();
                sched.set_max_concurrent(max_concurrent);
                attach_join_services(
                    &mut sched,
                    &settings,
                    &client_ids[client_join_mark..],
                    false,
                );
                client_join_mark = client_ids.len();
                sched.start_pending(&mut conn);
                if responses.send(WorkerResponse::Ok).is_err() {
                    break;
                }
            }
            Ok(WorkerCall::AwaitIdle) => {
                awaiting = true;
            }
            Ok(WorkerCall::Stop) => {
                sched.stop_all(&mut conn);
                let _ = responses.send(WorkerResponse::Ok);
                break;
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                sched.stop_all(&mut conn);
                break;
            }
        }

        // Drain inbound frames; malformed ones are noise.
        loop {
            match channel.recv() {
                Ok(Some(raw)) => match Frame::parse(&raw) {
                    Some(frame) => {
                        metrics.inc_frames_down();
                        sched.deliver(&mut conn, frame);
                    }
                    None => metrics.inc_frames_dropped(),
                },
                Ok(None) => break,
                Err(_) => {
                    debug!(worker = index, "traffic channel closed, stopping");
                    sched.stop_all(&mut conn);
                    return;
                }
            }
        }

        // Pace the logical clock against wall time so service timeouts
        // fire in real time.
        sched.advance_to(&mut conn, SimTime::ZERO + start.elapsed());

        if awaiting && sched.all_done() {
            awaiting = false;
            let current = sched.report();
            let report = RunReport {
                succeeded: current.succeeded - batch_base.succeeded,
                failed: current.failed - batch_base.failed,
                pending: current.pending,
            };
            if responses.send(WorkerResponse::Report(report)).is_err() {
                break;
            }
        }

        thread::sleep(settings.poll_interval);
    }
    info!(worker = index, "worker stopped");
}
