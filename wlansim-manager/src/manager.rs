//! Population orchestration.
//!
//! The manager owns the allocation pools, the traffic handler for its
//! port, and the worker threads. Creating devices allocates identities
//! from the pools, registers their MACs with the traffic layer, and hands
//! them to workers round-robin; joining drives the workers' schedulers
//! with a shared concurrency budget.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::Instant;

use tracing::{info, warn};
use wlansim_config::WlansimConfig;
use wlansim_core::pool::{round_robin_list, Ipv4Pool, MacPool, UdpPortPool};
use wlansim_core::MacAddr;
use wlansim_services::{Device, RunReport};
use wlansim_telemetry::MetricsRecorder;
use wlansim_traffic::{worker_channel_pair, HandlerHandle, TrafficHandler, WireSocket};

use crate::error::ManagerError;
use crate::worker::{WorkerHandle, WorkerSettings};

pub type JoinReport = RunReport;

/// Parallel identity sequences for a batch of APs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApParams {
    pub macs: Vec<MacAddr>,
    pub ips: Vec<Ipv4Addr>,
    pub udp_ports: Vec<u16>,
    pub radio_macs: Vec<MacAddr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientParams {
    pub macs: Vec<MacAddr>,
    pub ips: Vec<Ipv4Addr>,
}

struct ApRecord {
    mac: MacAddr,
    worker: usize,
}

pub struct Manager {
    handler: Option<HandlerHandle>,
    workers: Vec<WorkerHandle>,
    ap_mac_pool: MacPool,
    ap_ip_pool: Ipv4Pool,
    ap_udp_pool: UdpPortPool,
    radio_mac_pool: MacPool,
    client_mac_pool: MacPool,
    client_ip_pool: Ipv4Pool,
    known_macs: HashSet<MacAddr>,
    aps: Vec<ApRecord>,
    next_client_ap: usize,
    metrics: MetricsRecorder,
}

fn parse_mac(field: &'static str, value: &str) -> Result<MacAddr, ManagerError> {
    MacAddr::from_str(value).map_err(|_| ManagerError::InvalidArgument {
        field,
        value: value.into(),
    })
}

fn parse_ipv4(field: &'static str, value: &str) -> Result<Ipv4Addr, ManagerError> {
    value.parse().map_err(|_| ManagerError::InvalidArgument {
        field,
        value: value.into(),
    })
}

impl Manager {
    /// Builds the traffic handler for `port` on `wire` and one worker per
    /// `config.traffic.num_workers`, then seeds the allocation pools from
    /// the configured base values.
    pub fn new<W: WireSocket>(
        port: u8,
        wire: W,
        config: &WlansimConfig,
        metrics: MetricsRecorder,
    ) -> Result<Manager, ManagerError> {
        let num_workers = config.traffic.num_workers.max(1);
        let mut worker_ends = Vec::with_capacity(num_workers);
        let mut handler_ends = Vec::with_capacity(num_workers);
        for _ in 0..num_workers {
            let (worker_end, handler_end) = worker_channel_pair();
            worker_ends.push(worker_end);
            handler_ends.push(handler_end);
        }
        let handler = TrafficHandler::spawn(port, wire, handler_ends);

        let settings =
            WorkerSettings::from_config(&config.services, config.traffic.poll_interval_ms);
        let workers = worker_ends
            .into_iter()
            .enumerate()
            .map(|(index, channel)| {
                WorkerHandle::spawn(index, channel, settings, metrics.clone())
            })
            .collect();

        let base = &config.population.base_values;
        let mut manager = Manager {
            handler: Some(handler),
            workers,
            ap_mac_pool: MacPool::new(MacAddr::BROADCAST),
            ap_ip_pool: Ipv4Pool::new(Ipv4Addr::UNSPECIFIED),
            ap_udp_pool: UdpPortPool::new(0),
            radio_mac_pool: MacPool::new(MacAddr::BROADCAST),
            client_mac_pool: MacPool::new(MacAddr::BROADCAST),
            client_ip_pool: Ipv4Pool::new(Ipv4Addr::UNSPECIFIED),
            known_macs: HashSet::new(),
            aps: Vec::new(),
            next_client_ap: 0,
            metrics,
        };
        manager.set_base_values(
            &base.ap_mac,
            &base.ap_ip,
            base.ap_udp,
            &base.radio_mac,
            &base.client_mac,
            &base.client_ip,
        )?;
        Ok(manager)
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    /// Resets every allocation cursor. All six values are validated before
    /// any is applied; a bad one rejects the whole call.
    pub fn set_base_values(
        &mut self,
        ap_mac: &str,
        ap_ip: &str,
        ap_udp: u16,
        radio_mac: &str,
        client_mac: &str,
        client_ip: &str,
    ) -> Result<(), ManagerError> {
        let ap_mac = parse_mac("ap_mac", ap_mac)?;
        let ap_ip = parse_ipv4("ap_ip", ap_ip)?;
        let radio_mac = parse_mac("radio_mac", radio_mac)?;
        let client_mac = parse_mac("client_mac", client_mac)?;
        let client_ip = parse_ipv4("client_ip", client_ip)?;

        self.ap_mac_pool.set_base(ap_mac);
        self.ap_ip_pool.set_base(ap_ip);
        self.ap_udp_pool.set_base(ap_udp);
        self.radio_mac_pool.set_base(radio_mac);
        self.client_mac_pool.set_base(client_mac);
        self.client_ip_pool.set_base(client_ip);
        Ok(())
    }

    /// Allocates identities for `n` APs, advancing each cursor once per
    /// device with carry into higher octets.
    pub fn create_aps_params(&mut self, n: usize) -> Result<ApParams, ManagerError> {
        Ok(ApParams {
            macs: self.ap_mac_pool.take_n(n),
            ips: self.ap_ip_pool.take_n(n),
            udp_ports: self.ap_udp_pool.take_n(n)?,
            radio_macs: self.radio_mac_pool.take_n(n),
        })
    }

    pub fn create_clients_params(&mut self, n: usize) -> Result<ClientParams, ManagerError> {
        Ok(ClientParams {
            macs: self.client_mac_pool.take_n(n),
            ips: self.client_ip_pool.take_n(n),
        })
    }

    /// Creates `n` APs, spread round-robin across workers, and registers
    /// their MACs with the traffic layer before any service can start.
    pub fn create_aps(&mut self, n: usize) -> Result<Vec<MacAddr>, ManagerError> {
        let params = self.create_aps_params(n)?;
        for mac in &params.macs {
            if self.known_macs.contains(mac) {
                return Err(ManagerError::DuplicateMac(*mac));
            }
        }
        let assignment = round_robin_list(n, &worker_indices(self.workers.len()));

        let mapping = params
            .macs
            .iter()
            .zip(&assignment)
            .map(|(mac, worker)| (*mac, *worker))
            .collect();
        self.route_macs(mapping)?;

        for (((mac, ip), udp), (radio, worker)) in params
            .macs
            .iter()
            .zip(&params.ips)
            .zip(&params.udp_ports)
            .zip(params.radio_macs.iter().zip(&assignment))
        {
            let device = Device::ap(*mac, *ip, *udp, *radio, *worker);
            self.workers[*worker].add_device(device)?;
            self.known_macs.insert(*mac);
            self.aps.push(ApRecord {
                mac: *mac,
                worker: *worker,
            });
        }
        info!(count = n, "created aps");
        Ok(params.macs)
    }

    /// Creates `n` clients attached round-robin to existing APs. A client
    /// lives on its AP's worker. With `static_ips` false the clients get
    /// no address and acquire one over DHCP during join.
    pub fn create_clients(&mut self, n: usize, static_ips: bool) -> Result<Vec<MacAddr>, ManagerError> {
        if self.aps.is_empty() {
            return Err(ManagerError::NoAccessPoints);
        }
        let params = self.create_clients_params(n)?;
        for mac in &params.macs {
            if self.known_macs.contains(mac) {
                return Err(ManagerError::DuplicateMac(*mac));
            }
        }

        let mut assigned: Vec<(MacAddr, usize)> = Vec::with_capacity(n);
        let mut mapping = std::collections::HashMap::with_capacity(n);
        for mac in &params.macs {
            let ap = &self.aps[self.next_client_ap % self.aps.len()];
            self.next_client_ap += 1;
            assigned.push((ap.mac, ap.worker));
            mapping.insert(*mac, ap.worker);
        }
        self.route_macs(mapping)?;

        for ((mac, ip), (ap_mac, worker)) in
            params.macs.iter().zip(&params.ips).zip(&assigned)
        {
            let ip = static_ips.then_some(*ip);
            let device = Device::client(*mac, ip, *ap_mac, *worker);
            self.workers[*worker].add_device(device)?;
            self.known_macs.insert(*mac);
        }
        info!(count = n, static_ips, "created clients");
        Ok(params.macs)
    }

    /// Joins every created AP against the controller. `max_concurrent`
    /// bounds in-flight joins across the population; each worker gets at
    /// least one slot. With `wait` false this returns `None` right after
    /// the start requests are issued.
    pub fn join_aps(
        &mut self,
        max_concurrent: usize,
        wait: bool,
    ) -> Result<Option<JoinReport>, ManagerError> {
        let per_worker = per_worker_budget(max_concurrent, self.workers.len());
        for worker in &self.workers {
            worker.join_aps(per_worker)?;
        }
        if !wait {
            return Ok(None);
        }
        self.await_workers().map(Some)
    }

    pub fn join_clients(
        &mut self,
        max_concurrent: usize,
        wait: bool,
    ) -> Result<Option<JoinReport>, ManagerError> {
        let per_worker = per_worker_budget(max_concurrent, self.workers.len());
        for worker in &self.workers {
            worker.join_clients(per_worker)?;
        }
        if !wait {
            return Ok(None);
        }
        self.await_workers().map(Some)
    }

    /// Blocks until every worker's current batch is terminal and merges
    /// the per-worker outcome counts. One device failing never aborts the
    /// batch.
    pub fn await_workers(&mut self) -> Result<JoinReport, ManagerError> {
        let started = Instant::now();
        let mut merged = JoinReport::default();
        for worker in &self.workers {
            merged.merge(worker.await_idle()?);
        }
        self.metrics
            .devices_joined
            .inc_by(merged.succeeded as f64);
        self.metrics.devices_failed.inc_by(merged.failed as f64);
        self.metrics
            .join_duration
            .observe(started.elapsed().as_secs_f64());
        if merged.failed > 0 {
            warn!(?merged, "batch finished with failures");
        } else {
            info!(?merged, "batch finished");
        }
        Ok(merged)
    }

    /// Stops workers first, then the traffic handler. Idempotent.
    pub fn stop(&mut self) -> Result<(), ManagerError> {
        for worker in self.workers.drain(..) {
            worker.stop()?;
        }
        if let Some(handler) = self.handler.take() {
            handler.stop()?;
        }
        Ok(())
    }

    fn route_macs(
        &mut self,
        mapping: std::collections::HashMap<MacAddr, usize>,
    ) -> Result<(), ManagerError> {
        match &self.handler {
            Some(handler) => {
                handler.control().route_macs(mapping)?;
                Ok(())
            }
            None => Err(ManagerError::WorkerClosed),
        }
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn worker_indices(n: usize) -> Vec<usize> {
    (0..n).collect()
}

fn per_worker_budget(max_concurrent: usize, num_workers: usize) -> usize {
    (max_concurrent / num_workers.max(1)).max(1)
}
