//! Simulated network controller.
//!
//! Sits on the far end of the wire and answers the device protocols:
//! discovery, controller join, client association, and DHCP leases. Used
//! when no real controller is attached.

use std::net::Ipv4Addr;

use bytes::Bytes;
use tracing::{debug, trace};
use wlansim_core::pool::Ipv4Pool;
use wlansim_core::MacAddr;
use wlansim_services::{Frame, FrameKind};
use wlansim_traffic::WireSocket;

const CONTROLLER_MAC: MacAddr = MacAddr::new([0x0c, 0x00, 0x00, 0x00, 0x00, 0x01]);
const LEASE_BASE: Ipv4Addr = Ipv4Addr::new(10, 1, 0, 1);

pub struct SimController<W: WireSocket> {
    wire: W,
    mac: MacAddr,
    leases: Ipv4Pool,
}

impl<W: WireSocket> SimController<W> {
    pub fn new(wire: W) -> SimController<W> {
        SimController {
            wire,
            mac: CONTROLLER_MAC,
            leases: Ipv4Pool::new(LEASE_BASE),
        }
    }

    pub fn mac(&self) -> MacAddr {
        self.mac
    }

    /// Handles at most one pending frame; `false` when the wire was idle.
    pub fn poll(&mut self) -> bool {
        let raw = match self.wire.recv() {
            Ok(Some(raw)) => raw,
            Ok(None) => return false,
            Err(_) => return false,
        };
        let Some(frame) = Frame::parse(&raw) else {
            trace!("unparseable frame ignored");
            return true;
        };
        let reply = match frame.kind {
            FrameKind::Discovery => Some(Frame::new(
                frame.src,
                self.mac,
                FrameKind::DiscoveryResponse,
            )),
            FrameKind::JoinRequest => {
                Some(Frame::new(frame.src, self.mac, FrameKind::JoinResponse))
            }
            // Answer association on the AP's behalf.
            FrameKind::AssocRequest => {
                Some(Frame::new(frame.src, frame.dst, FrameKind::AssocResponse))
            }
            FrameKind::DhcpDiscover => {
                Some(Frame::new(frame.src, self.mac, FrameKind::DhcpOffer))
            }
            FrameKind::DhcpRequest => {
                let lease = self.leases.take();
                debug!(client = %frame.src, %lease, "leased address");
                Some(Frame::with_payload(
                    frame.src,
                    self.mac,
                    FrameKind::DhcpAck,
                    Bytes::copy_from_slice(&lease.octets()),
                ))
            }
            _ => None,
        };
        if let Some(reply) = reply {
            let _ = self.wire.send(reply.encode());
        }
        true
    }
}
