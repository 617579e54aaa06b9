//! Simulation frame format.
//!
//! Byte-exact reproduction of real wireless protocols is out of scope; the
//! simulator moves opaque tagged frames instead. Layout on the wire:
//!
//! ```text
//! [dst mac: 6][src mac: 6][kind: 1][payload: …]
//! ```
//!
//! The destination prefix is all the traffic layer looks at; everything
//! after the kind tag is opaque to routing.

use bytes::{BufMut, Bytes, BytesMut};
use wlansim_core::MacAddr;

pub const HEADER_LEN: usize = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    Discovery = 1,
    DiscoveryResponse = 2,
    JoinRequest = 3,
    JoinResponse = 4,
    AssocRequest = 5,
    AssocResponse = 6,
    Deauth = 7,
    DhcpDiscover = 8,
    DhcpOffer = 9,
    DhcpRequest = 10,
    DhcpAck = 11,
    ArpAnnounce = 12,
    Data = 13,
}

impl FrameKind {
    fn from_byte(byte: u8) -> Option<FrameKind> {
        Some(match byte {
            1 => FrameKind::Discovery,
            2 => FrameKind::DiscoveryResponse,
            3 => FrameKind::JoinRequest,
            4 => FrameKind::JoinResponse,
            5 => FrameKind::AssocRequest,
            6 => FrameKind::AssocResponse,
            7 => FrameKind::Deauth,
            8 => FrameKind::DhcpDiscover,
            9 => FrameKind::DhcpOffer,
            10 => FrameKind::DhcpRequest,
            11 => FrameKind::DhcpAck,
            12 => FrameKind::ArpAnnounce,
            13 => FrameKind::Data,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub dst: MacAddr,
    pub src: MacAddr,
    pub kind: FrameKind,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(dst: MacAddr, src: MacAddr, kind: FrameKind) -> Frame {
        Frame {
            dst,
            src,
            kind,
            payload: Bytes::new(),
        }
    }

    pub fn with_payload(dst: MacAddr, src: MacAddr, kind: FrameKind, payload: Bytes) -> Frame {
        Frame {
            dst,
            src,
            kind,
            payload,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        buf.put_slice(&self.dst.octets());
        buf.put_slice(&self.src.octets());
        buf.put_u8(self.kind as u8);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// `None` for truncated frames or unknown kind tags; both are dropped
    /// as noise, never surfaced as errors.
    pub fn parse(raw: &Bytes) -> Option<Frame> {
        if raw.len() < HEADER_LEN {
            return None;
        }
        let dst = MacAddr::from_frame(&raw[..6])?;
        let src = MacAddr::from_frame(&raw[6..12])?;
        let kind = FrameKind::from_byte(raw[12])?;
        Some(Frame {
            dst,
            src,
            kind,
            payload: raw.slice(HEADER_LEN..),
        })
    }
}
