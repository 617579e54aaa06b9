//! Wire-side socket abstraction.
//!
//! The handler only ever needs two operations against the capture port:
//! push a frame down and poll for the next frame up. `WireSocket` keeps
//! the handler loops testable against an in-memory transport.

use bytes::Bytes;
use crossbeam::channel::{self, Receiver, Sender, TryRecvError};

use crate::error::TrafficError;

/// Endpoint string for a simulated capture port.
pub fn capture_endpoint(port_id: u8) -> String {
    format!("ipc:///tmp/trex_capture_port_{port_id}")
}

/// Shared by the up/down and down/up threads, hence `Sync`.
pub trait WireSocket: Send + Sync + 'static {
    /// Transmits one whole frame.
    fn send(&self, frame: Bytes) -> Result<(), TrafficError>;

    /// Non-blocking poll; `Ok(None)` when no frame is pending.
    fn recv(&self) -> Result<Option<Bytes>, TrafficError>;
}

/// In-memory wire backed by a pair of crossed channels.
pub struct MemoryWire {
    tx: Sender<Bytes>,
    rx: Receiver<Bytes>,
}

/// Two connected `MemoryWire` ends; frames sent on one are received on the
/// other.
pub fn memory_wire_pair() -> (MemoryWire, MemoryWire) {
    let (a_tx, a_rx) = channel::unbounded();
    let (b_tx, b_rx) = channel::unbounded();
    (
        MemoryWire { tx: a_tx, rx: b_rx },
        MemoryWire { tx: b_tx, rx: a_rx },
    )
}

impl WireSocket for MemoryWire {
    fn send(&self, frame: Bytes) -> Result<(), TrafficError> {
        self.tx
            .send(frame)
            .map_err(|_| TrafficError::ChannelClosed("wire"))
    }

    fn recv(&self) -> Result<Option<Bytes>, TrafficError> {
        match self.rx.try_recv() {
            Ok(frame) => Ok(Some(frame)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(TrafficError::ChannelClosed("wire")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_cross_the_pair() {
        let (near, far) = memory_wire_pair();
        near.send(Bytes::from_static(b"up")).expect("send");
        far.send(Bytes::from_static(b"down")).expect("send");
        assert_eq!(far.recv().expect("recv"), Some(Bytes::from_static(b"up")));
        assert_eq!(
            near.recv().expect("recv"),
            Some(Bytes::from_static(b"down"))
        );
        assert_eq!(near.recv().expect("recv"), None);
    }

    #[test]
    fn endpoint_embeds_port_id() {
        assert_eq!(capture_endpoint(3), "ipc:///tmp/trex_capture_port_3");
    }

    // The handler clones one Arc'd socket into two threads; this must
    // hold for any implementation, not just MemoryWire.
    #[test]
    fn sockets_are_shareable_across_threads() {
        fn split<W: WireSocket>(wire: W) -> (std::sync::Arc<W>, std::sync::Arc<W>) {
            let wire = std::sync::Arc::new(wire);
            (std::sync::Arc::clone(&wire), wire)
        }
        let (near, far) = memory_wire_pair();
        let (a, b) = split(near);
        let sender = std::thread::spawn(move || a.send(Bytes::from_static(b"x")));
        sender.join().expect("thread").expect("send");
        drop(b);
        assert_eq!(far.recv().expect("recv"), Some(Bytes::from_static(b"x")));
    }
}
