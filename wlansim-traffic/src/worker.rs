//! Per-worker duplex frame channel.
//!
//! Each worker process holds one end; the handler holds the other. The
//! handler side's uplink receivers are what the up/down loop multiplexes
//! over, and the downlink sender is what routed wire frames land on.

use bytes::Bytes;
use crossbeam::channel::{self, Receiver, Sender, TryRecvError};

use crate::error::TrafficError;

/// One end of a worker ↔ handler frame pipe.
pub struct WorkerChannel {
    tx: Sender<Bytes>,
    rx: Receiver<Bytes>,
}

/// Connected (worker end, handler end) pair.
pub fn worker_channel_pair() -> (WorkerChannel, WorkerChannel) {
    let (up_tx, up_rx) = channel::unbounded();
    let (down_tx, down_rx) = channel::unbounded();
    (
        WorkerChannel {
            tx: up_tx,
            rx: down_rx,
        },
        WorkerChannel {
            tx: down_tx,
            rx: up_rx,
        },
    )
}

impl WorkerChannel {
    pub fn send(&self, frame: Bytes) -> Result<(), TrafficError> {
        self.tx
            .send(frame)
            .map_err(|_| TrafficError::ChannelClosed("worker"))
    }

    pub fn recv(&self) -> Result<Option<Bytes>, TrafficError> {
        match self.rx.try_recv() {
            Ok(frame) => Ok(Some(frame)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(TrafficError::ChannelClosed("worker")),
        }
    }

    /// Blocking receive, for worker-side loops that have nothing else to do.
    pub fn recv_blocking(&self) -> Result<Bytes, TrafficError> {
        self.rx
            .recv()
            .map_err(|_| TrafficError::ChannelClosed("worker"))
    }

    pub(crate) fn receiver(&self) -> &Receiver<Bytes> {
        &self.rx
    }

    pub(crate) fn sender(&self) -> &Sender<Bytes> {
        &self.tx
    }
}
