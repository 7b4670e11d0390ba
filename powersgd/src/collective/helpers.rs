use std::ops::Range;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};

use crate::error::{PowerSgdError, Result};

/// Split of `count` elements into `world` contiguous chunks.
///
/// The first `count % world` chunks carry one extra element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ChunkLayout {
    pub offsets: Vec<usize>,
    counts: Vec<usize>,
}

impl ChunkLayout {
    pub fn new(count: usize, world: usize) -> Self {
        let base = count / world;
        let extra = count % world;
        let mut offsets = Vec::with_capacity(world);
        let mut counts = Vec::with_capacity(world);
        let mut off = 0;
        for i in 0..world {
            let n = base + usize::from(i < extra);
            offsets.push(off);
            counts.push(n);
            off += n;
        }
        Self { offsets, counts }
    }

    pub fn chunk_count(&self, idx: usize) -> usize {
        self.counts[idx]
    }

    pub fn range(&self, idx: usize) -> Range<usize> {
        self.offsets[idx]..self.offsets[idx] + self.counts[idx]
    }
}

/// Send a chunk to the next ring member with timeout, wrapping errors as
/// `CollectiveFailed`.
pub(crate) async fn collective_send<T>(
    tx: &mpsc::Sender<Vec<T>>,
    dest: usize,
    chunk: Vec<T>,
    timeout: Duration,
    operation: &'static str,
) -> Result<()> {
    match tokio::time::timeout(timeout, tx.send(chunk)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(_)) => Err(PowerSgdError::collective(
            operation,
            dest,
            "peer disconnected",
        )),
        Err(_) => Err(PowerSgdError::collective(
            operation,
            dest,
            format!("send timed out after {}s", timeout.as_secs_f64()),
        )),
    }
}

/// Receive a chunk from the previous ring member with timeout, wrapping
/// errors as `CollectiveFailed`.
pub(crate) async fn collective_recv<T>(
    rx: &Mutex<mpsc::Receiver<Vec<T>>>,
    src: usize,
    timeout: Duration,
    operation: &'static str,
) -> Result<Vec<T>> {
    let mut rx = rx.lock().await;
    match tokio::time::timeout(timeout, rx.recv()).await {
        Ok(Some(chunk)) => Ok(chunk),
        Ok(None) => Err(PowerSgdError::collective(
            operation,
            src,
            "peer disconnected",
        )),
        Err(_) => Err(PowerSgdError::collective(
            operation,
            src,
            format!("recv timed out after {}s", timeout.as_secs_f64()),
        )),
    }
}
