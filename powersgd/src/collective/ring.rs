//! Ring all-reduce between in-process workers.
//!
//! Each member owns a channel to its successor and a receiver from its
//! predecessor. The algorithm is the classic two-phase ring:
//! 1. Scatter-reduce: N-1 rounds. Each member sends one chunk to the next
//!    member and receives one chunk from the previous, summing in place.
//! 2. Allgather: N-1 rounds. Each member forwards a fully reduced chunk.

use std::time::Duration;

use tokio::sync::{Mutex, mpsc};

use super::helpers::{ChunkLayout, collective_recv, collective_send};
use crate::config::RingConfig;
use crate::error::{PowerSgdError, Result};
use crate::types::Scalar;

/// One participant in an in-process ring.
pub struct RingMember<T> {
    rank: usize,
    world: usize,
    to_next: mpsc::Sender<Vec<T>>,
    from_prev: Mutex<mpsc::Receiver<Vec<T>>>,
    timeout: Duration,
}

impl<T: Scalar> RingMember<T> {
    /// Wire up `world_size` members into a ring.
    pub fn group(world_size: usize, config: &RingConfig) -> Result<Vec<Self>> {
        if world_size == 0 {
            return Err(PowerSgdError::invalid_config(
                "world_size",
                "must be positive",
            ));
        }
        let capacity = config.channel_capacity.max(1);
        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..world_size).map(|_| mpsc::channel(capacity)).unzip();

        // Member r sends on channel r; member r+1 receives from it.
        let mut receivers: Vec<Option<mpsc::Receiver<Vec<T>>>> =
            receivers.into_iter().map(Some).collect();
        let mut members = Vec::with_capacity(world_size);
        for (rank, to_next) in senders.into_iter().enumerate() {
            let prev = (rank + world_size - 1) % world_size;
            let from_prev = receivers[prev]
                .take()
                .ok_or_else(|| PowerSgdError::invalid_config("world_size", "ring wiring"))?;
            members.push(RingMember {
                rank,
                world: world_size,
                to_next,
                from_prev: Mutex::new(from_prev),
                timeout: config.collective_timeout,
            });
        }
        Ok(members)
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn world_size(&self) -> usize {
        self.world
    }

    /// In-place element-wise sum across all members.
    pub async fn all_reduce_sum(&self, buf: &mut [T]) -> Result<()> {
        let world = self.world;
        let rank = self.rank;

        if world <= 1 {
            return Ok(());
        }

        let layout = ChunkLayout::new(buf.len(), world);
        let next = (rank + 1) % world;
        let prev = (rank + world - 1) % world;

        // Phase 1: Scatter-reduce (N-1 rounds).
        for step in 0..(world - 1) {
            let send_idx = (rank + world - step) % world;
            let recv_idx = (rank + world - step - 1) % world;

            let send_snapshot = buf[layout.range(send_idx)].to_vec();
            let (_, received) = tokio::try_join!(
                collective_send(&self.to_next, next, send_snapshot, self.timeout, "all_reduce"),
                collective_recv(&self.from_prev, prev, self.timeout, "all_reduce"),
            )?;

            if received.len() != layout.chunk_count(recv_idx) {
                return Err(PowerSgdError::BufferSizeMismatch {
                    expected: layout.chunk_count(recv_idx),
                    actual: received.len(),
                });
            }
            let dst = &mut buf[layout.range(recv_idx)];
            for (d, s) in dst.iter_mut().zip(received) {
                *d = *d + s;
            }
        }

        // Phase 2: Allgather (N-1 rounds).
        for step in 0..(world - 1) {
            let send_idx = (rank + world + 1 - step) % world;
            let recv_idx = (rank + world - step) % world;

            let send_snapshot = buf[layout.range(send_idx)].to_vec();
            let (_, received) = tokio::try_join!(
                collective_send(&self.to_next, next, send_snapshot, self.timeout, "all_reduce"),
                collective_recv(&self.from_prev, prev, self.timeout, "all_reduce"),
            )?;

            if received.len() != layout.chunk_count(recv_idx) {
                return Err(PowerSgdError::BufferSizeMismatch {
                    expected: layout.chunk_count(recv_idx),
                    actual: received.len(),
                });
            }
            let dst = &mut buf[layout.range(recv_idx)];
            dst.copy_from_slice(&received);
        }

        Ok(())
    }

    /// In-place element-wise average across all members.
    pub async fn all_reduce_mean(&self, buf: &mut [T]) -> Result<()> {
        self.all_reduce_sum(buf).await?;
        let world = T::from_usize(self.world);
        for v in buf.iter_mut() {
            *v = *v / world;
        }
        Ok(())
    }
}
