use super::Reducer;
use super::ring::RingMember;
use crate::config::RingConfig;
use crate::error::{PowerSgdError, Result};
use crate::types::Scalar;

/// Blocking wrapper around [`RingMember`].
///
/// Owns a `tokio::runtime::Runtime` and calls `block_on()` for each
/// reduction, so every worker can live on a plain OS thread. Must not be
/// used from inside another tokio runtime.
pub struct BlockingRing<T> {
    inner: RingMember<T>,
    rt: tokio::runtime::Runtime,
}

impl<T: Scalar> BlockingRing<T> {
    /// Build a ring of `world_size` blocking members.
    pub fn group(world_size: usize, config: &RingConfig) -> Result<Vec<Self>> {
        // Each member needs its own runtime since `block_on` is exclusive.
        RingMember::group(world_size, config)?
            .into_iter()
            .map(Self::from_member)
            .collect()
    }

    /// Wrap an existing async member with a new runtime.
    pub fn from_member(inner: RingMember<T>) -> Result<Self> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| PowerSgdError::Runtime(e.to_string()))?;
        Ok(Self { inner, rt })
    }

    /// In-place sum across the ring.
    pub fn all_reduce_sum(&self, buf: &mut [T]) -> Result<()> {
        self.rt.block_on(self.inner.all_reduce_sum(buf))
    }
}

impl<T: Scalar> Reducer<T> for BlockingRing<T> {
    fn all_reduce_mean(&self, buf: &mut [T]) -> Result<()> {
        self.rt.block_on(self.inner.all_reduce_mean(buf))
    }

    fn world_size(&self) -> usize {
        self.inner.world_size()
    }

    fn rank(&self) -> usize {
        self.inner.rank()
    }
}
