//! Policy parameters for the compressor.
//!
//! Defaults follow the reference PowerSGD setup. Override via environment
//! variables (prefixed `POWERSGD_`) or by constructing a custom `Config`.

use std::time::Duration;

use crate::error::{PowerSgdError, Result};

/// Immutable policy controlling rank, gating, warmup and refinement.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Target rank of the `P·Qᵗ` approximation.
    pub rank: usize,

    /// Minimum ratio of full size to factor size for a parameter to be
    /// compressed at all.
    pub min_compression_rate: f64,

    /// Number of `aggregate` calls that pass gradients through uncompressed
    /// before compression switches on.
    pub start_compressing_after_num_steps: u64,

    /// Power-iteration refinements per call.
    pub num_iters_per_step: usize,

    /// Seed for the lazy initialization of `Q`. Must agree across workers.
    pub seed: u64,
}

impl Config {
    /// Config with the given rank and default values for everything else.
    pub fn new(rank: usize) -> Self {
        Self {
            rank,
            min_compression_rate: 2.0,
            start_compressing_after_num_steps: 100,
            num_iters_per_step: 1,
            seed: 0,
        }
    }

    pub fn with_min_compression_rate(mut self, rate: f64) -> Self {
        self.min_compression_rate = rate;
        self
    }

    pub fn with_start_compressing_after_num_steps(mut self, steps: u64) -> Self {
        self.start_compressing_after_num_steps = steps;
        self
    }

    pub fn with_num_iters_per_step(mut self, iters: usize) -> Self {
        self.num_iters_per_step = iters;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Load config from environment variables, falling back to
    /// `Config::new(rank)`.
    ///
    /// Recognized variables:
    /// - `POWERSGD_RANK`
    /// - `POWERSGD_MIN_COMPRESSION_RATE`
    /// - `POWERSGD_START_COMPRESSING_AFTER_NUM_STEPS`
    /// - `POWERSGD_NUM_ITERS_PER_STEP`
    /// - `POWERSGD_SEED`
    pub fn from_env(rank: usize) -> Self {
        let mut cfg = Self::new(rank);

        if let Ok(v) = std::env::var("POWERSGD_RANK") {
            if let Ok(n) = v.parse::<usize>() {
                cfg.rank = n;
            }
        }
        if let Ok(v) = std::env::var("POWERSGD_MIN_COMPRESSION_RATE") {
            if let Ok(r) = v.parse::<f64>() {
                cfg.min_compression_rate = r;
            }
        }
        if let Ok(v) = std::env::var("POWERSGD_START_COMPRESSING_AFTER_NUM_STEPS") {
            if let Ok(n) = v.parse::<u64>() {
                cfg.start_compressing_after_num_steps = n;
            }
        }
        if let Ok(v) = std::env::var("POWERSGD_NUM_ITERS_PER_STEP") {
            if let Ok(n) = v.parse::<usize>() {
                cfg.num_iters_per_step = n;
            }
        }
        if let Ok(v) = std::env::var("POWERSGD_SEED") {
            if let Ok(n) = v.parse::<u64>() {
                cfg.seed = n;
            }
        }

        cfg
    }

    /// Check the policy once, before any parameter is tracked.
    pub fn validate(&self) -> Result<()> {
        if self.rank == 0 {
            return Err(PowerSgdError::invalid_config("rank", "must be positive"));
        }
        // Written so that NaN is rejected too.
        if !(self.min_compression_rate >= 1.0) {
            return Err(PowerSgdError::invalid_config(
                "min_compression_rate",
                format!("must be >= 1, got {}", self.min_compression_rate),
            ));
        }
        if self.num_iters_per_step == 0 {
            return Err(PowerSgdError::invalid_config(
                "num_iters_per_step",
                "must be positive",
            ));
        }
        Ok(())
    }
}

/// Tuning for the in-process ring all-reduce.
#[derive(Debug, Clone)]
pub struct RingConfig {
    /// Timeout for each send/recv within a collective.
    pub collective_timeout: Duration,

    /// Chunks buffered per link before a sender waits.
    pub channel_capacity: usize,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            collective_timeout: Duration::from_secs(30),
            channel_capacity: 4,
        }
    }
}

impl RingConfig {
    /// Recognized variables:
    /// - `POWERSGD_COLLECTIVE_TIMEOUT_SECS`
    /// - `POWERSGD_CHANNEL_CAPACITY`
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("POWERSGD_COLLECTIVE_TIMEOUT_SECS") {
            if let Ok(s) = v.parse::<u64>() {
                cfg.collective_timeout = Duration::from_secs(s);
            }
        }
        if let Ok(v) = std::env::var("POWERSGD_CHANNEL_CAPACITY") {
            if let Ok(n) = v.parse::<usize>() {
                cfg.channel_capacity = n.max(1);
            }
        }

        cfg
    }
}
