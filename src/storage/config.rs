// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

use serde::{Deserialize, Serialize};

const DEFAULT_SCHED_CONCURRENCY: usize = 2048;
const DEFAULT_SCHED_WORKER_POOL_SIZE: usize = 4;
// Flow control kicks in once this many bytes of writes are in flight.
const DEFAULT_SCHED_PENDING_WRITE_MB: usize = 100;

/// Storage configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// The number of latch slots. Should comfortably exceed the expected
    /// number of concurrent commands.
    pub scheduler_concurrency: usize,
    pub scheduler_worker_pool_size: usize,
    pub scheduler_pending_write_threshold: usize,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            scheduler_concurrency: DEFAULT_SCHED_CONCURRENCY,
            scheduler_worker_pool_size: DEFAULT_SCHED_WORKER_POOL_SIZE,
            scheduler_pending_write_threshold: DEFAULT_SCHED_PENDING_WRITE_MB * 1024 * 1024,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), String> {
        if self.scheduler_concurrency == 0 {
            return Err("scheduler-concurrency should be greater than 0".into());
        }
        if self.scheduler_worker_pool_size == 0 {
            return Err("scheduler-worker-pool-size should be greater than 0".into());
        }
        Ok(())
    }
}
