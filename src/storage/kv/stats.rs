// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

use crate::storage::{CfName, CF_DEFAULT, CF_LOCK, CF_WRITE};

/// Read counters for one column family.
#[derive(Default, Debug, Clone)]
pub struct CfStatistics {
    pub get: usize,
    pub seek: usize,
    pub next: usize,
    /// How many of the touched entries were actually useful to the caller.
    pub processed: usize,
}

impl CfStatistics {
    pub fn add(&mut self, other: &CfStatistics) {
        self.get += other.get;
        self.seek += other.seek;
        self.next += other.next;
        self.processed += other.processed;
    }

    pub fn total_op_count(&self) -> usize {
        self.get + self.seek + self.next
    }
}

/// Read counters of a command execution, split by column family.
#[derive(Default, Debug, Clone)]
pub struct Statistics {
    pub lock: CfStatistics,
    pub write: CfStatistics,
    pub data: CfStatistics,
}

impl Statistics {
    pub fn add(&mut self, other: &Statistics) {
        self.lock.add(&other.lock);
        self.write.add(&other.write);
        self.data.add(&other.data);
    }

    pub fn mut_cf_statistics(&mut self, cf: CfName) -> &mut CfStatistics {
        match cf {
            CF_LOCK => &mut self.lock,
            CF_WRITE => &mut self.write,
            CF_DEFAULT => &mut self.data,
            _ => unreachable!("unknown cf {}", cf),
        }
    }
}
