// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

use super::stats::CfStatistics;
use super::{Iterator, Result, SEEK_BOUND};
use crate::storage::types::Key;

/// A cursor over one column family, tracking read statistics.
pub struct Cursor<I: Iterator> {
    iter: I,
}

impl<I: Iterator> Cursor<I> {
    pub fn new(iter: I) -> Cursor<I> {
        Cursor { iter }
    }

    pub fn seek(&mut self, key: &Key, statistics: &mut CfStatistics) -> Result<bool> {
        statistics.seek += 1;
        self.iter.seek(key)
    }

    /// Seeks to `key`, stepping forward up to `SEEK_BOUND` entries first if
    /// the cursor is already close. Repeated seeks over nearby increasing
    /// keys (the version chain of one row) then cost a handful of `next`s
    /// instead of a fresh seek each time. A target behind the current
    /// position falls back to a full seek.
    pub fn near_seek(&mut self, key: &Key, statistics: &mut CfStatistics) -> Result<bool> {
        if !self.iter.valid() {
            return self.seek(key, statistics);
        }
        if self.iter.key() == key.as_encoded().as_slice() {
            return Ok(true);
        }
        if self.iter.key() > key.as_encoded().as_slice() {
            return self.seek(key, statistics);
        }
        for _ in 0..SEEK_BOUND {
            statistics.next += 1;
            if !self.iter.next() {
                return Ok(false);
            }
            if self.iter.key() >= key.as_encoded().as_slice() {
                return Ok(true);
            }
        }
        self.seek(key, statistics)
    }

    pub fn seek_to_first(&mut self, statistics: &mut CfStatistics) -> bool {
        statistics.seek += 1;
        self.iter.seek_to_first()
    }

    pub fn next(&mut self, statistics: &mut CfStatistics) -> bool {
        statistics.next += 1;
        self.iter.next()
    }

    pub fn valid(&self) -> bool {
        self.iter.valid()
    }

    pub fn key(&self) -> &[u8] {
        self.iter.key()
    }

    pub fn value(&self) -> &[u8] {
        self.iter.value()
    }
}
