// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

use std::fmt::{self, Display, Formatter};

use super::resolve_lock::ResolveLock;
use super::{Command, CommandExt, ReadCommand};
use crate::storage::kv::{Snapshot, Statistics};
use crate::storage::mvcc::{MvccReader, TimeStamp};
use crate::storage::txn::{ProcessResult, Result};
use crate::storage::types::Key;
use crate::storage::Context;

/// How many locks one resolve round may collect before handing over to the
/// write phase, bounding the size of a single mutation batch.
pub const RESOLVE_LOCK_BATCH_SIZE: usize = 256;

/// The scan half of `ResolveLock`: collects the locks left behind by one
/// transaction, batch by batch, without taking latches. Each batch is
/// handed to a latched [`ResolveLock`] write command via `NextCommand`.
pub struct ResolveLockReadPhase {
    ctx: Context,
    start_ts: TimeStamp,
    /// Zero means roll the transaction back, otherwise commit at this
    /// timestamp.
    commit_ts: TimeStamp,
    scan_key: Option<Key>,
}

impl ResolveLockReadPhase {
    pub fn new(
        start_ts: TimeStamp,
        commit_ts: TimeStamp,
        scan_key: Option<Key>,
        ctx: Context,
    ) -> ResolveLockReadPhase {
        ResolveLockReadPhase {
            ctx,
            start_ts,
            commit_ts,
            scan_key,
        }
    }
}

impl Display for ResolveLockReadPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "kv::command::resolve_lock_readphase {} -> {} | {:?}",
            self.start_ts, self.commit_ts, self.ctx
        )
    }
}

impl CommandExt for ResolveLockReadPhase {
    fn tag(&self) -> &'static str {
        "resolve_lock"
    }

    fn get_ctx(&self) -> &Context {
        &self.ctx
    }

    fn ts(&self) -> TimeStamp {
        self.start_ts
    }

    fn readonly(&self) -> bool {
        true
    }
}

impl<S: Snapshot> ReadCommand<S> for ResolveLockReadPhase {
    fn process_read(self, snapshot: S, statistics: &mut Statistics) -> Result<ProcessResult> {
        let ResolveLockReadPhase {
            ctx,
            start_ts,
            commit_ts,
            scan_key,
        } = self;

        let mut reader = MvccReader::new(snapshot);
        let result = reader.scan_locks(
            scan_key.as_ref(),
            |lock| lock.ts == start_ts,
            RESOLVE_LOCK_BATCH_SIZE,
        );
        reader.collect_statistics_into(statistics);
        let (kv_pairs, has_remain) = result?;

        if kv_pairs.is_empty() {
            return Ok(ProcessResult::Res);
        }
        let next_scan_key = if has_remain {
            // There may be more locks; the write phase loops back to us
            // starting from the last scanned key.
            kv_pairs.last().map(|(k, _)| k.clone())
        } else {
            None
        };
        Ok(ProcessResult::NextCommand {
            cmd: Command::ResolveLock(ResolveLock::new(
                start_ts,
                commit_ts,
                next_scan_key,
                kv_pairs,
                ctx,
            )),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::kv::{BTreeEngine, Engine};
    use crate::storage::mvcc::txn::tests::must_prewrite_put;

    fn must_read(engine: &BTreeEngine, cmd: ResolveLockReadPhase) -> ProcessResult {
        let snapshot = engine.snapshot(&Context::default()).unwrap();
        let mut statistics = Statistics::default();
        cmd.process_read(snapshot, &mut statistics).unwrap()
    }

    #[test]
    fn test_scan_finds_only_matching_locks() {
        let engine = BTreeEngine::default();
        must_prewrite_put(&engine, b"k1", b"v", b"k1", 5);
        must_prewrite_put(&engine, b"k2", b"v", b"k1", 5);
        must_prewrite_put(&engine, b"k3", b"v", b"k3", 7);

        let cmd =
            ResolveLockReadPhase::new(5.into(), 6.into(), None, Context::default());
        match must_read(&engine, cmd) {
            ProcessResult::NextCommand { cmd } => {
                assert_eq!(cmd.tag(), "resolve_lock");
                assert!(!cmd.readonly());
            }
            _ => panic!("expect next command"),
        }
    }

    #[test]
    fn test_scan_without_locks_finishes() {
        let engine = BTreeEngine::default();
        let cmd =
            ResolveLockReadPhase::new(5.into(), 6.into(), None, Context::default());
        match must_read(&engine, cmd) {
            ProcessResult::Res => {}
            _ => panic!("expect res"),
        }
    }
}
