// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

use std::fmt::{self, Display, Formatter};

use super::resolve_lock_readphase::ResolveLockReadPhase;
use super::{Command, CommandExt, WriteCommand, WriteResult};
use crate::storage::kv::{Snapshot, Statistics};
use crate::storage::mvcc::{Lock, MvccTxn, TimeStamp, MAX_TXN_WRITE_SIZE};
use crate::storage::txn::latch::{self, Latches};
use crate::storage::txn::{ErrorInner, ProcessResult, Result};
use crate::storage::types::Key;
use crate::storage::Context;

/// The write half of lock resolution: commits or rolls back one batch of
/// locks found by [`ResolveLockReadPhase`], depending on the fate of their
/// transaction. Locks of other transactions are never touched because the
/// read phase filtered on the start timestamp.
pub struct ResolveLock {
    ctx: Context,
    start_ts: TimeStamp,
    commit_ts: TimeStamp,
    /// Where the next scan round continues, if this batch is not the last.
    scan_key: Option<Key>,
    key_locks: Vec<(Key, Lock)>,
}

impl ResolveLock {
    pub fn new(
        start_ts: TimeStamp,
        commit_ts: TimeStamp,
        scan_key: Option<Key>,
        key_locks: Vec<(Key, Lock)>,
        ctx: Context,
    ) -> ResolveLock {
        ResolveLock {
            ctx,
            start_ts,
            commit_ts,
            scan_key,
            key_locks,
        }
    }
}

impl Display for ResolveLock {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "kv::command::resolve_lock {} -> {} keys({}) | {:?}",
            self.start_ts,
            self.commit_ts,
            self.key_locks.len(),
            self.ctx
        )
    }
}

impl CommandExt for ResolveLock {
    fn tag(&self) -> &'static str {
        "resolve_lock"
    }

    fn get_ctx(&self) -> &Context {
        &self.ctx
    }

    fn ts(&self) -> TimeStamp {
        self.start_ts
    }

    fn write_bytes(&self) -> usize {
        self.key_locks.iter().map(|(k, _)| k.len()).sum()
    }

    fn gen_lock(&self, latches: &Latches) -> latch::Lock {
        let keys: Vec<_> = self.key_locks.iter().map(|(k, _)| k).collect();
        latches.gen_lock(&keys)
    }
}

impl<S: Snapshot> WriteCommand<S> for ResolveLock {
    fn process_write(self, snapshot: S, statistics: &mut Statistics) -> Result<WriteResult> {
        if !self.commit_ts.is_zero() && self.commit_ts < self.start_ts {
            return Err(ErrorInner::InvalidTxnTso {
                start_ts: self.start_ts,
                commit_ts: self.commit_ts,
            }
            .into());
        }
        let ResolveLock {
            ctx,
            start_ts,
            commit_ts,
            mut scan_key,
            key_locks,
        } = self;

        let rows = key_locks.len();
        let mut txn = MvccTxn::new(snapshot, start_ts);
        for (current_key, _) in key_locks {
            if commit_ts.is_zero() {
                txn.rollback(current_key.clone())?;
            } else {
                txn.commit(current_key.clone(), commit_ts)?;
            }
            if txn.write_size() >= MAX_TXN_WRITE_SIZE {
                // Flush what we have; the keys left in this batch are still
                // locked and will be found again by the next scan round.
                scan_key = Some(current_key);
                break;
            }
        }
        statistics.add(&txn.take_statistics());

        let pr = match scan_key {
            None => ProcessResult::Res,
            Some(key) => ProcessResult::NextCommand {
                cmd: Command::ResolveLockReadPhase(ResolveLockReadPhase::new(
                    start_ts,
                    commit_ts,
                    Some(key),
                    ctx.clone(),
                )),
            },
        };
        Ok(WriteResult {
            ctx,
            to_be_write: txn.into_modifies(),
            rows,
            pr,
        })
    }
}
