// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

use std::fmt::{self, Display, Formatter};

use super::{CommandExt, WriteCommand, WriteResult};
use crate::storage::kv::{Snapshot, Statistics};
use crate::storage::mvcc::{MvccTxn, TimeStamp};
use crate::storage::txn::latch::{self, Latches};
use crate::storage::txn::{ErrorInner, ProcessResult, Result};
use crate::storage::types::Key;
use crate::storage::Context;

/// The second phase of two-phase commit: turn the locks of a prewritten
/// transaction into commit records at `commit_ts`.
pub struct Commit {
    ctx: Context,
    keys: Vec<Key>,
    /// The transaction's start timestamp, identifying its locks.
    lock_ts: TimeStamp,
    commit_ts: TimeStamp,
}

impl Commit {
    pub fn new(keys: Vec<Key>, lock_ts: TimeStamp, commit_ts: TimeStamp, ctx: Context) -> Commit {
        Commit {
            ctx,
            keys,
            lock_ts,
            commit_ts,
        }
    }
}

impl Display for Commit {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "kv::command::commit {} {} -> {} | {:?}",
            self.keys.len(),
            self.lock_ts,
            self.commit_ts,
            self.ctx
        )
    }
}

impl CommandExt for Commit {
    fn tag(&self) -> &'static str {
        "commit"
    }

    fn get_ctx(&self) -> &Context {
        &self.ctx
    }

    fn ts(&self) -> TimeStamp {
        self.commit_ts
    }

    fn write_bytes(&self) -> usize {
        self.keys.iter().map(|k| k.len()).sum()
    }

    fn gen_lock(&self, latches: &Latches) -> latch::Lock {
        latches.gen_lock(&self.keys)
    }
}

impl<S: Snapshot> WriteCommand<S> for Commit {
    fn process_write(self, snapshot: S, statistics: &mut Statistics) -> Result<WriteResult> {
        if self.commit_ts < self.lock_ts {
            return Err(ErrorInner::InvalidTxnTso {
                start_ts: self.lock_ts,
                commit_ts: self.commit_ts,
            }
            .into());
        }
        let Commit {
            ctx,
            keys,
            lock_ts,
            commit_ts,
        } = self;

        let rows = keys.len();
        let mut txn = MvccTxn::new(snapshot, lock_ts);
        for key in keys {
            txn.commit(key, commit_ts)?;
        }
        statistics.add(&txn.take_statistics());

        Ok(WriteResult {
            ctx,
            to_be_write: txn.into_modifies(),
            rows,
            pr: ProcessResult::Res,
        })
    }
}
