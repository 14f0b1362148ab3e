// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

use std::fmt::{self, Display, Formatter};

use super::{CommandExt, WriteCommand, WriteResult};
use crate::storage::kv::{Snapshot, Statistics};
use crate::storage::mvcc::{MvccTxn, TimeStamp};
use crate::storage::txn::latch::{self, Latches};
use crate::storage::txn::{ProcessResult, Result};
use crate::storage::types::Key;
use crate::storage::Context;

/// Aborts a transaction on the given keys, releasing its locks and pinning
/// the abort with rollback records.
pub struct Rollback {
    ctx: Context,
    keys: Vec<Key>,
    start_ts: TimeStamp,
}

impl Rollback {
    pub fn new(keys: Vec<Key>, start_ts: TimeStamp, ctx: Context) -> Rollback {
        Rollback {
            ctx,
            keys,
            start_ts,
        }
    }
}

impl Display for Rollback {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "kv::command::rollback keys({}) @ {} | {:?}",
            self.keys.len(),
            self.start_ts,
            self.ctx
        )
    }
}

impl CommandExt for Rollback {
    fn tag(&self) -> &'static str {
        "rollback"
    }

    fn get_ctx(&self) -> &Context {
        &self.ctx
    }

    fn ts(&self) -> TimeStamp {
        self.start_ts
    }

    fn write_bytes(&self) -> usize {
        self.keys.iter().map(|k| k.len()).sum()
    }

    fn gen_lock(&self, latches: &Latches) -> latch::Lock {
        latches.gen_lock(&self.keys)
    }
}

impl<S: Snapshot> WriteCommand<S> for Rollback {
    fn process_write(self, snapshot: S, statistics: &mut Statistics) -> Result<WriteResult> {
        let Rollback {
            ctx,
            keys,
            start_ts,
        } = self;

        let rows = keys.len();
        let mut txn = MvccTxn::new(snapshot, start_ts);
        for key in keys {
            txn.rollback(key)?;
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
