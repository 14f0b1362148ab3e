// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

use std::fmt::{self, Display, Formatter};

use super::{CommandExt, WriteCommand, WriteResult};
use crate::storage::kv::{Snapshot, Statistics};
use crate::storage::mvcc::{MvccTxn, TimeStamp};
use crate::storage::txn::latch::{self, Latches};
use crate::storage::txn::{ProcessResult, Result};
use crate::storage::types::Key;
use crate::storage::Context;

/// Examines the primary lock of a transaction and resolves it if it is
/// dead: an expired lock is rolled back, a missing lock gets a protective
/// rollback record. The caller learns whether the transaction is alive,
/// committed or rolled back.
pub struct CheckTxnStatus {
    ctx: Context,
    primary_key: Key,
    /// The start timestamp of the transaction being checked.
    lock_ts: TimeStamp,
    /// The oracle's current timestamp, driving TTL expiry.
    current_ts: TimeStamp,
}

impl CheckTxnStatus {
    pub fn new(
        primary_key: Key,
        lock_ts: TimeStamp,
        current_ts: TimeStamp,
        ctx: Context,
    ) -> CheckTxnStatus {
        CheckTxnStatus {
            ctx,
            primary_key,
            lock_ts,
            current_ts,
        }
    }
}

impl Display for CheckTxnStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "kv::command::check_txn_status {} @ {} curr({}) | {:?}",
            self.primary_key, self.lock_ts, self.current_ts, self.ctx
        )
    }
}

impl CommandExt for CheckTxnStatus {
    fn tag(&self) -> &'static str {
        "check_txn_status"
    }

    fn get_ctx(&self) -> &Context {
        &self.ctx
    }

    fn ts(&self) -> TimeStamp {
        self.lock_ts
    }

    fn write_bytes(&self) -> usize {
        self.primary_key.len()
    }

    fn gen_lock(&self, latches: &Latches) -> latch::Lock {
        latches.gen_lock(&[&self.primary_key])
    }
}

impl<S: Snapshot> WriteCommand<S> for CheckTxnStatus {
    fn process_write(self, snapshot: S, statistics: &mut Statistics) -> Result<WriteResult> {
        let CheckTxnStatus {
            ctx,
            primary_key,
            lock_ts,
            current_ts,
        } = self;

        let mut txn = MvccTxn::new(snapshot, lock_ts);
        let txn_status = txn.check_txn_status(primary_key, current_ts)?;
        statistics.add(&txn.take_statistics());

        Ok(WriteResult {
            ctx,
            to_be_write: txn.into_modifies(),
            rows: 1,
            pr: ProcessResult::TxnStatus { txn_status },
        })
    }
}
