// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

use std::fmt::{self, Display, Formatter};

use super::{CommandExt, ReadCommand};
use crate::storage::kv::{Snapshot, Statistics};
use crate::storage::mvcc::{MvccReader, TimeStamp};
use crate::storage::txn::{ProcessResult, Result};
use crate::storage::types::Key;
use crate::storage::Context;

/// A snapshot read of one key at one timestamp.
///
/// Runs without latches: the engine snapshot already guarantees it cannot
/// observe a half-applied command batch.
pub struct Get {
    ctx: Context,
    key: Key,
    start_ts: TimeStamp,
}

impl Get {
    pub fn new(key: Key, start_ts: TimeStamp, ctx: Context) -> Get {
        Get { ctx, key, start_ts }
    }
}

impl Display for Get {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "kv::command::get {} @ {} | {:?}",
            self.key, self.start_ts, self.ctx
        )
    }
}

impl CommandExt for Get {
    fn tag(&self) -> &'static str {
        "get"
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

impl<S: Snapshot> ReadCommand<S> for Get {
    fn process_read(self, snapshot: S, statistics: &mut Statistics) -> Result<ProcessResult> {
        let mut reader = MvccReader::new(snapshot);
        let result = reader.get(&self.key, self.start_ts);
        reader.collect_statistics_into(statistics);
        let value = result?;
        Ok(ProcessResult::Value { value })
    }
}
