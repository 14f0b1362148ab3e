// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

//! Commands used in the transaction system.
//!
//! Each incoming request becomes one command value. A command declares the
//! keys it will write (`gen_lock`), runs against a snapshot on a scheduler
//! worker, and returns its staged mutations plus a `ProcessResult` for the
//! caller. Read-only commands skip latching entirely.

pub(crate) mod check_txn_status;
pub(crate) mod commit;
pub(crate) mod get;
pub(crate) mod prewrite;
pub(crate) mod resolve_lock;
pub(crate) mod resolve_lock_readphase;
pub(crate) mod rollback;

pub use self::check_txn_status::CheckTxnStatus;
pub use self::commit::Commit;
pub use self::get::Get;
pub use self::prewrite::Prewrite;
pub use self::resolve_lock::ResolveLock;
pub use self::resolve_lock_readphase::{ResolveLockReadPhase, RESOLVE_LOCK_BATCH_SIZE};
pub use self::rollback::Rollback;

use std::fmt::{self, Debug, Display, Formatter};

use crate::storage::kv::{Modify, Snapshot, Statistics};
use crate::storage::mvcc::TimeStamp;
use crate::storage::txn::latch::{self, Latches};
use crate::storage::txn::{ProcessResult, Result};
use crate::storage::Context;

/// The capability set shared by all commands.
pub trait CommandExt: Display + Send + 'static {
    fn tag(&self) -> &'static str;

    fn get_ctx(&self) -> &Context;

    /// The timestamp this command acts at, for logging and metrics.
    fn ts(&self) -> TimeStamp {
        TimeStamp::zero()
    }

    fn readonly(&self) -> bool {
        false
    }

    /// An estimate of the bytes this command will write, for flow control.
    fn write_bytes(&self) -> usize {
        0
    }

    /// The latch slots this command must hold. Read-only commands keep the
    /// default empty lock and run without queueing.
    fn gen_lock(&self, _latches: &Latches) -> latch::Lock {
        latch::Lock::new(vec![])
    }
}

/// What a write command produced: the mutation batch to be flushed and the
/// result to report once the flush lands.
#[derive(Debug)]
pub struct WriteResult {
    pub ctx: Context,
    pub to_be_write: Vec<Modify>,
    pub rows: usize,
    pub pr: ProcessResult,
}

/// Commands that do not modify the database.
pub trait ReadCommand<S: Snapshot>: CommandExt {
    fn process_read(self, snapshot: S, statistics: &mut Statistics) -> Result<ProcessResult>;
}

/// Commands that stage mutations to be applied atomically.
pub trait WriteCommand<S: Snapshot>: CommandExt {
    fn process_write(self, snapshot: S, statistics: &mut Statistics) -> Result<WriteResult>;
}

pub enum Command {
    Get(Get),
    Prewrite(Prewrite),
    Commit(Commit),
    Rollback(Rollback),
    CheckTxnStatus(CheckTxnStatus),
    ResolveLockReadPhase(ResolveLockReadPhase),
    ResolveLock(ResolveLock),
}

impl Command {
    fn command_ext(&self) -> &dyn CommandExt {
        match self {
            Command::Get(t) => t,
            Command::Prewrite(t) => t,
            Command::Commit(t) => t,
            Command::Rollback(t) => t,
            Command::CheckTxnStatus(t) => t,
            Command::ResolveLockReadPhase(t) => t,
            Command::ResolveLock(t) => t,
        }
    }

    pub(crate) fn process_read<S: Snapshot>(
        self,
        snapshot: S,
        statistics: &mut Statistics,
    ) -> Result<ProcessResult> {
        match self {
            Command::Get(t) => t.process_read(snapshot, statistics),
            Command::ResolveLockReadPhase(t) => t.process_read(snapshot, statistics),
            _ => panic!("unsupported read command"),
        }
    }

    pub(crate) fn process_write<S: Snapshot>(
        self,
        snapshot: S,
        statistics: &mut Statistics,
    ) -> Result<WriteResult> {
        match self {
            Command::Prewrite(t) => t.process_write(snapshot, statistics),
            Command::Commit(t) => t.process_write(snapshot, statistics),
            Command::Rollback(t) => t.process_write(snapshot, statistics),
            Command::CheckTxnStatus(t) => t.process_write(snapshot, statistics),
            Command::ResolveLock(t) => t.process_write(snapshot, statistics),
            _ => panic!("unsupported write command"),
        }
    }

    pub fn readonly(&self) -> bool {
        self.command_ext().readonly()
    }

    pub fn tag(&self) -> &'static str {
        self.command_ext().tag()
    }

    pub fn ts(&self) -> TimeStamp {
        self.command_ext().ts()
    }

    pub fn write_bytes(&self) -> usize {
        self.command_ext().write_bytes()
    }

    pub fn gen_lock(&self, latches: &Latches) -> latch::Lock {
        self.command_ext().gen_lock(latches)
    }

    pub fn ctx(&self) -> &Context {
        self.command_ext().get_ctx()
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.command_ext().fmt(f)
    }
}

impl Debug for Command {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.command_ext().fmt(f)
    }
}
