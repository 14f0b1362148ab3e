// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

//! Scheduling and execution of transactional commands.

pub mod commands;
pub mod latch;
mod sched_pool;
mod scheduler;

pub use self::commands::{Command, WriteResult};
pub use self::scheduler::Scheduler;

use crate::storage::mvcc::{self, TimeStamp};
use crate::storage::types::{TxnStatus, Value};
use crate::storage::{kv, Error as StorageError};

/// The outcome a finished command hands to the storage callback.
#[derive(Debug)]
pub enum ProcessResult {
    Res,
    MultiRes {
        results: Vec<crate::storage::Result<()>>,
    },
    Value {
        value: Option<Value>,
    },
    TxnStatus {
        txn_status: TxnStatus,
    },
    NextCommand {
        cmd: Command,
    },
    Failed {
        err: StorageError,
    },
}

quick_error! {
    #[derive(Debug)]
    pub enum ErrorInner {
        Engine(err: kv::Error) {
            from()
            cause(err)
            display("engine error: {}", err)
        }
        Mvcc(err: mvcc::Error) {
            from()
            cause(err)
            display("mvcc error: {}", err)
        }
        InvalidTxnTso { start_ts: TimeStamp, commit_ts: TimeStamp } {
            display("invalid transaction tso with start_ts: {}, commit_ts: {}", start_ts, commit_ts)
        }
    }
}

impl ErrorInner {
    pub fn maybe_clone(&self) -> Option<ErrorInner> {
        match self {
            ErrorInner::Engine(e) => e.maybe_clone().map(ErrorInner::Engine),
            ErrorInner::Mvcc(e) => e.maybe_clone().map(ErrorInner::Mvcc),
            ErrorInner::InvalidTxnTso {
                start_ts,
                commit_ts,
            } => Some(ErrorInner::InvalidTxnTso {
                start_ts: *start_ts,
                commit_ts: *commit_ts,
            }),
        }
    }
}

pub struct Error(pub Box<ErrorInner>);

impl Error {
    pub fn maybe_clone(&self) -> Option<Error> {
        self.0.maybe_clone().map(Error::from)
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.0, f)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&*self.0)
    }
}

impl From<ErrorInner> for Error {
    #[inline]
    fn from(e: ErrorInner) -> Self {
        Error(Box::new(e))
    }
}

impl From<kv::Error> for Error {
    #[inline]
    fn from(e: kv::Error) -> Self {
        Error(Box::new(ErrorInner::Engine(e)))
    }
}

impl From<mvcc::Error> for Error {
    #[inline]
    fn from(e: mvcc::Error) -> Self {
        Error(Box::new(ErrorInner::Mvcc(e)))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
