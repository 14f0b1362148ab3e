// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

//! Multi-version concurrency control over the ordered engine.
//!
//! Every user key is spread over three column families:
//!
//! * `default`: `(key, start_ts) -> value`, the payload written by a
//!   transaction.
//! * `lock`: `key -> Lock`, at most one in-flight reservation per key.
//! * `write`: `(key, commit_ts) -> Write`, the commit log of the key.

mod lock;
mod reader;
mod timestamp;
pub mod txn;
mod write;

pub use self::lock::{Lock, LockInfo, LockType};
pub use self::reader::MvccReader;
pub use self::timestamp::TimeStamp;
pub use self::txn::MvccTxn;
pub use self::write::{Write, WriteType};

use crate::storage::kv;
use crate::util::codec;
use crate::util::escape;

/// Resolving locks writes roughly 100~150 bytes per key; a batch of this
/// size keeps a single mutation batch around 32KB.
pub const MAX_TXN_WRITE_SIZE: usize = 32 * 1024;

quick_error! {
    #[derive(Debug)]
    pub enum ErrorInner {
        Engine(err: kv::Error) {
            from()
            cause(err)
            display("engine error: {}", err)
        }
        Codec(err: codec::Error) {
            from()
            cause(err)
            display("codec error: {}", err)
        }
        KeyIsLocked(info: LockInfo) {
            display("key is locked (backoff or cleanup) {:?}", info)
        }
        WriteConflict { start_ts: TimeStamp, conflict_start_ts: TimeStamp, conflict_commit_ts: TimeStamp, key: Vec<u8>, primary: Vec<u8> } {
            display(
                "write conflict, start_ts: {}, conflict_start_ts: {}, conflict_commit_ts: {}, key: {}, primary: {}",
                start_ts, conflict_start_ts, conflict_commit_ts, escape(key), escape(primary)
            )
        }
        TxnLockNotFound { start_ts: TimeStamp, commit_ts: TimeStamp, key: Vec<u8> } {
            display("txn lock not found {}-{} key: {}", start_ts, commit_ts, escape(key))
        }
        Committed { commit_ts: TimeStamp } {
            display("txn already committed, commit_ts: {}", commit_ts)
        }
        Abort(reason: String) {
            display("transaction aborted {}", reason)
        }
        DefaultNotFound { key: Vec<u8> } {
            display("default value not found for key {}", escape(key))
        }
        BadFormatLock {
            display("bad format lock data")
        }
        BadFormatWrite {
            display("bad format write data")
        }
    }
}

impl ErrorInner {
    pub fn maybe_clone(&self) -> Option<ErrorInner> {
        match self {
            ErrorInner::KeyIsLocked(info) => Some(ErrorInner::KeyIsLocked(info.clone())),
            ErrorInner::WriteConflict {
                start_ts,
                conflict_start_ts,
                conflict_commit_ts,
                key,
                primary,
            } => Some(ErrorInner::WriteConflict {
                start_ts: *start_ts,
                conflict_start_ts: *conflict_start_ts,
                conflict_commit_ts: *conflict_commit_ts,
                key: key.clone(),
                primary: primary.clone(),
            }),
            ErrorInner::TxnLockNotFound {
                start_ts,
                commit_ts,
                key,
            } => Some(ErrorInner::TxnLockNotFound {
                start_ts: *start_ts,
                commit_ts: *commit_ts,
                key: key.clone(),
            }),
            ErrorInner::Committed { commit_ts } => Some(ErrorInner::Committed {
                commit_ts: *commit_ts,
            }),
            ErrorInner::Abort(reason) => Some(ErrorInner::Abort(reason.clone())),
            ErrorInner::DefaultNotFound { key } => {
                Some(ErrorInner::DefaultNotFound { key: key.clone() })
            }
            ErrorInner::BadFormatLock => Some(ErrorInner::BadFormatLock),
            ErrorInner::BadFormatWrite => Some(ErrorInner::BadFormatWrite),
            ErrorInner::Engine(e) => e.maybe_clone().map(ErrorInner::Engine),
            ErrorInner::Codec(_) => None,
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

impl From<codec::Error> for Error {
    #[inline]
    fn from(e: codec::Error) -> Self {
        Error(Box::new(ErrorInner::Codec(e)))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
