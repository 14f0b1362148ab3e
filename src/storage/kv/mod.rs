// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

//! The contract between the transaction layer and the underlying ordered
//! key-value engine: point gets, forward scans and atomic multi-key batch
//! writes over named column families. Replication, durability ordering and
//! region routing live behind this seam and are not modelled here.

use std::error;
use std::fmt::Debug;
use std::result;
use std::sync::mpsc;
use std::time::Duration;

use crate::storage::types::{Key, Value};
use crate::storage::{CfName, Context};

mod btree_engine;
mod cursor;
mod stats;

pub use self::btree_engine::{BTreeEngine, BTreeEngineIterator, BTreeEngineSnapshot};
pub use self::cursor::Cursor;
pub use self::stats::{CfStatistics, Statistics};

pub const SEEK_BOUND: usize = 8;
const DEFAULT_TIMEOUT_SECS: u64 = 5;

pub type Callback<T> = Box<dyn FnOnce(Result<T>) + Send>;
pub type Result<T> = result::Result<T, Error>;

/// A single mutation of the engine state.
#[derive(Debug, Clone, PartialEq)]
pub enum Modify {
    Delete(CfName, Key),
    Put(CfName, Key, Value),
}

impl Modify {
    pub fn size(&self) -> usize {
        match self {
            Modify::Delete(_, k) => k.len(),
            Modify::Put(_, k, v) => k.len() + v.len(),
        }
    }
}

/// An ordered key-value engine with atomic batch writes.
///
/// `async_write` must apply the whole batch atomically: a snapshot taken by
/// any reader observes either none or all of its mutations.
pub trait Engine: Send + Sync + Clone + Debug + 'static {
    type Snap: Snapshot;

    fn async_write(&self, ctx: &Context, batch: Vec<Modify>, callback: Callback<()>) -> Result<()>;
    fn async_snapshot(&self, ctx: &Context, callback: Callback<Self::Snap>) -> Result<()>;

    fn write(&self, ctx: &Context, batch: Vec<Modify>) -> Result<()> {
        let timeout = Duration::from_secs(DEFAULT_TIMEOUT_SECS);
        let (tx, rx) = mpsc::channel();
        self.async_write(
            ctx,
            batch,
            Box::new(move |res| {
                let _ = tx.send(res);
            }),
        )?;
        match rx.recv_timeout(timeout) {
            Ok(res) => res,
            Err(_) => Err(Error::Timeout(timeout)),
        }
    }

    fn snapshot(&self, ctx: &Context) -> Result<Self::Snap> {
        let timeout = Duration::from_secs(DEFAULT_TIMEOUT_SECS);
        let (tx, rx) = mpsc::channel();
        self.async_snapshot(
            ctx,
            Box::new(move |res| {
                let _ = tx.send(res);
            }),
        )?;
        match rx.recv_timeout(timeout) {
            Ok(res) => res,
            Err(_) => Err(Error::Timeout(timeout)),
        }
    }
}

/// A consistent, immutable view of the engine.
pub trait Snapshot: Send + Clone {
    type Iter: Iterator;

    fn get_cf(&self, cf: CfName, key: &Key) -> Result<Option<Value>>;
    fn iter_cf(&self, cf: CfName) -> Result<Self::Iter>;
}

/// A forward iterator over one column family of a snapshot.
pub trait Iterator: Send {
    /// Positions the iterator at the first entry with a key `>= key`.
    /// Returns whether such an entry exists.
    fn seek(&mut self, key: &Key) -> Result<bool>;
    fn seek_to_first(&mut self) -> bool;
    fn next(&mut self) -> bool;
    fn valid(&self) -> bool;

    /// Only valid to call while `valid()` holds.
    fn key(&self) -> &[u8];
    fn value(&self) -> &[u8];
}

quick_error! {
    #[derive(Debug)]
    pub enum Error {
        Timeout(d: Duration) {
            display("request timeout after {:?}", d)
        }
        EmptyBatch {
            display("an empty batch write")
        }
        Other(err: Box<dyn error::Error + Send + Sync>) {
            from()
            cause(err.as_ref())
            display("unknown error {:?}", err)
        }
    }
}

impl Error {
    pub fn maybe_clone(&self) -> Option<Error> {
        match self {
            Error::Timeout(d) => Some(Error::Timeout(*d)),
            Error::EmptyBatch => Some(Error::EmptyBatch),
            Error::Other(_) => None,
        }
    }
}
