// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

//! txnkv - a transactional key-value coordinator
//!
//! txnkv implements the coordinator side of a Percolator-style two-phase
//! commit protocol on top of a multi-version ordered key-value engine.
//! Client commands (`Get`, `Prewrite`, `Commit`, `Rollback`,
//! `CheckTxnStatus`, `ResolveLock`) are serialized per key by an in-memory
//! latch table, executed against a consistent engine snapshot, and flushed
//! as one atomic mutation batch.
//!
//! The crate follows the classic layering of a transactional store:
//!
//! * [`storage::kv`] - the ordered engine contract (point get, scan,
//!   atomic batch write) and an in-memory B-tree implementation.
//! * [`storage::mvcc`] - the record formats of the `lock`/`write`/`default`
//!   column families and the transactional read/write primitives.
//! * [`storage::txn`] - latches, the command scheduler and the command
//!   implementations.

#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;
#[macro_use]
extern crate prometheus;
#[macro_use]
extern crate quick_error;

pub mod storage;
pub mod util;
