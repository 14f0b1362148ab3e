// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

//! The storage front end.
//!
//! [`Storage`] turns typed transactional requests into scheduler commands
//! and delivers their results through callbacks. It is the seam the RPC
//! layer calls into; everything below it (latches, MVCC, the engine) is
//! internal.

pub mod config;
pub mod kv;
mod metrics;
pub mod mvcc;
pub mod txn;
pub mod types;

use std::fmt::{self, Debug, Display, Formatter};

pub use self::config::Config;
pub use self::kv::{BTreeEngine, Engine, Modify, Snapshot, Statistics};
pub use self::mvcc::TimeStamp;
pub use self::txn::{Command, Scheduler};
pub use self::types::{Action, Key, Mutation, TxnStatus, Value};

pub type CfName = &'static str;
pub const CF_DEFAULT: CfName = "default";
pub const CF_LOCK: CfName = "lock";
pub const CF_WRITE: CfName = "write";
pub const ALL_CFS: &[CfName] = &[CF_DEFAULT, CF_LOCK, CF_WRITE];

pub type Callback<T> = Box<dyn FnOnce(Result<T>) + Send>;

/// Request context handed through from the protocol layer. Region routing
/// and replication live outside this crate, so only the fields useful for
/// diagnostics are kept.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Context {
    pub region_id: u64,
}

/// The callback of a scheduled command, tagged by its response shape.
pub enum StorageCb {
    Boolean(Callback<()>),
    Booleans(Callback<Vec<Result<()>>>),
    SingleValue(Callback<Option<Value>>),
    TxnStatus(Callback<TxnStatus>),
}

/// The transactional storage facade over an engine.
pub struct Storage<E: Engine> {
    engine: E,
    sched: Scheduler<E>,
}

impl Storage<BTreeEngine> {
    /// Creates a storage over a fresh in-memory engine.
    pub fn new(config: &Config) -> Result<Storage<BTreeEngine>> {
        Storage::from_engine(BTreeEngine::default(), config)
    }
}

impl<E: Engine> Storage<E> {
    pub fn from_engine(engine: E, config: &Config) -> Result<Storage<E>> {
        config
            .validate()
            .map_err(ErrorInner::InvalidConfig)?;
        let sched = Scheduler::new(engine.clone(), config);
        info!("storage {:?} started", engine);
        Ok(Storage { engine, sched })
    }

    pub fn get_engine(&self) -> E {
        self.engine.clone()
    }

    /// Stops the scheduler, draining commands already queued. Commands
    /// submitted afterwards are silently dropped.
    pub fn stop(&mut self) -> Result<()> {
        self.sched.shutdown();
        info!("storage {:?} closed", self.engine);
        Ok(())
    }

    /// Reads the value of `key` visible at `start_ts`.
    pub fn async_get(
        &self,
        ctx: Context,
        key: Key,
        start_ts: TimeStamp,
        callback: Callback<Option<Value>>,
    ) -> Result<()> {
        let cmd = txn::commands::Get::new(key, start_ts, ctx);
        self.sched
            .run_cmd(Command::Get(cmd), StorageCb::SingleValue(callback));
        Ok(())
    }

    /// The first phase of two-phase commit: locks the mutated keys.
    /// Per-key failures come back in the callback's `Vec`; an empty vec
    /// means every key was locked.
    pub fn async_prewrite(
        &self,
        ctx: Context,
        mutations: Vec<Mutation>,
        primary: Vec<u8>,
        start_ts: TimeStamp,
        lock_ttl: u64,
        callback: Callback<Vec<Result<()>>>,
    ) -> Result<()> {
        let cmd = txn::commands::Prewrite::new(mutations, primary, start_ts, lock_ttl, ctx);
        self.sched
            .run_cmd(Command::Prewrite(cmd), StorageCb::Booleans(callback));
        Ok(())
    }

    /// The second phase of two-phase commit.
    pub fn async_commit(
        &self,
        ctx: Context,
        keys: Vec<Key>,
        start_ts: TimeStamp,
        commit_ts: TimeStamp,
        callback: Callback<()>,
    ) -> Result<()> {
        let cmd = txn::commands::Commit::new(keys, start_ts, commit_ts, ctx);
        self.sched
            .run_cmd(Command::Commit(cmd), StorageCb::Boolean(callback));
        Ok(())
    }

    /// Aborts a transaction on the given keys.
    pub fn async_rollback(
        &self,
        ctx: Context,
        keys: Vec<Key>,
        start_ts: TimeStamp,
        callback: Callback<()>,
    ) -> Result<()> {
        let cmd = txn::commands::Rollback::new(keys, start_ts, ctx);
        self.sched
            .run_cmd(Command::Rollback(cmd), StorageCb::Boolean(callback));
        Ok(())
    }

    /// Inspects (and possibly resolves) the primary lock of a transaction.
    pub fn async_check_txn_status(
        &self,
        ctx: Context,
        primary_key: Key,
        lock_ts: TimeStamp,
        current_ts: TimeStamp,
        callback: Callback<TxnStatus>,
    ) -> Result<()> {
        let cmd = txn::commands::CheckTxnStatus::new(primary_key, lock_ts, current_ts, ctx);
        self.sched
            .run_cmd(Command::CheckTxnStatus(cmd), StorageCb::TxnStatus(callback));
        Ok(())
    }

    /// Commits (commit_ts > 0) or rolls back (commit_ts == 0) every lock
    /// left behind by the given transaction.
    pub fn async_resolve_lock(
        &self,
        ctx: Context,
        start_ts: TimeStamp,
        commit_ts: TimeStamp,
        callback: Callback<()>,
    ) -> Result<()> {
        let cmd = txn::commands::ResolveLockReadPhase::new(start_ts, commit_ts, None, ctx);
        self.sched.run_cmd(
            Command::ResolveLockReadPhase(cmd),
            StorageCb::Boolean(callback),
        );
        Ok(())
    }
}

quick_error! {
    #[derive(Debug)]
    pub enum ErrorInner {
        Engine(err: kv::Error) {
            from()
            cause(err)
            display("engine error: {}", err)
        }
        Txn(err: txn::Error) {
            from()
            cause(err)
            display("{}", err)
        }
        SchedTooBusy {
            display("scheduler is too busy")
        }
        InvalidConfig(desc: String) {
            display("invalid config: {}", desc)
        }
    }
}

pub struct Error(pub Box<ErrorInner>);

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
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

impl From<txn::Error> for Error {
    #[inline]
    fn from(e: txn::Error) -> Self {
        Error(Box::new(ErrorInner::Txn(e)))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
