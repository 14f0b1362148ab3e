// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

use super::lock::{Lock, LockType};
use super::reader::MvccReader;
use super::timestamp::TimeStamp;
use super::write::{Write, WriteType};
use super::{ErrorInner, Result};
use crate::storage::kv::{Modify, Snapshot, Statistics};
use crate::storage::types::{Action, Key, Mutation, TxnStatus, Value};
use crate::storage::{CF_DEFAULT, CF_LOCK, CF_WRITE};
use crate::util::escape;

/// A transactional command execution context.
///
/// `MvccTxn` reads through an `MvccReader` over the command's snapshot and
/// stages its mutations in memory. Nothing is visible to other commands
/// until the scheduler flushes `into_modifies()` to the engine as one
/// atomic batch; a command that errors simply drops the buffer.
pub struct MvccTxn<S: Snapshot> {
    reader: MvccReader<S>,
    start_ts: TimeStamp,
    writes: Vec<Modify>,
    write_size: usize,
}

impl<S: Snapshot> MvccTxn<S> {
    pub fn new(snapshot: S, start_ts: TimeStamp) -> MvccTxn<S> {
        MvccTxn {
            reader: MvccReader::new(snapshot),
            start_ts,
            writes: vec![],
            write_size: 0,
        }
    }

    pub fn start_ts(&self) -> TimeStamp {
        self.start_ts
    }

    pub fn into_modifies(self) -> Vec<Modify> {
        self.writes
    }

    /// The accumulated size of the staged mutations.
    pub fn write_size(&self) -> usize {
        self.write_size
    }

    pub fn take_statistics(&mut self) -> Statistics {
        let mut statistics = Statistics::default();
        self.reader.collect_statistics_into(&mut statistics);
        statistics
    }

    fn push(&mut self, modify: Modify) {
        self.write_size += modify.size();
        self.writes.push(modify);
    }

    fn put_lock(&mut self, key: Key, lock: &Lock) {
        self.push(Modify::Put(CF_LOCK, key, lock.to_bytes()));
    }

    fn unlock_key(&mut self, key: Key) {
        self.push(Modify::Delete(CF_LOCK, key));
    }

    fn put_value(&mut self, key: Key, value: Value) {
        self.push(Modify::Put(CF_DEFAULT, key.append_ts(self.start_ts), value));
    }

    fn delete_value(&mut self, key: Key) {
        self.push(Modify::Delete(CF_DEFAULT, key.append_ts(self.start_ts)));
    }

    fn put_write(&mut self, key: Key, commit_ts: TimeStamp, write: Write) {
        self.push(Modify::Put(
            CF_WRITE,
            key.append_ts(commit_ts),
            write.to_bytes(),
        ));
    }

    /// Locks one mutated key and stages its value.
    ///
    /// The conflict window of snapshot isolation is checked here: any commit
    /// after our start timestamp kills the transaction, and a rollback
    /// record under our own timestamp means a previous incarnation of this
    /// transaction was already aborted.
    pub fn prewrite(&mut self, mutation: Mutation, primary: &[u8], lock_ttl: u64) -> Result<()> {
        let lock_type = LockType::from_mutation(&mutation);
        let (key, value) = mutation.into_key_value();

        if let Some((commit_ts, write)) = self.reader.most_recent_write(&key)? {
            if commit_ts > self.start_ts && write.write_type != WriteType::Rollback {
                return Err(ErrorInner::WriteConflict {
                    start_ts: self.start_ts,
                    conflict_start_ts: write.start_ts,
                    conflict_commit_ts: commit_ts,
                    key: key.to_raw()?,
                    primary: primary.to_vec(),
                }
                .into());
            }
        }

        if let Some(lock) = self.reader.load_lock(&key)? {
            if lock.ts != self.start_ts {
                return Err(ErrorInner::KeyIsLocked(lock.into_lock_info(key.to_raw()?)).into());
            }
            // A retry of our own prewrite; the lock and value were already
            // written by the first attempt.
            return Ok(());
        }

        if let Some((_, write)) = self.reader.get_txn_commit_record(&key, self.start_ts)? {
            if write.write_type == WriteType::Rollback {
                return Err(ErrorInner::Abort(format!(
                    "already rolled back, key: {}",
                    escape(&key.to_raw()?)
                ))
                .into());
            }
        }

        self.put_lock(
            key.clone(),
            &Lock::new(lock_type, primary.to_vec(), self.start_ts, lock_ttl),
        );
        if let Some(value) = value {
            self.put_value(key, value);
        }
        Ok(())
    }

    /// Turns the lock held by this transaction on `key` into a commit
    /// record at `commit_ts`. Without the lock, a commit record written by
    /// a retried command is accepted silently; anything else reports a
    /// retryable lock-not-found.
    pub fn commit(&mut self, key: Key, commit_ts: TimeStamp) -> Result<()> {
        match self.reader.load_lock(&key)? {
            Some(ref lock) if lock.ts == self.start_ts => {
                self.put_write(
                    key.clone(),
                    commit_ts,
                    Write::new(lock.write_type(), self.start_ts),
                );
                self.unlock_key(key);
                Ok(())
            }
            _ => match self.reader.get_txn_commit_record(&key, self.start_ts)? {
                // Committed by a concurrent or earlier retry of this
                // transaction.
                Some((_, write)) if write.write_type != WriteType::Rollback => Ok(()),
                _ => {
                    info!(
                        "txn conflict (lock not found), key: {:?}, start_ts: {}, commit_ts: {}",
                        key, self.start_ts, commit_ts
                    );
                    Err(ErrorInner::TxnLockNotFound {
                        start_ts: self.start_ts,
                        commit_ts,
                        key: key.into_raw()?,
                    }
                    .into())
                }
            },
        }
    }

    /// Aborts this transaction on `key` and leaves a rollback record so it
    /// can never be prewritten again at this timestamp.
    pub fn rollback(&mut self, key: Key) -> Result<()> {
        if let Some((commit_ts, write)) = self.reader.get_txn_commit_record(&key, self.start_ts)? {
            return match write.write_type {
                // Already rolled back; nothing to do.
                WriteType::Rollback => Ok(()),
                _ => Err(ErrorInner::Committed { commit_ts }.into()),
            };
        }
        match self.reader.load_lock(&key)? {
            Some(ref lock) if lock.ts == self.start_ts => {
                self.delete_value(key.clone());
                self.put_write(key.clone(), self.start_ts, Write::rollback(self.start_ts));
                self.unlock_key(key);
            }
            _ => {
                // No lock, or a lock of another transaction. The foreign
                // lock must stay, but the protective rollback record is
                // still written so a late prewrite at this start_ts fails.
                self.put_write(key, self.start_ts, Write::rollback(self.start_ts));
            }
        }
        Ok(())
    }

    /// Decides the fate of the transaction owning `primary_key`.
    ///
    /// The TTL comparison is done on the physical component only, as TTLs
    /// are expressed in milliseconds while ordering uses the full 64 bits.
    pub fn check_txn_status(
        &mut self,
        primary_key: Key,
        current_ts: TimeStamp,
    ) -> Result<TxnStatus> {
        match self.reader.load_lock(&primary_key)? {
            Some(ref lock) if lock.ts == self.start_ts => {
                if lock.ts.physical() + lock.ttl < current_ts.physical() {
                    info!(
                        "rolling back the primary lock as it's expired, key: {:?}, start_ts: {}, ttl: {}, current_ts: {}",
                        primary_key, self.start_ts, lock.ttl, current_ts
                    );
                    self.delete_value(primary_key.clone());
                    self.put_write(
                        primary_key.clone(),
                        self.start_ts,
                        Write::rollback(self.start_ts),
                    );
                    self.unlock_key(primary_key);
                    Ok(TxnStatus::rolled_back(Action::TtlExpireRollback))
                } else {
                    Ok(TxnStatus::uncommitted(lock.ttl))
                }
            }
            _ => match self.reader.get_txn_commit_record(&primary_key, self.start_ts)? {
                None => {
                    // The lock never existed (or its writer died before
                    // prewriting the primary). The protective rollback
                    // record stops stale prewrites from reviving it.
                    self.put_write(primary_key, self.start_ts, Write::rollback(self.start_ts));
                    Ok(TxnStatus::rolled_back(Action::LockNotExistRollback))
                }
                Some((_, write)) if write.write_type == WriteType::Rollback => {
                    Ok(TxnStatus::rolled_back(Action::NoAction))
                }
                Some((commit_ts, _)) => Ok(TxnStatus::committed(commit_ts)),
            },
        }
    }
}
