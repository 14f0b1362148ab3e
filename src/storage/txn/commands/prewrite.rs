// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

use std::fmt::{self, Display, Formatter};

use super::{CommandExt, WriteCommand, WriteResult};
use crate::storage::kv::{Snapshot, Statistics};
use crate::storage::mvcc::{
    Error as MvccError, ErrorInner as MvccErrorInner, MvccTxn, TimeStamp,
};
use crate::storage::txn::latch::{self, Latches};
use crate::storage::txn::{Error, ProcessResult, Result};
use crate::storage::types::Mutation;
use crate::storage::{Context, Error as StorageError};

/// The first phase of two-phase commit: lock every mutated key and stage
/// the new values under the transaction's start timestamp.
pub struct Prewrite {
    ctx: Context,
    mutations: Vec<Mutation>,
    primary: Vec<u8>,
    start_ts: TimeStamp,
    lock_ttl: u64,
}

impl Prewrite {
    pub fn new(
        mutations: Vec<Mutation>,
        primary: Vec<u8>,
        start_ts: TimeStamp,
        lock_ttl: u64,
        ctx: Context,
    ) -> Prewrite {
        Prewrite {
            ctx,
            mutations,
            primary,
            start_ts,
            lock_ttl,
        }
    }
}

impl Display for Prewrite {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "kv::command::prewrite mutations({}) @ {} | {:?}",
            self.mutations.len(),
            self.start_ts,
            self.ctx
        )
    }
}

impl CommandExt for Prewrite {
    fn tag(&self) -> &'static str {
        "prewrite"
    }

    fn get_ctx(&self) -> &Context {
        &self.ctx
    }

    fn ts(&self) -> TimeStamp {
        self.start_ts
    }

    fn write_bytes(&self) -> usize {
        let mut bytes = 0;
        for m in &self.mutations {
            match m {
                Mutation::Put((ref key, ref value)) => {
                    bytes += key.len();
                    bytes += value.len();
                }
                Mutation::Delete(ref key) => {
                    bytes += key.len();
                }
            }
        }
        bytes
    }

    fn gen_lock(&self, latches: &Latches) -> latch::Lock {
        let keys: Vec<_> = self.mutations.iter().map(|m| m.key()).collect();
        latches.gen_lock(&keys)
    }
}

/// Whether the error concerns a single key and should be collected into the
/// response instead of failing the whole command.
fn is_key_error(err: &MvccError) -> bool {
    match &*err.0 {
        MvccErrorInner::KeyIsLocked(_)
        | MvccErrorInner::WriteConflict { .. }
        | MvccErrorInner::Abort(_) => true,
        _ => false,
    }
}

impl<S: Snapshot> WriteCommand<S> for Prewrite {
    fn process_write(self, snapshot: S, statistics: &mut Statistics) -> Result<WriteResult> {
        let Prewrite {
            ctx,
            mutations,
            primary,
            start_ts,
            lock_ttl,
        } = self;

        let rows = mutations.len();
        let mut txn = MvccTxn::new(snapshot, start_ts);
        let mut locks = vec![];
        for m in mutations {
            match txn.prewrite(m, &primary, lock_ttl) {
                Ok(()) => {}
                Err(e) => {
                    if is_key_error(&e) {
                        locks.push(Err(StorageError::from(Error::from(e))));
                    } else {
                        return Err(Error::from(e));
                    }
                }
            }
        }
        statistics.add(&txn.take_statistics());

        if locks.is_empty() {
            Ok(WriteResult {
                ctx,
                to_be_write: txn.into_modifies(),
                rows,
                pr: ProcessResult::MultiRes { results: vec![] },
            })
        } else {
            // Skip the write stage; the response carries the key errors.
            Ok(WriteResult {
                ctx,
                to_be_write: vec![],
                rows: 0,
                pr: ProcessResult::MultiRes { results: locks },
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::kv::{BTreeEngine, Engine};
    use crate::storage::mvcc::txn::tests::{must_commit, must_get, must_prewrite_put};
    use crate::storage::types::Key;

    fn must_process(engine: &BTreeEngine, cmd: Prewrite) -> WriteResult {
        let snapshot = engine.snapshot(&Context::default()).unwrap();
        let mut statistics = Statistics::default();
        cmd.process_write(snapshot, &mut statistics).unwrap()
    }

    #[test]
    fn test_prewrite_stages_locks_and_values() {
        let engine = BTreeEngine::default();
        let cmd = Prewrite::new(
            vec![
                Mutation::Put((Key::from_raw(b"k1"), b"v1".to_vec())),
                Mutation::Delete(Key::from_raw(b"k2")),
            ],
            b"k1".to_vec(),
            5.into(),
            10,
            Context::default(),
        );
        let result = must_process(&engine, cmd);
        match result.pr {
            ProcessResult::MultiRes { ref results } => assert!(results.is_empty()),
            _ => panic!("expect multi res"),
        }
        // Two locks plus one staged value; the delete stages no value.
        assert_eq!(result.to_be_write.len(), 3);
        assert_eq!(result.rows, 2);

        engine.write(&Context::default(), result.to_be_write).unwrap();
        must_commit(&engine, b"k1", 5, 6);
        must_get(&engine, b"k1", 7, b"v1");
    }

    #[test]
    fn test_prewrite_collects_key_errors() {
        let engine = BTreeEngine::default();
        must_prewrite_put(&engine, b"k1", b"x", b"k1", 4);

        // k1 is locked by transaction 4; k2 is free. The response carries
        // one key error and nothing is staged.
        let cmd = Prewrite::new(
            vec![
                Mutation::Put((Key::from_raw(b"k1"), b"v1".to_vec())),
                Mutation::Put((Key::from_raw(b"k2"), b"v2".to_vec())),
            ],
            b"k1".to_vec(),
            5.into(),
            10,
            Context::default(),
        );
        let result = must_process(&engine, cmd);
        match result.pr {
            ProcessResult::MultiRes { ref results } => {
                assert_eq!(results.len(), 1);
                assert!(results[0].is_err());
            }
            _ => panic!("expect multi res"),
        }
        assert!(result.to_be_write.is_empty());
    }

    #[test]
    fn test_prewrite_latch_declaration() {
        let latches = Latches::new(256);
        let cmd = Prewrite::new(
            vec![
                Mutation::Put((Key::from_raw(b"k1"), b"v1".to_vec())),
                Mutation::Put((Key::from_raw(b"k1"), b"v1".to_vec())),
                Mutation::Delete(Key::from_raw(b"k2")),
            ],
            b"k1".to_vec(),
            5.into(),
            10,
            Context::default(),
        );
        let lock = cmd.gen_lock(&latches);
        assert!(lock.is_write_lock());
        assert!(lock.required_slots.len() <= 2);
        assert!(cmd.write_bytes() > 0);
    }
}
