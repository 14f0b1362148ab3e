// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

use super::lock::Lock;
use super::timestamp::TimeStamp;
use super::write::{Write, WriteType};
use super::{ErrorInner, Result};
use crate::storage::kv::{Cursor, Snapshot, Statistics};
use crate::storage::types::{Key, Value};
use crate::storage::{CF_DEFAULT, CF_LOCK, CF_WRITE};

/// Reads locks, write records and data versions from one engine snapshot.
///
/// The write column family keys its records by `(key, commit_ts)` with the
/// timestamp encoded descending, so a forward seek from `(key, ts)` lands on
/// the newest record whose `commit_ts <= ts`.
pub struct MvccReader<S: Snapshot> {
    snapshot: S,
    statistics: Statistics,
    // Cursors are created lazily and kept across lookups to turn repeated
    // seeks over nearby keys into cheap forward steps.
    write_cursor: Option<Cursor<S::Iter>>,
    lock_cursor: Option<Cursor<S::Iter>>,
}

impl<S: Snapshot> MvccReader<S> {
    pub fn new(snapshot: S) -> Self {
        Self {
            snapshot,
            statistics: Statistics::default(),
            write_cursor: None,
            lock_cursor: None,
        }
    }

    pub fn get_statistics(&self) -> &Statistics {
        &self.statistics
    }

    pub fn collect_statistics_into(&mut self, stats: &mut Statistics) {
        stats.add(&self.statistics);
        self.statistics = Statistics::default();
    }

    /// Loads the lock of `key`, if any.
    pub fn load_lock(&mut self, key: &Key) -> Result<Option<Lock>> {
        self.statistics.lock.get += 1;
        let res = match self.snapshot.get_cf(CF_LOCK, key)? {
            Some(v) => Some(Lock::parse(&v)?),
            None => None,
        };
        if res.is_some() {
            self.statistics.lock.processed += 1;
        }
        Ok(res)
    }

    /// Loads the value written by the transaction that started at
    /// `start_ts`, committed or not.
    pub fn load_data(&mut self, key: &Key, start_ts: TimeStamp) -> Result<Option<Value>> {
        self.statistics.data.get += 1;
        let data_key = key.clone().append_ts(start_ts);
        let res = self.snapshot.get_cf(CF_DEFAULT, &data_key)?;
        if res.is_some() {
            self.statistics.data.processed += 1;
        }
        Ok(res)
    }

    /// Returns the newest write record of `key` with `commit_ts <= ts`,
    /// together with its commit timestamp.
    pub fn seek_write(&mut self, key: &Key, ts: TimeStamp) -> Result<Option<(TimeStamp, Write)>> {
        if self.write_cursor.is_none() {
            let iter = self.snapshot.iter_cf(CF_WRITE)?;
            self.write_cursor = Some(Cursor::new(iter));
        }
        let cursor = self.write_cursor.as_mut().unwrap();
        let ok = cursor.near_seek(&key.clone().append_ts(ts), &mut self.statistics.write)?;
        if !ok {
            return Ok(None);
        }
        let write_key = cursor.key();
        if !Key::is_user_key_eq(write_key, key.as_encoded()) {
            return Ok(None);
        }
        let commit_ts = Key::split_on_ts_for(write_key)?.1;
        let write = Write::parse(cursor.value())?;
        self.statistics.write.processed += 1;
        Ok(Some((commit_ts, write)))
    }

    /// The highest-committed write record of `key`, of any kind.
    pub fn most_recent_write(&mut self, key: &Key) -> Result<Option<(TimeStamp, Write)>> {
        self.seek_write(key, TimeStamp::max())
    }

    /// The unique write record whose `start_ts` equals the given one, if
    /// any. This tells whether the transaction committed (Put/Delete) or
    /// was rolled back (Rollback) on this key.
    pub fn get_txn_commit_record(
        &mut self,
        key: &Key,
        start_ts: TimeStamp,
    ) -> Result<Option<(TimeStamp, Write)>> {
        let mut seek_ts = TimeStamp::max();
        while let Some((commit_ts, write)) = self.seek_write(key, seek_ts)? {
            if write.start_ts == start_ts {
                return Ok(Some((commit_ts, write)));
            }
            // Records are visited in decreasing commit_ts and every record
            // satisfies commit_ts >= its start_ts, so once we are at or
            // below start_ts there can be no match further down.
            if commit_ts <= start_ts {
                break;
            }
            seek_ts = commit_ts.prev();
        }
        Ok(None)
    }

    /// Errors out with `KeyIsLocked` if a lock visible to a reader at `ts`
    /// exists. A lock taken after `ts` does not block the reader.
    fn check_lock(&mut self, key: &Key, ts: TimeStamp) -> Result<()> {
        if let Some(lock) = self.load_lock(key)? {
            if lock.ts <= ts {
                return Err(ErrorInner::KeyIsLocked(lock.into_lock_info(key.to_raw()?)).into());
            }
        }
        Ok(())
    }

    /// Reads the value of `key` visible at `ts` under snapshot isolation.
    pub fn get(&mut self, key: &Key, ts: TimeStamp) -> Result<Option<Value>> {
        self.check_lock(key, ts)?;
        let mut seek_ts = ts;
        while let Some((commit_ts, write)) = self.seek_write(key, seek_ts)? {
            match write.write_type {
                WriteType::Put => {
                    return match self.load_data(key, write.start_ts)? {
                        Some(v) => Ok(Some(v)),
                        None => Err(ErrorInner::DefaultNotFound {
                            key: key.to_raw()?,
                        }
                        .into()),
                    };
                }
                WriteType::Delete => return Ok(None),
                WriteType::Rollback => {
                    if commit_ts.is_zero() {
                        break;
                    }
                    seek_ts = commit_ts.prev();
                }
            }
        }
        Ok(None)
    }

    /// Scans the lock column family from `start` (or the beginning) and
    /// returns up to `limit` locks passing `filter`, plus whether there may
    /// be more to scan.
    pub fn scan_locks<F>(
        &mut self,
        start: Option<&Key>,
        filter: F,
        limit: usize,
    ) -> Result<(Vec<(Key, Lock)>, bool)>
    where
        F: Fn(&Lock) -> bool,
    {
        if self.lock_cursor.is_none() {
            let iter = self.snapshot.iter_cf(CF_LOCK)?;
            self.lock_cursor = Some(Cursor::new(iter));
        }
        let cursor = self.lock_cursor.as_mut().unwrap();
        let ok = match start {
            Some(x) => cursor.seek(x, &mut self.statistics.lock)?,
            None => cursor.seek_to_first(&mut self.statistics.lock),
        };
        if !ok {
            return Ok((vec![], false));
        }
        let mut locks = Vec::with_capacity(limit);
        while cursor.valid() {
            let key = Key::from_encoded_slice(cursor.key());
            let lock = Lock::parse(cursor.value())?;
            if filter(&lock) {
                locks.push((key, lock));
                if limit > 0 && locks.len() == limit {
                    break;
                }
            }
            cursor.next(&mut self.statistics.lock);
        }
        self.statistics.lock.processed += locks.len();
        let has_remain = limit > 0 && locks.len() == limit;
        Ok((locks, has_remain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::kv::{BTreeEngine, Engine, Modify};
    use crate::storage::mvcc::lock::LockType;
    use crate::storage::Context;

    fn put_write(engine: &BTreeEngine, key: &[u8], commit_ts: u64, write: Write) {
        engine
            .write(
                &Context::default(),
                vec![Modify::Put(
                    CF_WRITE,
                    Key::from_raw(key).append_ts(commit_ts.into()),
                    write.to_bytes(),
                )],
            )
            .unwrap();
    }

    fn put_data(engine: &BTreeEngine, key: &[u8], start_ts: u64, value: &[u8]) {
        engine
            .write(
                &Context::default(),
                vec![Modify::Put(
                    CF_DEFAULT,
                    Key::from_raw(key).append_ts(start_ts.into()),
                    value.to_vec(),
                )],
            )
            .unwrap();
    }

    fn put_lock(engine: &BTreeEngine, key: &[u8], lock: &Lock) {
        engine
            .write(
                &Context::default(),
                vec![Modify::Put(CF_LOCK, Key::from_raw(key), lock.to_bytes())],
            )
            .unwrap();
    }

    fn new_reader(engine: &BTreeEngine) -> MvccReader<crate::storage::kv::BTreeEngineSnapshot> {
        MvccReader::new(engine.snapshot(&Context::default()).unwrap())
    }

    #[test]
    fn test_seek_write_orders_by_commit_ts() {
        let engine = BTreeEngine::default();
        put_write(&engine, b"k", 10, Write::new(WriteType::Put, 5.into()));
        put_write(&engine, b"k", 20, Write::new(WriteType::Delete, 15.into()));
        put_write(&engine, b"j", 30, Write::new(WriteType::Put, 25.into()));

        let mut reader = new_reader(&engine);
        let key = Key::from_raw(b"k");

        let (commit_ts, write) = reader.most_recent_write(&key).unwrap().unwrap();
        assert_eq!(commit_ts, 20.into());
        assert_eq!(write.write_type, WriteType::Delete);

        let (commit_ts, write) = reader.seek_write(&key, 19.into()).unwrap().unwrap();
        assert_eq!(commit_ts, 10.into());
        assert_eq!(write.start_ts, 5.into());

        assert!(reader.seek_write(&key, 9.into()).unwrap().is_none());
        // Records of other user keys must not leak in.
        assert!(reader
            .seek_write(&Key::from_raw(b"ka"), TimeStamp::max())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_get_txn_commit_record() {
        let engine = BTreeEngine::default();
        put_write(&engine, b"k", 10, Write::new(WriteType::Put, 5.into()));
        put_write(&engine, b"k", 15, Write::rollback(15.into()));
        put_write(&engine, b"k", 30, Write::new(WriteType::Put, 25.into()));

        let mut reader = new_reader(&engine);
        let key = Key::from_raw(b"k");

        let (commit_ts, write) = reader.get_txn_commit_record(&key, 5.into()).unwrap().unwrap();
        assert_eq!(commit_ts, 10.into());
        assert_eq!(write.write_type, WriteType::Put);

        let (commit_ts, write) = reader
            .get_txn_commit_record(&key, 15.into())
            .unwrap()
            .unwrap();
        assert_eq!(commit_ts, 15.into());
        assert_eq!(write.write_type, WriteType::Rollback);

        assert!(reader.get_txn_commit_record(&key, 7.into()).unwrap().is_none());
        assert!(reader
            .get_txn_commit_record(&key, 40.into())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_get_skips_rollback_records() {
        let engine = BTreeEngine::default();
        put_data(&engine, b"k", 5, b"value");
        put_write(&engine, b"k", 10, Write::new(WriteType::Put, 5.into()));
        put_write(&engine, b"k", 15, Write::rollback(15.into()));

        let mut reader = new_reader(&engine);
        let key = Key::from_raw(b"k");
        assert_eq!(reader.get(&key, 20.into()).unwrap(), Some(b"value".to_vec()));
        assert_eq!(reader.get(&key, 9.into()).unwrap(), None);
    }

    #[test]
    fn test_get_sees_newest_visible_version() {
        let engine = BTreeEngine::default();
        put_data(&engine, b"k", 5, b"v1");
        put_write(&engine, b"k", 10, Write::new(WriteType::Put, 5.into()));
        put_data(&engine, b"k", 15, b"v2");
        put_write(&engine, b"k", 20, Write::new(WriteType::Put, 15.into()));
        put_write(&engine, b"k", 30, Write::new(WriteType::Delete, 25.into()));

        let mut reader = new_reader(&engine);
        let key = Key::from_raw(b"k");
        assert_eq!(reader.get(&key, 10.into()).unwrap(), Some(b"v1".to_vec()));
        assert_eq!(reader.get(&key, 25.into()).unwrap(), Some(b"v2".to_vec()));
        assert_eq!(reader.get(&key, 35.into()).unwrap(), None);
    }

    #[test]
    fn test_get_blocked_by_old_lock_only() {
        let engine = BTreeEngine::default();
        put_data(&engine, b"k", 5, b"v1");
        put_write(&engine, b"k", 10, Write::new(WriteType::Put, 5.into()));
        put_lock(
            &engine,
            b"k",
            &Lock::new(LockType::Put, b"k".to_vec(), 20.into(), 100),
        );

        let mut reader = new_reader(&engine);
        let key = Key::from_raw(b"k");
        // A reader older than the lock is not blocked.
        assert_eq!(reader.get(&key, 15.into()).unwrap(), Some(b"v1".to_vec()));
        // A reader at or after the lock timestamp is.
        let err = reader.get(&key, 25.into()).unwrap_err();
        match *err.0 {
            ErrorInner::KeyIsLocked(ref info) => {
                assert_eq!(info.lock_version, 20.into());
                assert_eq!(info.key, b"k");
            }
            ref e => panic!("unexpected error {:?}", e),
        }
    }

    #[test]
    fn test_get_missing_default_entry() {
        let engine = BTreeEngine::default();
        put_write(&engine, b"k", 10, Write::new(WriteType::Put, 5.into()));
        let mut reader = new_reader(&engine);
        let err = reader.get(&Key::from_raw(b"k"), 20.into()).unwrap_err();
        match *err.0 {
            ErrorInner::DefaultNotFound { ref key } => assert_eq!(key, b"k"),
            ref e => panic!("unexpected error {:?}", e),
        }
    }

    #[test]
    fn test_scan_locks() {
        let engine = BTreeEngine::default();
        for (key, ts) in &[(b"a", 10u64), (b"b", 20), (b"c", 10), (b"d", 30)] {
            put_lock(
                &engine,
                &key[..],
                &Lock::new(LockType::Put, b"a".to_vec(), (*ts).into(), 3),
            );
        }

        let mut reader = new_reader(&engine);
        let (locks, has_remain) = reader
            .scan_locks(None, |lock| lock.ts == 10.into(), 0)
            .unwrap();
        assert_eq!(locks.len(), 2);
        assert_eq!(locks[0].0, Key::from_raw(b"a"));
        assert_eq!(locks[1].0, Key::from_raw(b"c"));
        assert!(!has_remain);

        let mut reader = new_reader(&engine);
        let (locks, has_remain) = reader
            .scan_locks(None, |lock| lock.ts == 10.into(), 1)
            .unwrap();
        assert_eq!(locks.len(), 1);
        assert!(has_remain);

        let start = Key::from_raw(b"b");
        let mut reader = new_reader(&engine);
        let (locks, _) = reader
            .scan_locks(Some(&start), |lock| lock.ts == 10.into(), 0)
            .unwrap();
        assert_eq!(locks.len(), 1);
        assert_eq!(locks[0].0, Key::from_raw(b"c"));
    }
}
