// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

use std::fmt;

use super::lock::LockType;
use super::timestamp::TimeStamp;
use super::{ErrorInner, Result};
use crate::util::codec::number::{self, NumberEncoder, MAX_VAR_U64_LEN};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WriteType {
    Put,
    Delete,
    Rollback,
}

const FLAG_PUT: u8 = b'P';
const FLAG_DELETE: u8 = b'D';
const FLAG_ROLLBACK: u8 = b'R';

impl WriteType {
    pub fn from_lock_type(tp: LockType) -> WriteType {
        match tp {
            LockType::Put => WriteType::Put,
            LockType::Delete => WriteType::Delete,
        }
    }

    pub fn from_u8(b: u8) -> Option<WriteType> {
        match b {
            FLAG_PUT => Some(WriteType::Put),
            FLAG_DELETE => Some(WriteType::Delete),
            FLAG_ROLLBACK => Some(WriteType::Rollback),
            _ => None,
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            WriteType::Put => FLAG_PUT,
            WriteType::Delete => FLAG_DELETE,
            WriteType::Rollback => FLAG_ROLLBACK,
        }
    }
}

/// A commit log entry of a key.
///
/// Stored in the `write` column family under `(key, commit_ts)`. A record
/// with `write_type == Rollback` uses `commit_ts == start_ts` and declares
/// the transaction aborted: no prewrite or commit for that `start_ts` may
/// succeed afterwards.
#[derive(Debug, PartialEq, Clone)]
pub struct Write {
    pub write_type: WriteType,
    pub start_ts: TimeStamp,
}

impl Write {
    pub fn new(write_type: WriteType, start_ts: TimeStamp) -> Write {
        Write {
            write_type,
            start_ts,
        }
    }

    pub fn rollback(start_ts: TimeStamp) -> Write {
        Write::new(WriteType::Rollback, start_ts)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut b = Vec::with_capacity(1 + MAX_VAR_U64_LEN);
        b.push(self.write_type.to_u8());
        b.encode_var_u64(self.start_ts.into_inner()).unwrap();
        b
    }

    pub fn parse(mut b: &[u8]) -> Result<Write> {
        if b.is_empty() {
            return Err(ErrorInner::BadFormatWrite.into());
        }
        let write_type = WriteType::from_u8(b[0]).ok_or(ErrorInner::BadFormatWrite)?;
        b = &b[1..];
        let start_ts = number::decode_var_u64(&mut b)?.into();
        Ok(Write::new(write_type, start_ts))
    }

    pub fn parse_type(b: &[u8]) -> Result<WriteType> {
        if b.is_empty() {
            return Err(ErrorInner::BadFormatWrite.into());
        }
        WriteType::from_u8(b[0]).ok_or_else(|| ErrorInner::BadFormatWrite.into())
    }
}

impl fmt::Display for Write {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}@{}", self.write_type, self.start_ts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_type() {
        let mut tests = vec![
            (Some(LockType::Put), WriteType::Put, FLAG_PUT),
            (Some(LockType::Delete), WriteType::Delete, FLAG_DELETE),
            (None, WriteType::Rollback, FLAG_ROLLBACK),
        ];
        for (i, (lock_type, write_type, flag)) in tests.drain(..).enumerate() {
            if let Some(lock_type) = lock_type {
                let wt = WriteType::from_lock_type(lock_type);
                assert_eq!(
                    wt, write_type,
                    "#{}, expect from_lock_type({:?}) returns {:?}, but got {:?}",
                    i, lock_type, write_type, wt
                );
            }
            assert_eq!(write_type.to_u8(), flag);
            assert_eq!(WriteType::from_u8(flag).unwrap(), write_type);
        }
        assert_eq!(WriteType::from_u8(b'x'), None);
    }

    #[test]
    fn test_write() {
        // Test `Write::to_bytes()` and `Write::parse()` works as a pair.
        let mut writes = vec![
            Write::new(WriteType::Put, 0.into()),
            Write::new(WriteType::Delete, 5.into()),
            Write::rollback(TimeStamp::compose(1 << 40, 7)),
        ];
        for (i, write) in writes.drain(..).enumerate() {
            let v = write.to_bytes();
            let w = Write::parse(&v[..]).unwrap_or_else(|e| panic!("#{} parse() err: {:?}", i, e));
            assert_eq!(w, write, "#{} expect {:?}, but got {:?}", i, write, w);
            assert_eq!(Write::parse_type(&v).unwrap(), w.write_type);
        }

        // Test `Write::parse()` handles incorrect input.
        assert!(Write::parse(b"").is_err());
        assert!(Write::parse(b"x5").is_err());
    }
}
