// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

use std::fmt;

use super::timestamp::TimeStamp;
use super::write::WriteType;
use super::{ErrorInner, Result};
use crate::storage::types::Mutation;
use crate::util::codec::bytes::{self, BytesEncoder};
use crate::util::codec::number::{self, NumberEncoder, MAX_VAR_U64_LEN};
use crate::util::escape;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LockType {
    Put,
    Delete,
}

const FLAG_PUT: u8 = b'P';
const FLAG_DELETE: u8 = b'D';

impl LockType {
    pub fn from_mutation(mutation: &Mutation) -> LockType {
        match mutation {
            Mutation::Put(..) => LockType::Put,
            Mutation::Delete(..) => LockType::Delete,
        }
    }

    fn from_u8(b: u8) -> Option<LockType> {
        match b {
            FLAG_PUT => Some(LockType::Put),
            FLAG_DELETE => Some(LockType::Delete),
            _ => None,
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            LockType::Put => FLAG_PUT,
            LockType::Delete => FLAG_DELETE,
        }
    }
}

/// An in-flight reservation of a key by one transaction.
///
/// `primary` points at the key whose lock decides the fate of the whole
/// transaction; every sibling key of the transaction carries the same
/// primary. `ttl` is in the unit of the timestamp physical component
/// (milliseconds).
#[derive(PartialEq, Clone)]
pub struct Lock {
    pub lock_type: LockType,
    pub primary: Vec<u8>,
    pub ts: TimeStamp,
    pub ttl: u64,
}

impl fmt::Debug for Lock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lock")
            .field("lock_type", &self.lock_type)
            .field("primary_key", &escape(&self.primary))
            .field("start_ts", &self.ts)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl Lock {
    pub fn new(lock_type: LockType, primary: Vec<u8>, ts: TimeStamp, ttl: u64) -> Lock {
        Lock {
            lock_type,
            primary,
            ts,
            ttl,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut b = Vec::with_capacity(1 + MAX_VAR_U64_LEN * 3 + self.primary.len());
        b.push(self.lock_type.to_u8());
        b.encode_compact_bytes(&self.primary).unwrap();
        b.encode_var_u64(self.ts.into_inner()).unwrap();
        b.encode_var_u64(self.ttl).unwrap();
        b
    }

    pub fn parse(mut b: &[u8]) -> Result<Lock> {
        if b.is_empty() {
            return Err(ErrorInner::BadFormatLock.into());
        }
        let lock_type = LockType::from_u8(b[0]).ok_or(ErrorInner::BadFormatLock)?;
        b = &b[1..];
        let primary = bytes::decode_compact_bytes(&mut b)?;
        let ts = number::decode_var_u64(&mut b)?.into();
        let ttl = if b.is_empty() {
            0
        } else {
            number::decode_var_u64(&mut b)?
        };
        Ok(Lock::new(lock_type, primary, ts, ttl))
    }

    /// The write record kind this lock commits to.
    pub fn write_type(&self) -> WriteType {
        WriteType::from_lock_type(self.lock_type)
    }

    pub fn into_lock_info(self, raw_key: Vec<u8>) -> LockInfo {
        LockInfo {
            primary_lock: self.primary,
            lock_version: self.ts,
            key: raw_key,
            lock_ttl: self.ttl,
        }
    }
}

/// The client-facing description of a blocking lock, carried by the
/// `KeyIsLocked` error. Field names follow the wire protocol.
#[derive(Clone, PartialEq)]
pub struct LockInfo {
    pub primary_lock: Vec<u8>,
    pub lock_version: TimeStamp,
    pub key: Vec<u8>,
    pub lock_ttl: u64,
}

impl fmt::Debug for LockInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockInfo")
            .field("primary_lock", &escape(&self.primary_lock))
            .field("lock_version", &self.lock_version)
            .field("key", &escape(&self.key))
            .field("lock_ttl", &self.lock_ttl)
            .finish()
    }
}
