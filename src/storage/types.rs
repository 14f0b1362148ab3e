// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

//! Core types shared by the storage layers.

use std::fmt;

use crate::storage::mvcc::TimeStamp;
use crate::util::codec::number::{self, NumberEncoder, U64_SIZE};
use crate::util::codec::{self, bytes};
use crate::util::escape;

/// Value type which is essentially raw bytes.
pub type Value = Vec<u8>;

/// An internal key.
///
/// A user key is group-encoded (see `codec::bytes`) when it enters the
/// storage layer, so that a fixed-width timestamp suffix can be appended
/// without breaking the ordering of the underlying engine. The `write` and
/// `default` column families key their entries by `user_key + timestamp`;
/// the `lock` column family keys by the bare encoded user key.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(Vec<u8>);

impl Key {
    /// Creates a key from a raw user key, applying the group encoding.
    pub fn from_raw(key: &[u8]) -> Key {
        Key(bytes::encode_bytes(key))
    }

    /// Wraps an already encoded byte string.
    pub fn from_encoded(encoded: Vec<u8>) -> Key {
        Key(encoded)
    }

    pub fn from_encoded_slice(encoded: &[u8]) -> Key {
        Key(encoded.to_vec())
    }

    pub fn as_encoded(&self) -> &Vec<u8> {
        &self.0
    }

    pub fn into_encoded(self) -> Vec<u8> {
        self.0
    }

    /// Recovers the raw user key. Fails if the key is not a valid group
    /// encoding, e.g. if a timestamp suffix is still attached.
    pub fn to_raw(&self) -> codec::Result<Vec<u8>> {
        bytes::decode_bytes(&mut self.0.as_slice())
    }

    pub fn into_raw(self) -> codec::Result<Vec<u8>> {
        self.to_raw()
    }

    /// Appends a timestamp, encoded so that byte order descends with the
    /// timestamp: iterating forward from `key.append_ts(ts)` visits records
    /// in decreasing timestamp order starting at `ts`.
    pub fn append_ts(mut self, ts: TimeStamp) -> Key {
        self.0.encode_u64_desc(ts.into_inner()).unwrap();
        self
    }

    /// Strips the timestamp suffix.
    pub fn truncate_ts(mut self) -> codec::Result<Key> {
        let len = self.0.len();
        if len < U64_SIZE {
            return Err(codec::Error::KeyLength);
        }
        self.0.truncate(len - U64_SIZE);
        Ok(self)
    }

    /// Decodes the timestamp suffix without consuming the key.
    pub fn decode_ts(&self) -> codec::Result<TimeStamp> {
        Ok(Key::split_on_ts_for(&self.0)?.1)
    }

    /// Splits an encoded key carrying a timestamp suffix into the encoded
    /// user key part and the timestamp.
    pub fn split_on_ts_for(key: &[u8]) -> codec::Result<(&[u8], TimeStamp)> {
        if key.len() < U64_SIZE {
            return Err(codec::Error::KeyLength);
        }
        let pos = key.len() - U64_SIZE;
        let (user_key, mut ts) = key.split_at(pos);
        let ts = number::decode_u64_desc(&mut ts)?;
        Ok((user_key, ts.into()))
    }

    /// Whether the user key part of a timestamped key `ts_encoded_key`
    /// equals the given encoded user key.
    pub fn is_user_key_eq(ts_encoded_key: &[u8], user_key: &[u8]) -> bool {
        ts_encoded_key.len() == user_key.len() + U64_SIZE
            && &ts_encoded_key[..user_key.len()] == user_key
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", escape(&self.0))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", escape(&self.0))
    }
}

/// A row mutation carried by a `Prewrite` request.
#[derive(Debug, Clone)]
pub enum Mutation {
    Put((Key, Value)),
    Delete(Key),
}

impl Mutation {
    pub fn key(&self) -> &Key {
        match self {
            Mutation::Put((ref key, _)) => key,
            Mutation::Delete(ref key) => key,
        }
    }

    pub fn into_key_value(self) -> (Key, Option<Value>) {
        match self {
            Mutation::Put((key, value)) => (key, Some(value)),
            Mutation::Delete(key) => (key, None),
        }
    }
}

/// What `CheckTxnStatus` did to the transaction it examined.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    /// The transaction is alive, committed or already rolled back; nothing
    /// was written.
    NoAction,
    /// The primary lock outlived its TTL and was rolled back.
    TtlExpireRollback,
    /// No lock and no commit record existed; a protective rollback record
    /// was written so the transaction can never be revived.
    LockNotExistRollback,
}

/// The observed status of a transaction, as reported by `CheckTxnStatus`.
#[derive(Debug, Clone, PartialEq)]
pub struct TxnStatus {
    pub lock_ttl: u64,
    pub commit_ts: TimeStamp,
    pub action: Action,
}

impl TxnStatus {
    /// The primary lock is still alive and holds the transaction open.
    pub fn uncommitted(lock_ttl: u64) -> TxnStatus {
        TxnStatus {
            lock_ttl,
            commit_ts: TimeStamp::zero(),
            action: Action::NoAction,
        }
    }

    /// The transaction was committed at `commit_ts`.
    pub fn committed(commit_ts: TimeStamp) -> TxnStatus {
        TxnStatus {
            lock_ttl: 0,
            commit_ts,
            action: Action::NoAction,
        }
    }

    /// The transaction is rolled back, either just now (`action` says by
    /// whom) or by an earlier command.
    pub fn rolled_back(action: Action) -> TxnStatus {
        TxnStatus {
            lock_ttl: 0,
            commit_ts: TimeStamp::zero(),
            action,
        }
    }
}
