// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

use std::io::Write;

use super::number::{self, NumberEncoder};
use super::{Error, Result};

const ENC_GROUP_SIZE: usize = 8;
const ENC_MARKER: u8 = 0xff;
const ENC_ASC_PADDING: [u8; ENC_GROUP_SIZE] = [0; ENC_GROUP_SIZE];

/// Returns the maximum encoded size of a key of length `n`.
pub fn max_encoded_bytes_size(n: usize) -> usize {
    (n / ENC_GROUP_SIZE + 1) * (ENC_GROUP_SIZE + 1)
}

pub trait BytesEncoder: NumberEncoder {
    /// Writes `key` in the memcomparable group encoding.
    ///
    /// The key is split into groups of 8 bytes, each group padded with zero
    /// bytes and followed by a marker recording the padding width. The
    /// encoding guarantees that no encoded key is a prefix of another, so a
    /// timestamp suffix appended after it compares correctly.
    fn encode_bytes(&mut self, key: &[u8]) -> Result<()> {
        let len = key.len();
        let mut index = 0;
        while index <= len {
            let remain = len - index;
            let mut pad = 0;
            if remain >= ENC_GROUP_SIZE {
                self.write_all(&key[index..index + ENC_GROUP_SIZE])?;
            } else {
                pad = ENC_GROUP_SIZE - remain;
                self.write_all(&key[index..])?;
                self.write_all(&ENC_ASC_PADDING[..pad])?;
            }
            self.write_all(&[ENC_MARKER - pad as u8])?;
            index += ENC_GROUP_SIZE;
        }
        Ok(())
    }

    /// Writes `data` prefixed with its varint-encoded length.
    fn encode_compact_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.encode_var_u64(data.len() as u64)?;
        self.write_all(data).map_err(From::from)
    }
}

impl<T: Write> BytesEncoder for T {}

pub fn encode_bytes(key: &[u8]) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(max_encoded_bytes_size(key.len()));
    encoded.encode_bytes(key).unwrap();
    encoded
}

/// Decodes a key encoded by `encode_bytes`, advancing `data` past it.
pub fn decode_bytes(data: &mut &[u8]) -> Result<Vec<u8>> {
    let mut key = Vec::with_capacity(data.len() / (ENC_GROUP_SIZE + 1) * ENC_GROUP_SIZE);
    let chunk_len = ENC_GROUP_SIZE + 1;
    let mut offset = 0;
    loop {
        let next_offset = offset + chunk_len;
        if next_offset > data.len() {
            return Err(Error::KeyLength);
        }
        let chunk = &data[offset..next_offset];
        offset = next_offset;
        let (&marker, bytes) = chunk.split_last().unwrap();
        if marker == ENC_MARKER {
            key.extend_from_slice(bytes);
            continue;
        }
        let pad_size = (ENC_MARKER - marker) as usize;
        if pad_size > ENC_GROUP_SIZE {
            return Err(Error::KeyLength);
        }
        key.extend_from_slice(&bytes[..bytes.len() - pad_size]);
        if bytes[bytes.len() - pad_size..].iter().any(|&b| b != 0) {
            return Err(Error::KeyPadding);
        }
        *data = &data[offset..];
        return Ok(key);
    }
}

/// Decodes a value encoded by `encode_compact_bytes`, advancing `data`.
pub fn decode_compact_bytes(data: &mut &[u8]) -> Result<Vec<u8>> {
    let len = number::decode_var_u64(data)? as usize;
    if data.len() < len {
        return Err(Error::Eof);
    }
    let bytes = data[..len].to_vec();
    *data = &data[len..];
    Ok(bytes)
}
