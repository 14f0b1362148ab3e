// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

use std::io::Write;

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

use super::{Error, Result};

pub const U64_SIZE: usize = 8;
pub const MAX_VAR_U64_LEN: usize = 10;

/// Byte encoders for unsigned 64-bit numbers.
///
/// `encode_u64` and `encode_u64_desc` are memcomparable: the byte order of
/// the encoded form matches the numeric order (ascending and descending
/// respectively). `encode_var_u64` is the compact varint form and is not
/// memcomparable.
pub trait NumberEncoder: Write {
    fn encode_u64(&mut self, v: u64) -> Result<()> {
        self.write_u64::<BigEndian>(v).map_err(From::from)
    }

    fn encode_u64_desc(&mut self, v: u64) -> Result<()> {
        self.write_u64::<BigEndian>(!v).map_err(From::from)
    }

    fn encode_var_u64(&mut self, mut v: u64) -> Result<()> {
        let mut buf = [0; MAX_VAR_U64_LEN];
        let mut i = 0;
        while v >= 0x80 {
            buf[i] = v as u8 | 0x80;
            v >>= 7;
            i += 1;
        }
        buf[i] = v as u8;
        self.write_all(&buf[..=i]).map_err(From::from)
    }
}

impl<T: Write> NumberEncoder for T {}

#[inline]
fn read_num_bytes<T, F>(size: usize, data: &mut &[u8], f: F) -> Result<T>
where
    F: Fn(&[u8]) -> T,
{
    if data.len() >= size {
        let buf = &data[..size];
        *data = &data[size..];
        return Ok(f(buf));
    }
    Err(Error::Eof)
}

/// Decodes a value encoded by `encode_u64`, advancing `data` past it.
pub fn decode_u64(data: &mut &[u8]) -> Result<u64> {
    read_num_bytes(U64_SIZE, data, BigEndian::read_u64)
}

/// Decodes a value encoded by `encode_u64_desc`, advancing `data` past it.
pub fn decode_u64_desc(data: &mut &[u8]) -> Result<u64> {
    let v = decode_u64(data)?;
    Ok(!v)
}

/// Decodes a value encoded by `encode_var_u64`, advancing `data` past it.
pub fn decode_var_u64(data: &mut &[u8]) -> Result<u64> {
    let (mut x, mut s) = (0u64, 0);
    for (i, &b) in data.iter().enumerate() {
        if b < 0x80 {
            if i > 9 || (i == 9 && b > 1) {
                return Err(Error::KeyLength);
            }
            *data = &data[i + 1..];
            return Ok(x | u64::from(b) << s);
        }
        x |= u64::from(b & 0x7f) << s;
        s += 7;
    }
    Err(Error::Eof)
}
