// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

pub mod bytes;
pub mod number;

use std::io;

quick_error! {
    #[derive(Debug)]
    pub enum Error {
        Io(err: io::Error) {
            from()
            cause(err)
            display("io error: {}", err)
        }
        KeyLength {
            display("bad format key (length)")
        }
        KeyPadding {
            display("bad format key (padding)")
        }
        BufferTooSmall {
            display("buffer too small to hold the encoded value")
        }
        Eof {
            display("unexpected eof")
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
