// Copyright (C) 2023 Nitrokey GmbH
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tag-Length-Value records of the OATH application.
//!
//! Decoding accepts every length form: short (`< 0x80`), `81 nn` and `82 hh ll`.
//! Encoding picks the form from the value length: short below `0x80`,
//! `81 nn` below `0xFF`, and `82 hh ll` from `0xFF` on.

use core::convert::TryFrom;
use core::fmt;

use crate::oath::Tag;
use crate::{ensure, Error, Result};

/// A single decoded record
#[derive(Clone, Eq, PartialEq)]
pub struct Tlv {
    /// Record tag, always one of the known OATH tags
    pub tag: Tag,
    /// Record value
    pub value: Vec<u8>,
}

impl fmt::Debug for Tlv {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Tlv")
            .field("tag", &self.tag)
            .field("len", &self.value.len())
            .finish()
    }
}

impl Tlv {
    /// Record with `tag` and `value`
    pub fn new(tag: Tag, value: impl Into<Vec<u8>>) -> Self {
        Self {
            tag,
            value: value.into(),
        }
    }

    /// Parse the record at the start of `bytes`, returning it with the number of bytes consumed
    pub fn parse_one(bytes: &[u8]) -> Result<(Self, usize)> {
        ensure(bytes.len() >= 2, Error::MalformedTlv)?;
        let tag = Tag::try_from(bytes[0])?;

        let (length, header) = match bytes[1] {
            short @ 0x00..=0x7f => (short as usize, 2),
            0x81 => (*bytes.get(2).ok_or(Error::MalformedTlv)? as usize, 3),
            0x82 => {
                let length = bytes.get(2..4).ok_or(Error::MalformedTlv)?;
                (u16::from_be_bytes([length[0], length[1]]) as usize, 4)
            }
            _ => return Err(Error::MalformedTlv),
        };

        let value = bytes
            .get(header..header + length)
            .ok_or(Error::MalformedTlv)?;
        Ok((Self::new(tag, value), header + length))
    }

    /// Parse consecutive records until `bytes` is exhausted
    pub fn parse_all(mut bytes: &[u8]) -> Result<Vec<Self>> {
        let mut records = Vec::new();
        while !bytes.is_empty() {
            let (record, consumed) = Self::parse_one(bytes)?;
            records.push(record);
            bytes = &bytes[consumed..];
        }
        Ok(records)
    }

    /// Append the encoded record to `buffer`.
    ///
    /// Values longer than `0xFFFF` bytes have no length encoding and are rejected
    /// with [`Error::PayloadTooLarge`], leaving `buffer` untouched.
    pub fn encode_into(&self, buffer: &mut Vec<u8>) -> Result {
        let length = self.value.len();
        let long = u16::try_from(length).map_err(|_| Error::PayloadTooLarge(length))?;
        buffer.push(self.tag as u8);
        if length < 0x80 {
            buffer.push(length as u8);
        } else if length < 0xff {
            buffer.extend_from_slice(&[0x81, length as u8]);
        } else {
            buffer.push(0x82);
            buffer.extend_from_slice(&long.to_be_bytes());
        }
        buffer.extend_from_slice(&self.value);
        Ok(())
    }

    /// Encoded form of the record
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::with_capacity(self.value.len() + 4);
        self.encode_into(&mut buffer)?;
        Ok(buffer)
    }
}

/// Find the first record with `tag`
pub fn find(records: &[Tlv], tag: Tag) -> Option<&Tlv> {
    records.iter().find(|record| record.tag == tag)
}
