// Copyright (C) 2023 Nitrokey GmbH
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tags, instructions and credential parameters of the YKOATH protocol.

use core::convert::TryFrom;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

use crate::Error;

/// Tags of the TLV records exchanged with the OATH application
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Tag {
    /// Credential name, or the salt in the SELECT response
    Name = 0x71,
    /// One LIST entry: type byte followed by the name
    NameList = 0x72,
    /// Type byte, digits and secret of a credential, or the access key
    Key = 0x73,
    /// Challenge to calculate over
    Challenge = 0x74,
    /// Full HMAC response
    Response = 0x75,
    /// Tag denotes what follows is (digits, dynamically truncated HMAC digest)
    ///
    /// The client then further processes u32::from_be_bytes(truncated-digest)/10**digits.
    TruncatedResponse = 0x76,
    /// Placeholder in CALCULATE ALL for HOTP credentials
    Hotp = 0x77,
    /// Credential properties in PUT, sent without a length
    Property = 0x78,
    /// Application version in the SELECT response
    Version = 0x79,
    /// Initial HOTP counter in PUT
    InitialMovingFactor = 0x7a,
    /// Algorithm of the access key in the SELECT response
    Algorithm = 0x7b,
    /// Placeholder in CALCULATE ALL for credentials requiring touch
    Touch = 0x7c,
    // Remember to update try_from below when adding new tags
}

impl TryFrom<u8> for Tag {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x71 => Tag::Name,
            0x72 => Tag::NameList,
            0x73 => Tag::Key,
            0x74 => Tag::Challenge,
            0x75 => Tag::Response,
            0x76 => Tag::TruncatedResponse,
            0x77 => Tag::Hotp,
            0x78 => Tag::Property,
            0x79 => Tag::Version,
            0x7a => Tag::InitialMovingFactor,
            0x7b => Tag::Algorithm,
            0x7c => Tag::Touch,
            _ => return Err(Error::MalformedTlv),
        })
    }
}

/// Low nibble of the credential type byte
#[repr(u8)]
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Algorithm {
    /// HMAC-SHA1
    Sha1 = 0x01,
    /// HMAC-SHA256
    Sha256 = 0x02,
    /// HMAC-SHA512
    Sha512 = 0x03,
}

impl Algorithm {
    /// HMAC block size; longer secrets are hashed first
    pub fn block_size(self) -> usize {
        match self {
            Algorithm::Sha1 | Algorithm::Sha256 => 64,
            Algorithm::Sha512 => 128,
        }
    }

    /// Hash `data` with this algorithm
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            Algorithm::Sha1 => Sha1::digest(data).to_vec(),
            Algorithm::Sha256 => Sha256::digest(data).to_vec(),
            Algorithm::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

impl TryFrom<u8> for Algorithm {
    type Error = Error;
    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        use Algorithm::*;
        Ok(match byte & MASK_ALGORITHM {
            0x1 => Sha1,
            0x2 => Sha256,
            0x3 => Sha512,
            _ => return Err(Error::ProtocolViolation("unknown algorithm")),
        })
    }
}

/// High nibble of the credential type byte
#[repr(u8)]
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Kind {
    /// Counter based
    Hotp = 0x10,
    /// Time based
    Totp = 0x20,
    /// Reverse HOTP verification, offered by some compatible devices
    HotpReverse = 0x30,
    /// Static HMAC challenge-response slot, offered by some compatible devices
    Hmac = 0x40,
}

impl TryFrom<u8> for Kind {
    type Error = Error;
    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Ok(match byte & MASK_KIND {
            0x10 => Kind::Hotp,
            0x20 => Kind::Totp,
            0x30 => Kind::HotpReverse,
            0x40 => Kind::Hmac,
            _ => return Err(Error::ProtocolViolation("unknown credential type")),
        })
    }
}

/// Mask of the algorithm in the credential type byte
pub const MASK_ALGORITHM: u8 = 0x0f;
/// Mask of the kind in the credential type byte
pub const MASK_KIND: u8 = 0xf0;

/// Build the credential type byte
pub fn combine(kind: Kind, algorithm: Algorithm) -> u8 {
    kind as u8 | algorithm as u8
}

/// Split a credential type byte, validating both halves
pub fn split(byte: u8) -> Result<(Kind, Algorithm), Error> {
    Ok((Kind::try_from(byte)?, Algorithm::try_from(byte)?))
}

bitflags! {
    /// Property byte following [`Tag::Property`] in PUT
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Properties: u8 {
        /// Calculation waits for a touch of the device
        const REQUIRE_TOUCH = 0x02;
    }
}

/// Instruction bytes of the OATH application
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Instruction {
    /// Store a credential
    Put = 0x01,
    /// Delete a credential
    Delete = 0x02,
    /// Set or clear the access code
    SetCode = 0x03,
    /// Wipe the application
    Reset = 0x04,
    /// Rename a credential
    Rename = 0x05,
    /// List credentials
    List = 0xa1,
    /// Calculate one credential
    Calculate = 0xa2,
    /// Mutual authentication with the access code
    Validate = 0xa3,
    /// Calculate all credentials
    CalculateAll = 0xa4,
    /// Fetch the rest of a chained response
    SendRemaining = 0xa5,
}

impl From<Instruction> for u8 {
    fn from(val: Instruction) -> Self {
        val as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_byte() {
        assert_eq!(combine(Kind::Totp, Algorithm::Sha256), 0x22);
        assert_eq!(split(0x13).unwrap(), (Kind::Hotp, Algorithm::Sha512));
        assert!(matches!(split(0x24), Err(Error::ProtocolViolation(_))));
        assert!(matches!(split(0x51), Err(Error::ProtocolViolation(_))));
    }

    #[test]
    fn unknown_tag() {
        assert_eq!(Tag::try_from(0x76).unwrap(), Tag::TruncatedResponse);
        assert_eq!(Tag::try_from(0x70), Err(Error::MalformedTlv));
        assert_eq!(Tag::try_from(0x7d), Err(Error::MalformedTlv));
    }

    #[test]
    fn digest_sizes() {
        assert_eq!(Algorithm::Sha1.digest(b"abc").len(), 20);
        assert_eq!(Algorithm::Sha256.digest(b"abc").len(), 32);
        assert_eq!(Algorithm::Sha512.digest(b"abc").len(), 64);
    }

    #[test]
    fn instruction_bytes() {
        assert_eq!(u8::from(Instruction::SendRemaining), 0xa5);
        assert_eq!(u8::from(Instruction::CalculateAll), 0xa4);
        assert_eq!(u8::from(Instruction::Rename), 0x05);
    }
}
