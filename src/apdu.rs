// Copyright (C) 2023 Nitrokey GmbH
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! ISO 7816-4 short APDU framing.
//!
//! Command: `CLA INS P1 P2 [Lc DATA] Le`, response: `DATA SW1 SW2`.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::{ensure, Error, Result};

/// Two byte status word terminating every response
#[derive(Clone, Copy, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct StatusWord(pub u16);

impl StatusWord {
    /// `9000`
    pub const SUCCESS: Self = Self(0x9000);
    /// SW1 of `61xx`, SW2 counts the bytes still waiting on the device
    pub const MORE_DATA_AVAILABLE: u8 = 0x61;
    /// `6982`
    pub const AUTH_REQUIRED: Self = Self(0x6982);
    /// `6984`, shared by [`Self::INCORRECT_RESPONSE`] and [`Self::AUTH_NOT_ENABLED`]
    pub const NO_SUCH_OBJECT: Self = Self(0x6984);
    /// `6984` in answer to VALIDATE
    pub const INCORRECT_RESPONSE: Self = Self(0x6984);
    /// `6984` when no access code is configured
    pub const AUTH_NOT_ENABLED: Self = Self(0x6984);
    /// `6A84`
    pub const NO_SPACE: Self = Self(0x6a84);
    /// `6A80`
    pub const WRONG_SYNTAX: Self = Self(0x6a80);
    /// `6581`
    pub const GENERIC_ERROR: Self = Self(0x6581);
    /// `6D00`
    pub const INVALID_INSTRUCTION: Self = Self(0x6d00);
    /// `6F00`
    pub const COMMAND_ABORTED: Self = Self(0x6f00);

    /// Compose the status word from SW1 and SW2
    pub const fn from_bytes(sw1: u8, sw2: u8) -> Self {
        Self(u16::from_be_bytes([sw1, sw2]))
    }

    /// The status word as transmitted
    pub const fn to_bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }

    /// First byte, the status class
    pub const fn sw1(self) -> u8 {
        self.to_bytes()[0]
    }

    /// Second byte
    pub const fn sw2(self) -> u8 {
        self.to_bytes()[1]
    }

    /// Whether the command completed
    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    /// Byte count announced by a `61xx` status, `None` for any other status
    pub fn remaining(self) -> Option<u8> {
        match self.sw1() {
            Self::MORE_DATA_AVAILABLE => Some(self.sw2()),
            _ => None,
        }
    }

    /// Meaning of the status word in the OATH protocol
    pub fn condition(self) -> Condition {
        match self.0 {
            0x9000 => Condition::Success,
            0x6100..=0x61ff => Condition::MoreDataAvailable(self.sw2()),
            0x6982 => Condition::AuthRequired,
            0x6984 => Condition::NoSuchObjectOrIncorrectResponse,
            0x6a84 => Condition::NoSpace,
            0x6a80 => Condition::WrongSyntax,
            0x6581 => Condition::GenericError,
            0x6d00 => Condition::InvalidInstruction,
            0x6f00 => Condition::CommandAborted,
            _ => Condition::Unknown,
        }
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}", self.0)
    }
}

impl fmt::Debug for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StatusWord({:04X}, {:?})", self.0, self.condition())
    }
}

impl From<[u8; 2]> for StatusWord {
    fn from(bytes: [u8; 2]) -> Self {
        Self::from_bytes(bytes[0], bytes[1])
    }
}

/// Classification of the status words used by the OATH application
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Condition {
    /// `9000`
    Success,
    /// `61xx`
    MoreDataAvailable(u8),
    /// `6982`, the access code has to be validated first
    AuthRequired,
    /// `6984`: the device uses one status for "no such object",
    /// "incorrect response" and "authentication not enabled".
    /// Which of them applies can not be told from the status alone.
    NoSuchObjectOrIncorrectResponse,
    /// `6A84`
    NoSpace,
    /// `6A80`
    WrongSyntax,
    /// `6581`
    GenericError,
    /// `6D00`
    InvalidInstruction,
    /// `6F00`
    CommandAborted,
    /// Anything else
    Unknown,
}

/// Command APDU
#[derive(Clone, Eq, PartialEq)]
pub struct Apdu {
    /// CLA
    pub class: u8,
    /// INS
    pub instruction: u8,
    /// P1
    pub p1: u8,
    /// P2
    pub p2: u8,
    /// Command data, sent with its Lc prefix when present
    pub data: Option<Vec<u8>>,
    /// Le
    pub expected_length: u8,
}

impl Apdu {
    /// Command without data, class 0 and Le 0
    pub fn new(instruction: u8, p1: u8, p2: u8) -> Self {
        Self {
            class: 0x00,
            instruction,
            p1,
            p2,
            data: None,
            expected_length: 0x00,
        }
    }

    /// Attach command data
    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = Some(data);
        self
    }

    /// Serialize the command into its wire format
    pub fn encode(&self) -> Result<Vec<u8>> {
        let header = [self.class, self.instruction, self.p1, self.p2];
        let mut encoded = Vec::with_capacity(6 + self.data.as_ref().map_or(0, Vec::len));
        encoded.extend_from_slice(&header);
        if let Some(data) = &self.data {
            let lc = u8::try_from(data.len()).map_err(|_| Error::PayloadTooLarge(data.len()))?;
            encoded.push(lc);
            encoded.extend_from_slice(data);
        }
        encoded.push(self.expected_length);
        Ok(encoded)
    }
}

impl fmt::Debug for Apdu {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Apdu")
            .field("cla", &self.class)
            .field("ins", &self.instruction)
            .field("p1", &self.p1)
            .field("p2", &self.p2)
            .field("lc", &self.data.as_ref().map(Vec::len))
            .finish()
    }
}

/// Response APDU
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Response {
    /// Response data, empty when the device only sent a status word
    pub data: Vec<u8>,
    /// Trailing status word
    pub status: StatusWord,
}

impl Response {
    /// Split a raw response into data and the trailing status word
    pub fn decode(raw: &[u8]) -> Result<Self> {
        ensure(raw.len() >= 2, Error::MalformedResponse)?;
        let (data, status) = raw.split_at(raw.len() - 2);
        Ok(Self {
            data: data.to_vec(),
            status: StatusWord::from_bytes(status[0], status[1]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_without_data() {
        let apdu = Apdu::new(0xa1, 0x00, 0x00);
        assert_eq!(apdu.encode().unwrap(), hex!("00 A1 00 00 00"));
    }

    #[test]
    fn encode_sets_lc_to_data_length() {
        for len in [0usize, 1, 8, 127, 255] {
            let apdu = Apdu::new(0x01, 0x00, 0x00).with_data(vec![0xaa; len]);
            let encoded = apdu.encode().unwrap();
            assert_eq!(encoded.len(), 4 + 1 + len + 1);
            assert_eq!(encoded[4] as usize, len);
            assert_eq!(encoded[encoded.len() - 1], 0x00);
        }
    }

    #[test]
    fn encode_rejects_long_payload() {
        let apdu = Apdu::new(0x01, 0x00, 0x00).with_data(vec![0; 256]);
        assert_eq!(apdu.encode(), Err(Error::PayloadTooLarge(256)));
    }

    #[test]
    fn encode_select() {
        let apdu = Apdu::new(0xa4, 0x04, 0x00).with_data(crate::YUBICO_OATH_AID.to_vec());
        assert_eq!(
            apdu.encode().unwrap(),
            hex!("00 A4 04 00 08 A0 00 00 05 27 21 01 01 00")
        );
    }

    #[test]
    fn decode_splits_status() {
        let response = Response::decode(&hex!("79 03 04 02 06 90 00")).unwrap();
        assert_eq!(response.data, hex!("79 03 04 02 06"));
        assert_eq!(response.status, StatusWord::SUCCESS);

        let response = Response::decode(&hex!("61 10")).unwrap();
        assert!(response.data.is_empty());
        assert_eq!(response.status.remaining(), Some(0x10));
    }

    #[test]
    fn decode_rejects_short_frames() {
        assert_eq!(Response::decode(&[]), Err(Error::MalformedResponse));
        assert_eq!(Response::decode(&[0x90]), Err(Error::MalformedResponse));
    }

    #[test]
    fn status_conditions() {
        assert_eq!(StatusWord(0x9000).condition(), Condition::Success);
        assert_eq!(
            StatusWord(0x61ff).condition(),
            Condition::MoreDataAvailable(0xff)
        );
        assert_eq!(
            StatusWord::INCORRECT_RESPONSE.condition(),
            Condition::NoSuchObjectOrIncorrectResponse
        );
        assert_eq!(StatusWord::NO_SUCH_OBJECT, StatusWord::AUTH_NOT_ENABLED);
        assert_eq!(StatusWord(0x6a82).condition(), Condition::Unknown);
        assert_eq!(StatusWord(0x6982).remaining(), None);
    }

    #[test]
    fn status_matches_iso7816() {
        let success: [u8; 2] = iso7816::Status::Success.into();
        assert!(StatusWord::from(success).is_success());
        let more: [u8; 2] = iso7816::Status::MoreAvailable(0x20).into();
        assert_eq!(StatusWord::from(more).remaining(), Some(0x20));
    }
}
