// Copyright (C) 2023 Nitrokey GmbH
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use core::convert::TryFrom;
use core::fmt;

use crate::apdu::Apdu;
use crate::oath::{self, Instruction, Properties, Tag};
use crate::tlv::Tlv;
use crate::{Error, Result};

/// P1 P2 of RESET, guarding against accidental resets
const RESET_CONFIRMATION: (u8, u8) = (0xde, 0xad);

/// P2 of CALCULATE and CALCULATE ALL requesting truncated responses
const TRUNCATE: u8 = 0x01;

/// Command request, along with data
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Command<'l> {
    /// Select the application
    Select(Select<'l>),
    /// Calculate the authentication data for a credential given by label.
    Calculate(Calculate<'l>),
    /// Calculate the authentication data for all credentials.
    CalculateAll(CalculateAll<'l>),
    /// Clear the password.
    ClearPassword,
    /// Delete a credential.
    Delete(Delete<'l>),
    /// Rename a credential.
    Rename(Rename<'l>),
    /// List all credentials.
    ListCredentials,
    /// Register a new credential.
    Register(Register<'l>),
    /// Delete all credentials and rotate the salt.
    Reset,
    /// Set a password.
    SetPassword(SetPassword<'l>),
    /// Validate the password (both ways).
    Validate(Validate<'l>),
    /// Fetch the next part of a chained response
    SendRemaining,
}

#[derive(Clone, Copy, Eq, PartialEq)]
pub struct Select<'l> {
    pub aid: &'l [u8],
}

impl fmt::Debug for Select<'_> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Select")
            .field("aid", &hex_str!(&self.aid, 5))
            .finish()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SetPassword<'l> {
    pub kind: oath::Kind,
    pub algorithm: oath::Algorithm,
    pub key: &'l [u8],
    pub challenge: &'l [u8],
    pub response: &'l [u8],
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Validate<'l> {
    pub response: &'l [u8],
    pub challenge: &'l [u8],
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Calculate<'l> {
    pub label: &'l str,
    pub challenge: &'l [u8],
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CalculateAll<'l> {
    pub challenge: &'l [u8],
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Delete<'l> {
    pub label: &'l str,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Rename<'l> {
    pub label: &'l str,
    pub new_label: &'l str,
}

#[derive(Clone, Copy, Eq, PartialEq)]
pub struct Register<'l> {
    pub label: &'l str,
    pub kind: oath::Kind,
    pub algorithm: oath::Algorithm,
    pub digits: u8,
    /// Already shortened and padded
    pub key: &'l [u8],
    pub touch_required: bool,
    /// Initial moving factor, only sent when positive
    pub counter: u32,
}

impl fmt::Debug for Register<'_> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Register")
            .field("label", &self.label)
            .field("kind", &self.kind)
            .field("alg", &self.algorithm)
            .field("digits", &self.digits)
            .field("touch", &self.touch_required)
            .field("counter", &self.counter)
            .finish()
    }
}

impl Register<'_> {
    // 71 <- Tag::Name
    //    12
    //       41 6C 69 63 65 ...
    // 73 <- Tag::Key
    //    10 <- 2 + key length
    //       21 <- kind | algorithm
    //       06 <- digits
    //       ... <- key
    // 78 02 <- Tag::Property, followed by the properties byte without a length
    // 7a 04 00 00 00 2a <- Tag::InitialMovingFactor
    fn payload(&self) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(self.label.len() + self.key.len() + 16);
        Tlv::new(Tag::Name, self.label.as_bytes()).encode_into(&mut data)?;

        let mut key = Vec::with_capacity(self.key.len() + 2);
        key.push(oath::combine(self.kind, self.algorithm));
        key.push(self.digits);
        key.extend_from_slice(self.key);
        Tlv::new(Tag::Key, key).encode_into(&mut data)?;

        if self.touch_required {
            data.extend_from_slice(&[Tag::Property as u8, Properties::REQUIRE_TOUCH.bits()]);
        }
        if self.counter > 0 {
            Tlv::new(Tag::InitialMovingFactor, self.counter.to_be_bytes()).encode_into(&mut data)?;
        }
        Ok(data)
    }
}

fn concat(records: &[Tlv]) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    for record in records {
        record.encode_into(&mut data)?;
    }
    Ok(data)
}

impl<'l> TryFrom<Command<'l>> for Apdu {
    type Error = Error;

    fn try_from(command: Command<'l>) -> Result<Self> {
        let (instruction, p1, p2, data): (u8, u8, u8, Option<Vec<u8>>) = match command {
            Command::Select(select) => (
                iso7816::Instruction::Select.into(),
                0x04,
                0x00,
                Some(select.aid.to_vec()),
            ),
            Command::Calculate(calculate) => (
                Instruction::Calculate.into(),
                0x00,
                TRUNCATE,
                Some(concat(&[
                    Tlv::new(Tag::Name, calculate.label.as_bytes()),
                    Tlv::new(Tag::Challenge, calculate.challenge),
                ])?),
            ),
            Command::CalculateAll(calculate_all) => (
                Instruction::CalculateAll.into(),
                0x00,
                TRUNCATE,
                Some(Tlv::new(Tag::Challenge, calculate_all.challenge).serialize()?),
            ),
            // the device treats a lone empty KEY record as "remove the code"
            Command::ClearPassword => (
                Instruction::SetCode.into(),
                0x00,
                0x00,
                Some(Tlv::new(Tag::Key, Vec::new()).serialize()?),
            ),
            Command::Delete(delete) => (
                Instruction::Delete.into(),
                0x00,
                0x00,
                Some(Tlv::new(Tag::Name, delete.label.as_bytes()).serialize()?),
            ),
            Command::Rename(rename) => (
                Instruction::Rename.into(),
                0x00,
                0x00,
                Some(concat(&[
                    Tlv::new(Tag::Name, rename.label.as_bytes()),
                    Tlv::new(Tag::Name, rename.new_label.as_bytes()),
                ])?),
            ),
            Command::ListCredentials => (Instruction::List.into(), 0x00, 0x00, None),
            Command::Register(register) => (
                Instruction::Put.into(),
                0x00,
                0x00,
                Some(register.payload()?),
            ),
            Command::Reset => (
                Instruction::Reset.into(),
                RESET_CONFIRMATION.0,
                RESET_CONFIRMATION.1,
                None,
            ),
            Command::SetPassword(set_password) => {
                let mut key = Vec::with_capacity(set_password.key.len() + 1);
                key.push(oath::combine(set_password.kind, set_password.algorithm));
                key.extend_from_slice(set_password.key);
                (
                    Instruction::SetCode.into(),
                    0x00,
                    0x00,
                    Some(concat(&[
                        Tlv::new(Tag::Key, key),
                        Tlv::new(Tag::Challenge, set_password.challenge),
                        Tlv::new(Tag::Response, set_password.response),
                    ])?),
                )
            }
            Command::Validate(validate) => (
                Instruction::Validate.into(),
                0x00,
                0x00,
                Some(concat(&[
                    Tlv::new(Tag::Response, validate.response),
                    Tlv::new(Tag::Challenge, validate.challenge),
                ])?),
            ),
            Command::SendRemaining => (Instruction::SendRemaining.into(), 0x00, 0x00, None),
        };

        let apdu = Apdu::new(instruction, p1, p2);
        Ok(match data {
            Some(data) => {
                if data.len() > usize::from(u8::MAX) {
                    return Err(Error::PayloadTooLarge(data.len()));
                }
                apdu.with_data(data)
            }
            None => apdu,
        })
    }
}
