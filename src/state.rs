// Copyright (C) 2023 Nitrokey GmbH
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use core::convert::TryFrom;
use core::fmt;

use serde::{Deserialize, Serialize};

use crate::oath::Tag;
use crate::tlv::{self, Tlv};
use crate::{crypto, ensure, Error, Result};

/// Version of the OATH application, reported on SELECT
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct OathVersion {
    /// Major version
    pub major: u8,
    /// Minor version
    pub minor: u8,
    /// Patch level
    pub patch: u8,
}

impl OathVersion {
    /// Version from its three components
    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl TryFrom<&[u8]> for OathVersion {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        match *bytes {
            [major, minor, patch] => Ok(Self::new(major, minor, patch)),
            _ => Err(Error::ProtocolViolation("version must be 3 bytes")),
        }
    }
}

impl fmt::Display for OathVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

// Mar 05 21:43:45 tensor pcscd[2238]: 00000588 APDU: 00 A4 04 00 07 A0 00 00 05 27 21 01
// Mar 05 21:43:45 tensor pcscd[2238]: 00008810 SW:
//      79 03 01 00 00
//      71 08 26 9F 14 54 3A 0E C7 AC
//      90 00

/// What the device told us about itself in the answer to SELECT
#[derive(Clone, Eq, PartialEq)]
pub struct DeviceIdentity {
    /// Firmware version of the OATH application
    pub version: OathVersion,
    /// Salt of the access code key derivation, sent in the NAME record
    pub salt: Vec<u8>,
    /// Stable identifier derived from the salt
    pub device_id: String,
    /// Present while an access code is set and not yet validated
    pub challenge: Option<Vec<u8>>,
}

impl fmt::Debug for DeviceIdentity {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("DeviceIdentity")
            .field("version", &self.version)
            .field("device_id", &self.device_id)
            .field("challenge", &self.challenge.is_some())
            .finish()
    }
}

impl DeviceIdentity {
    /// Build the identity from the records of the answer to SELECT
    pub fn from_select(records: &[Tlv]) -> Result<Self> {
        let version = tlv::find(records, Tag::Version)
            .ok_or(Error::ProtocolViolation("select response without version"))?;
        let salt = tlv::find(records, Tag::Name)
            .ok_or(Error::ProtocolViolation("select response without salt"))?;
        let challenge = tlv::find(records, Tag::Challenge).map(|record| record.value.clone());
        if let Some(challenge) = &challenge {
            ensure(
                !challenge.is_empty(),
                Error::ProtocolViolation("empty challenge"),
            )?;
        }

        Ok(Self {
            version: OathVersion::try_from(version.value.as_slice())?,
            device_id: crypto::device_id(&salt.value),
            salt: salt.value.clone(),
            challenge,
        })
    }
}

/// Where the session stands in the OATH protocol
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Phase {
    /// SELECT has not been sent, or failed
    Unselected,
    /// Selected, the device has no access code
    NoAuth,
    /// Selected, the access code has to be validated
    AuthPending,
    /// The access code was validated in this session
    Authenticated,
}

/// Session state, owned by one client and reset on every SELECT
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct State {
    identity: Option<DeviceIdentity>,
    /// Gets set after a successful VALIDATE call
    client_authorized: bool,
}

impl State {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn selected(&mut self, identity: DeviceIdentity) {
        self.identity = Some(identity);
        self.client_authorized = false;
    }

    pub fn identity(&self) -> Result<&DeviceIdentity> {
        self.identity.as_ref().ok_or(Error::NotSelected)
    }

    pub fn identity_opt(&self) -> Option<&DeviceIdentity> {
        self.identity.as_ref()
    }

    /// The pending challenge is consumed, exactly once
    pub fn authorized(&mut self) {
        if let Some(identity) = self.identity.as_mut() {
            identity.challenge = None;
            self.client_authorized = true;
        }
    }

    pub fn phase(&self) -> Phase {
        match &self.identity {
            None => Phase::Unselected,
            Some(identity) if identity.challenge.is_some() => Phase::AuthPending,
            Some(_) if self.client_authorized => Phase::Authenticated,
            Some(_) => Phase::NoAuth,
        }
    }
}
