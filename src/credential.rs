// Copyright (C) 2023 Nitrokey GmbH
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Credentials stored on the device, and the codes calculated for them.
//!
//! A credential is identified by its name, which also carries metadata:
//! `[period/][issuer:]account`. The period prefix is only written for TOTP
//! credentials with a period other than 30 seconds.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::calculate::{self, DEFAULT_PERIOD};
use crate::oath::{self, Algorithm, Kind};
use crate::{ensure, Error, Result};

/// Issuer whose codes use the Steam Guard alphabet
const STEAM_ISSUER: &str = "Steam";

/// A credential as listed by the device
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Credential {
    /// Full name, including the optional period prefix and issuer
    pub name: String,
    /// HMAC algorithm
    pub algorithm: Algorithm,
    /// HOTP or TOTP
    pub kind: Kind,
    /// Whether the device waits for a touch before calculating
    pub touch_required: bool,
}

impl Credential {
    /// Credential from its parts
    pub fn new(name: impl Into<String>, kind: Kind, algorithm: Algorithm, touch_required: bool) -> Self {
        Self {
            name: name.into(),
            algorithm,
            kind,
            touch_required,
        }
    }

    /// Parse the value of a NAME_LIST record: `kind | algorithm`, then the UTF-8 name
    pub fn from_list_entry(value: &[u8]) -> Result<Self> {
        let (&type_byte, name) = value
            .split_first()
            .ok_or(Error::ProtocolViolation("empty list entry"))?;
        let (kind, algorithm) = oath::split(type_byte)?;
        let name = core::str::from_utf8(name)
            .map_err(|_| Error::ProtocolViolation("credential name is not UTF-8"))?;
        Ok(Self::new(name, kind, algorithm, false))
    }

    /// Period prefix, if it is a positive number, and the rest of the name
    fn split_period(&self) -> (Option<u32>, &str) {
        if let Some((prefix, rest)) = self.name.split_once('/') {
            if let Ok(period) = prefix.parse::<u32>() {
                if period > 0 {
                    return (Some(period), rest);
                }
            }
        }
        (None, &self.name)
    }

    /// Time step in seconds, 30 unless the name says otherwise
    pub fn period(&self) -> u32 {
        self.split_period().0.unwrap_or(DEFAULT_PERIOD)
    }

    /// Issuer part of the name, the whole name if there is no `:`
    pub fn issuer(&self) -> &str {
        let (_, rest) = self.split_period();
        rest.split_once(':').map_or(rest, |(issuer, _)| issuer)
    }

    /// Account part of the name, empty if there is no `:`
    pub fn account(&self) -> &str {
        let (_, rest) = self.split_period();
        rest.split_once(':').map_or("", |(_, account)| account)
    }

    /// Codes of Steam credentials are formatted with the Steam Guard alphabet
    pub fn is_steam(&self) -> bool {
        self.issuer() == STEAM_ISSUER
    }

    /// Compose a credential name from its parts
    pub fn format_name(issuer: &str, account: &str, period: u32, kind: Kind) -> String {
        let mut name = String::new();
        if kind == Kind::Totp && period != DEFAULT_PERIOD {
            name.push_str(&format!("{}/", period));
        }
        if !issuer.is_empty() {
            name.push_str(issuer);
            name.push(':');
        }
        name.push_str(account);
        name
    }
}

/// Everything PUT needs to register a credential
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct CredentialData<'l> {
    /// Full credential name
    pub name: &'l str,
    /// Raw shared secret
    pub secret: &'l [u8],
    /// HOTP or TOTP
    pub kind: Kind,
    /// HMAC algorithm
    pub algorithm: Algorithm,
    /// Number of digits of the codes
    pub digits: u8,
    /// Initial HOTP counter, only sent when positive
    pub counter: u32,
    /// Require a touch before each calculation
    pub touch_required: bool,
}

impl<'l> CredentialData<'l> {
    /// 6 digit TOTP/SHA1 credential, the most common setup
    pub fn new(name: &'l str, secret: &'l [u8]) -> Self {
        Self {
            name,
            secret,
            kind: Kind::Totp,
            algorithm: Algorithm::Sha1,
            digits: 6,
            counter: 0,
            touch_required: false,
        }
    }

    pub(crate) fn validate(&self) -> Result {
        ensure(
            !self.name.is_empty(),
            Error::ProtocolViolation("credential name must not be empty"),
        )?;
        ensure(
            matches!(self.kind, Kind::Hotp | Kind::Totp),
            Error::UnsupportedCredentialType,
        )
    }
}

impl fmt::Debug for CredentialData<'_> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("CredentialData")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("algorithm", &self.algorithm)
            .field("digits", &self.digits)
            .field("counter", &self.counter)
            .field("touch_required", &self.touch_required)
            .finish()
    }
}

/// A calculated code, or a placeholder for a credential that has to be calculated on its own
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Code {
    /// The credential the code belongs to
    pub credential: Credential,
    /// Formatted code, `None` for placeholders
    pub value: Option<String>,
    /// Start of the validity window (TOTP) or the request time (HOTP), in Unix seconds
    pub valid_from: i32,
    /// End of the validity window, 0 for HOTP codes which do not expire
    pub valid_to: i32,
}

impl Code {
    /// Code calculated at `seconds`
    pub fn new(credential: Credential, value: String, seconds: u64) -> Self {
        let mut code = Self::placeholder(credential, seconds);
        code.value = Some(value);
        code
    }

    /// Credential returned without a code, e.g. because it needs a touch
    pub fn placeholder(credential: Credential, seconds: u64) -> Self {
        let (valid_from, valid_to) = match credential.kind {
            Kind::Totp => calculate::validity_window(seconds, credential.period()),
            _ => (seconds as i32, 0),
        };
        Self {
            credential,
            value: None,
            valid_from,
            valid_to,
        }
    }

    /// Whether the code may be used at `seconds`
    pub fn is_valid_at(&self, seconds: u64) -> bool {
        if self.value.is_none() {
            return false;
        }
        let seconds = seconds as i64;
        match self.valid_to {
            0 => true,
            valid_to => i64::from(self.valid_from) <= seconds && seconds < i64::from(valid_to),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn totp(name: &str) -> Credential {
        Credential::new(name, Kind::Totp, Algorithm::Sha1, false)
    }

    #[test]
    fn name_parsing() {
        let steam = totp("Steam");
        assert_eq!(steam.issuer(), "Steam");
        assert_eq!(steam.account(), "");
        assert_eq!(steam.period(), 30);
        assert!(steam.is_steam());

        let long = totp("60/Example:alice@example.com");
        assert_eq!(long.period(), 60);
        assert_eq!(long.issuer(), "Example");
        assert_eq!(long.account(), "alice@example.com");
        assert!(!long.is_steam());

        let plain = totp("Example:alice");
        assert_eq!(plain.period(), 30);
        assert_eq!(plain.issuer(), "Example");
        assert_eq!(plain.account(), "alice");
    }

    #[test]
    fn name_parsing_edge_cases() {
        // a prefix which is not a period stays part of the name
        let path = totp("a/b:c");
        assert_eq!(path.period(), 30);
        assert_eq!(path.issuer(), "a/b");
        assert_eq!(path.account(), "c");

        assert_eq!(totp("0/x").period(), 30);
        assert_eq!(totp("Steam:a:b").account(), "a:b");
        // issuer match is case-sensitive
        assert!(!totp("steam").is_steam());
        assert!(totp("15/Steam:bob").is_steam());
    }

    #[test]
    fn name_building() {
        assert_eq!(
            Credential::format_name("Example", "alice", 30, Kind::Totp),
            "Example:alice"
        );
        assert_eq!(
            Credential::format_name("Example", "alice", 60, Kind::Totp),
            "60/Example:alice"
        );
        // HOTP names never carry a period
        assert_eq!(
            Credential::format_name("Example", "alice", 60, Kind::Hotp),
            "Example:alice"
        );
        assert_eq!(Credential::format_name("", "alice", 30, Kind::Totp), "alice");

        let name = Credential::format_name("Example", "alice@example.com", 15, Kind::Totp);
        let credential = totp(&name);
        assert_eq!(credential.period(), 15);
        assert_eq!(credential.issuer(), "Example");
        assert_eq!(credential.account(), "alice@example.com");
    }

    #[test]
    fn list_entries() {
        let credential = Credential::from_list_entry(b"\x21Example:alice").unwrap();
        assert_eq!(credential, totp("Example:alice"));

        let credential = Credential::from_list_entry(b"\x13counter").unwrap();
        assert_eq!(credential.kind, Kind::Hotp);
        assert_eq!(credential.algorithm, Algorithm::Sha512);

        assert!(matches!(
            Credential::from_list_entry(b""),
            Err(Error::ProtocolViolation(_))
        ));
        assert!(matches!(
            Credential::from_list_entry(b"\x25name"),
            Err(Error::ProtocolViolation(_))
        ));
        assert!(matches!(
            Credential::from_list_entry(b"\x21\xff\xfe"),
            Err(Error::ProtocolViolation(_))
        ));
    }

    #[test]
    fn code_validity() {
        let code = Code::new(totp("Example:alice"), "123456".into(), 59);
        assert_eq!((code.valid_from, code.valid_to), (30, 60));
        assert!(code.is_valid_at(30));
        assert!(code.is_valid_at(59));
        assert!(!code.is_valid_at(60));
        assert!(!code.is_valid_at(29));

        let hotp = Credential::new("counter", Kind::Hotp, Algorithm::Sha1, false);
        let code = Code::new(hotp.clone(), "123456".into(), 1000);
        assert_eq!((code.valid_from, code.valid_to), (1000, 0));
        assert!(code.is_valid_at(u32::MAX as u64));

        assert!(!Code::placeholder(hotp, 1000).is_valid_at(1000));
    }

    #[test]
    fn credential_data_checks() {
        assert!(CredentialData::new("Example:alice", b"secret").validate().is_ok());
        assert!(CredentialData::new("", b"secret").validate().is_err());
        let data = CredentialData {
            kind: Kind::Hmac,
            ..CredentialData::new("slot", b"secret")
        };
        assert_eq!(data.validate(), Err(Error::UnsupportedCredentialType));
        assert!(!format!("{:?}", data).contains("secret"));
    }
}
