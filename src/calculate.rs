// Copyright (C) 2023 Nitrokey GmbH
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Challenges and code formatting for CALCULATE and CALCULATE ALL.

use std::time::{Duration, SystemTime};

use crate::credential::Credential;
use crate::oath::Tag;
use crate::state::OathVersion;
use crate::{ensure, Error, Result};

/// Time step of TOTP credentials without a `period/` prefix
pub const DEFAULT_PERIOD: u32 = 30;

const STEAM_CHARS: &[u8; 26] = b"23456789BCDFGHJKMNPQRTVWXY";
const STEAM_CODE_LENGTH: usize = 5;

/// Seconds since the Unix epoch, with times before it clamped to 0
pub fn unix_seconds(time: SystemTime) -> u64 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .as_ref()
        .map_or(0, Duration::as_secs)
}

/// 8 byte big-endian challenge with the time step in the low 4 bytes
pub fn time_challenge(seconds: u64, period: u32) -> [u8; 8] {
    let step = seconds / u64::from(period.max(1));
    let mut challenge = [0u8; 8];
    challenge[4..].copy_from_slice(&(step as u32).to_be_bytes());
    challenge
}

/// Start and end of the time step containing `seconds`
pub fn validity_window(seconds: u64, period: u32) -> (i32, i32) {
    let period = u64::from(period.max(1));
    let valid_from = seconds - seconds % period;
    (valid_from as i32, (valid_from + period) as i32)
}

/// Split a TRUNCATED_RESPONSE value into digits and the 31 bit code value
///
/// Layout: `digits | 4 byte big-endian dynamically truncated HMAC`
pub fn parse_truncated(value: &[u8]) -> Result<(u8, u32)> {
    ensure(
        value.len() == 5,
        Error::ProtocolViolation("truncated response must be 5 bytes"),
    )?;
    let code = u32::from_be_bytes([value[1], value[2], value[3], value[4]]) & 0x7fff_ffff;
    Ok((value[0], code))
}

/// `value mod 10^digits`, left padded with zeros
pub fn format_code(value: u32, digits: u8) -> String {
    let code = match 10u64.checked_pow(u32::from(digits)) {
        Some(modulus) => u64::from(value) % modulus,
        None => u64::from(value),
    };
    format!("{:0width$}", code, width = digits as usize)
}

/// Five characters of the Steam Guard alphabet, in the order they are produced
pub fn format_steam(mut value: u32) -> String {
    let base = STEAM_CHARS.len() as u32;
    let mut code = String::with_capacity(STEAM_CODE_LENGTH);
    for _ in 0..STEAM_CODE_LENGTH {
        code.push(STEAM_CHARS[(value % base) as usize] as char);
        value /= base;
    }
    code
}

/// Firmware 4.2.0 up to 4.2.6 hangs on CALCULATE of a touch credential,
/// unless another command was sent right before it.
pub fn needs_touch_probe_workaround(version: OathVersion) -> bool {
    (OathVersion::new(4, 2, 0)..=OathVersion::new(4, 2, 6)).contains(&version)
}

/// What to do with one entry of a CALCULATE ALL response
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BulkAction {
    /// Return the credential without a code, it has to be calculated on its own
    Placeholder,
    /// The bulk value assumed the wrong period or format, calculate it again
    Recalculate,
    /// Format the bulk value
    Format,
}

/// Decide how to treat a CALCULATE ALL entry, given the tag of its value
/// and the credential parsed from its name.
///
/// The device computes bulk codes for the default period, and knows
/// nothing about Steam formatting.
pub fn bulk_action(tag: Tag, credential: &Credential) -> Result<BulkAction> {
    match tag {
        Tag::Touch | Tag::Hotp => Ok(BulkAction::Placeholder),
        Tag::TruncatedResponse => {
            if credential.period() != DEFAULT_PERIOD || credential.is_steam() {
                Ok(BulkAction::Recalculate)
            } else {
                Ok(BulkAction::Format)
            }
        }
        Tag::Response => Err(Error::ProtocolViolation(
            "full response in calculate all",
        )),
        _ => Err(Error::ProtocolViolation("unexpected tag in calculate all")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oath::{Algorithm, Kind};

    fn totp(name: &str) -> Credential {
        Credential::new(name, Kind::Totp, Algorithm::Sha1, false)
    }

    #[test]
    fn code_formatting() {
        assert_eq!(format_code(1234567, 6), "234567");
        assert_eq!(format_code(42, 8), "00000042");
        assert_eq!(format_code(0x7fff_ffff, 10), "2147483647");
    }

    #[test]
    fn steam_formatting() {
        assert_eq!(format_steam(0), "22222");
        // 1 + 2 * 26 picks the second character, then the third
        assert_eq!(format_steam(1 + 2 * 26), "34222");
        let code = format_steam(0x7fff_ffff);
        assert_eq!(code.len(), 5);
        assert!(code.bytes().all(|c| STEAM_CHARS.contains(&c)));
    }

    #[test]
    fn truncated_values() {
        assert_eq!(
            parse_truncated(&hex!("06 5A D0 A7 CA")).unwrap(),
            (6, 0x5ad0a7ca)
        );
        // the top bit is masked
        assert_eq!(
            parse_truncated(&hex!("08 FF FF FF FF")).unwrap(),
            (8, 0x7fff_ffff)
        );
        assert!(matches!(
            parse_truncated(&hex!("06 5A D0 A7")),
            Err(Error::ProtocolViolation(_))
        ));
    }

    #[test]
    fn challenges() {
        assert_eq!(time_challenge(59, 30), hex!("00 00 00 00 00 00 00 01"));
        assert_eq!(
            time_challenge(1_111_111_109, 30),
            hex!("00 00 00 00 02 35 23 EC")
        );
        assert_eq!(time_challenge(119, 60), hex!("00 00 00 00 00 00 00 01"));
        assert_eq!(validity_window(59, 30), (30, 60));
        assert_eq!(validity_window(60, 30), (60, 90));
    }

    #[test]
    fn touch_probe_range() {
        assert!(!needs_touch_probe_workaround(OathVersion::new(4, 1, 9)));
        assert!(needs_touch_probe_workaround(OathVersion::new(4, 2, 0)));
        assert!(needs_touch_probe_workaround(OathVersion::new(4, 2, 6)));
        assert!(!needs_touch_probe_workaround(OathVersion::new(4, 2, 7)));
        assert!(!needs_touch_probe_workaround(OathVersion::new(5, 4, 3)));
    }

    #[test]
    fn bulk_decisions() {
        let default = totp("Example:alice");
        assert_eq!(
            bulk_action(Tag::TruncatedResponse, &default),
            Ok(BulkAction::Format)
        );
        assert_eq!(
            bulk_action(Tag::TruncatedResponse, &totp("60/Example:alice")),
            Ok(BulkAction::Recalculate)
        );
        assert_eq!(
            bulk_action(Tag::TruncatedResponse, &totp("Steam:bob")),
            Ok(BulkAction::Recalculate)
        );
        assert_eq!(
            bulk_action(Tag::Touch, &default),
            Ok(BulkAction::Placeholder)
        );
        assert_eq!(bulk_action(Tag::Hotp, &default), Ok(BulkAction::Placeholder));
        assert!(matches!(
            bulk_action(Tag::Response, &default),
            Err(Error::ProtocolViolation(_))
        ));
        assert!(matches!(
            bulk_action(Tag::Name, &default),
            Err(Error::ProtocolViolation(_))
        ));
    }
}
