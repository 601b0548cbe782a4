// Copyright (C) 2023 Nitrokey GmbH
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

#![warn(
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    non_ascii_idents,
    trivial_casts,
    unused,
    unused_qualifications,
    clippy::expect_used,
    clippy::unwrap_used
)]
#![deny(unsafe_code)]

//! OATH Client talks to the YKOATH application of a smart card token.
//!
//! It encodes the APDU and TLV framing, follows response chaining,
//! authenticates with the access code, and manages and calculates
//! HOTP/TOTP credentials stored on the device.
//! The reader itself is abstracted behind the [`transport::Session`] trait;
//! the `pcsc` feature provides an implementation for PC/SC readers.

#[macro_use]
extern crate delog;
generate_macros!();

#[macro_use(hex)]
extern crate hex_literal;

pub mod apdu;
pub mod applet;
pub mod base32;
mod calculate;
/// This is the main module, containing the OATH protocol engine.
pub mod client;
mod command;
pub mod credential;
mod crypto;
pub mod error;
pub mod oath;
#[cfg(feature = "pcsc")]
pub mod reader;
mod state;
pub mod tlv;
pub mod transport;

pub use apdu::{Apdu, Response, StatusWord};
pub use calculate::{bulk_action, needs_touch_probe_workaround, BulkAction, DEFAULT_PERIOD};
pub use client::{OathClient, Options};
pub use credential::{Code, Credential, CredentialData};
pub use error::{Error, Result};
pub use state::{DeviceIdentity, OathVersion, Phase};

/// This is the application id, which allows to select the OATH application
pub const YUBICO_OATH_AID: &[u8] = &hex!("A000000527 210101");

/// Salt iterations of the access code key derivation
pub const PBKDF2_ITERATIONS: u32 = 1000;

/// Length of the challenges exchanged during authentication
pub const CHALLENGE_LENGTH: usize = 8;

fn ensure<T>(cond: bool, err: T) -> core::result::Result<(), T> {
    match cond {
        true => Ok(()),
        false => Err(err),
    }
}
