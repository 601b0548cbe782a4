// Copyright (C) 2023 Nitrokey GmbH
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::oath::Algorithm;
use crate::{Error, Result, CHALLENGE_LENGTH, PBKDF2_ITERATIONS};

/// Keys shorter than this are padded with null bytes before PUT
pub const MINIMUM_KEY_LENGTH: usize = 14;

/// Length of the access code key
pub const ACCESS_KEY_LENGTH: usize = 16;

pub fn hmac_sha1(key: &[u8], message: &[u8]) -> [u8; 20] {
    #[allow(clippy::expect_used)]
    let mut mac = Hmac::<Sha1>::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(message);
    mac.finalize().into_bytes().into()
}

/// Access code key: PBKDF2-HMAC-SHA1 over the device salt
pub fn derive_key(password: &str, salt: &[u8]) -> Zeroizing<[u8; ACCESS_KEY_LENGTH]> {
    Zeroizing::new(pbkdf2::pbkdf2_hmac_array::<Sha1, ACCESS_KEY_LENGTH>(
        password.as_bytes(),
        salt,
        PBKDF2_ITERATIONS,
    ))
}

/// What we send in PUT may not be the raw secret, but K' in HMAC lingo:
/// if the secret exceeds the block size (64B for Sha1/Sha256, 128B for Sha512)
/// it is replaced by its hash. The result is padded to at least 14B with null bytes,
/// which does not change the MAC.
pub fn shorten_key(secret: &[u8], algorithm: Algorithm) -> Zeroizing<Vec<u8>> {
    let mut key = Zeroizing::new(if secret.len() > algorithm.block_size() {
        algorithm.digest(secret)
    } else {
        secret.to_vec()
    });
    if key.len() < MINIMUM_KEY_LENGTH {
        key.resize(MINIMUM_KEY_LENGTH, 0);
    }
    key
}

/// Stable device identifier, derived from the salt reported on SELECT
pub fn device_id(salt: &[u8]) -> String {
    let hash = Sha256::digest(salt);
    let encoded = general_purpose::STANDARD.encode(&hash[hash.len() - 16..]);
    encoded.trim_end_matches('=').to_owned()
}

pub fn random_challenge() -> Result<[u8; CHALLENGE_LENGTH]> {
    let mut challenge = [0u8; CHALLENGE_LENGTH];
    getrandom::getrandom(&mut challenge).map_err(|_err| {
        error_now!("random bytes unavailable: {:?}", _err);
        Error::RandomUnavailable
    })?;
    Ok(challenge)
}

/// Constant time comparison of HMAC responses
pub fn verify(expected: &[u8], received: &[u8]) -> bool {
    expected.ct_eq(received).into()
}
