// Copyright (C) 2023 Nitrokey GmbH
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! RFC 4648 Base32, the usual text form of OTP secrets.

use crate::{Error, Result};

const ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";
const PADDING: char = '=';

/// Encode `bytes`, padding the output with `=` to a multiple of 8 characters
pub fn encode(bytes: &[u8]) -> String {
    let mut encoded = String::with_capacity((bytes.len() + 4) / 5 * 8);
    for chunk in bytes.chunks(5) {
        let mut block = [0u8; 5];
        block[..chunk.len()].copy_from_slice(chunk);
        let bits = block
            .iter()
            .fold(0u64, |acc, &byte| (acc << 8) | u64::from(byte));

        // 8 bits per input byte, rounded up to whole 5 bit symbols
        let symbols = (chunk.len() * 8 + 4) / 5;
        for i in 0..8 {
            if i < symbols {
                let index = (bits >> (35 - 5 * i)) & 0x1f;
                encoded.push(ALPHABET[index as usize] as char);
            } else {
                encoded.push(PADDING);
            }
        }
    }
    encoded
}

fn symbol_value(c: char) -> Result<u8> {
    match c {
        'A'..='Z' => Ok(c as u8 - b'A'),
        'a'..='z' => Ok(c as u8 - b'a'),
        '2'..='7' => Ok(c as u8 - b'2' + 26),
        _ => Err(Error::InvalidCharacter(c)),
    }
}

/// Decode Base32 text, ignoring letter case and trailing `=` padding
pub fn decode(text: &str) -> Result<Vec<u8>> {
    let text = text.trim_end_matches(PADDING);
    let mut decoded = Vec::with_capacity(text.len() * 5 / 8);
    let mut buffer = 0u32;
    let mut bits = 0u32;
    for c in text.chars() {
        buffer = (buffer << 5) | u32::from(symbol_value(c)?);
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            decoded.push((buffer >> bits) as u8);
            buffer &= (1 << bits) - 1;
        }
    }
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc4648_vectors() {
        for (plain, encoded) in [
            ("", ""),
            ("f", "MY======"),
            ("fo", "MZXQ===="),
            ("foo", "MZXW6==="),
            ("foob", "MZXW6YQ="),
            ("fooba", "MZXW6YTB"),
            ("foobar", "MZXW6YTBOI======"),
        ] {
            assert_eq!(encode(plain.as_bytes()), encoded);
            assert_eq!(decode(encoded).unwrap(), plain.as_bytes());
        }
    }

    #[test]
    fn round_trip() {
        for length in 1..=50usize {
            let bytes: Vec<u8> = (0..length)
                .map(|i| (i as u8).wrapping_mul(37).wrapping_add(length as u8))
                .collect();
            let encoded = encode(&bytes);
            assert_eq!(encoded.len() % 8, 0);
            assert_eq!(decode(&encoded).unwrap(), bytes);
        }
    }

    #[test]
    fn case_insensitive() {
        assert_eq!(
            decode("jbswy3dpehpk3pxp").unwrap(),
            decode("JBSWY3DPEHPK3PXP").unwrap()
        );
        assert_eq!(decode("JBSWY3DPEHPK3PXP").unwrap(), b"Hello!\xde\xad\xbe\xef");
    }

    #[test]
    fn rejects_characters_outside_alphabet() {
        assert_eq!(decode("JBSWY3DP1"), Err(Error::InvalidCharacter('1')));
        assert_eq!(decode("0BSWY3DP"), Err(Error::InvalidCharacter('0')));
        assert_eq!(decode("JBSW Y3DP"), Err(Error::InvalidCharacter(' ')));
        // padding is only stripped from the end
        assert_eq!(decode("MY==MY=="), Err(Error::InvalidCharacter('=')));
    }
}
