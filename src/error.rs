// Copyright (C) 2023 Nitrokey GmbH
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error type shared by the codecs, the transport and the OATH engine.

use thiserror::Error;

use crate::apdu::StatusWord;

/// Result alias used throughout the crate
pub type Result<T = ()> = core::result::Result<T, Error>;

/// Every failure an operation of this crate can report
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    /// A TLV record is truncated, carries an unknown tag or an invalid length
    #[error("malformed TLV record")]
    MalformedTlv,

    /// The response APDU is shorter than its status word
    #[error("malformed response APDU")]
    MalformedResponse,

    /// The command data does not fit into a short APDU
    #[error("payload of {0} bytes does not fit into a short APDU")]
    PayloadTooLarge(usize),

    /// The device answered with an unexpected tag or shape
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    /// The device ended the exchange with a non-success status word
    #[error("unexpected status word {0}")]
    UnexpectedStatus(StatusWord),

    /// The access code was rejected.
    ///
    /// `status` is set when the device itself refused our response
    /// (`0x6984`), and empty when the device failed to prove knowledge of the key.
    #[error("authentication failed")]
    AuthenticationFailed {
        /// Status word reported by the device, if it rejected the response
        status: Option<StatusWord>,
    },

    /// A credential with the same name is already stored on the device
    #[error("credential {0:?} already exists")]
    CredentialExists(String),

    /// The credential kind can not be calculated by this client
    #[error("unsupported credential type")]
    UnsupportedCredentialType,

    /// The command needs the OATH application to be selected first
    #[error("OATH application is not selected")]
    NotSelected,

    /// Base32 input contains a character outside of the alphabet
    #[error("invalid Base32 character {0:?}")]
    InvalidCharacter(char),

    /// The operating system could not provide random bytes
    #[error("random number generator unavailable")]
    RandomUnavailable,

    /// The reader failed to exchange bytes with the card
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// The reader could not be connected
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
}

impl Error {
    /// Status word carried by the error, if the device reported one
    pub fn status(&self) -> Option<StatusWord> {
        match self {
            Error::UnexpectedStatus(status) => Some(*status),
            Error::AuthenticationFailed { status } => *status,
            _ => None,
        }
    }
}

#[cfg(feature = "pcsc")]
impl From<pcsc::Error> for Error {
    fn from(e: pcsc::Error) -> Self {
        Error::TransportFailure(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::UnexpectedStatus(StatusWord::AUTH_REQUIRED);
        assert_eq!(err.to_string(), "unexpected status word 6982");

        let err = Error::CredentialExists("Example:alice".into());
        assert!(err.to_string().contains("Example:alice"));
    }

    #[test]
    fn test_status_accessor() {
        let err = Error::AuthenticationFailed {
            status: Some(StatusWord::INCORRECT_RESPONSE),
        };
        assert_eq!(err.status(), Some(StatusWord(0x6984)));
        assert_eq!(Error::MalformedTlv.status(), None);
    }
}
