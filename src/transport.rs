// Copyright (C) 2023 Nitrokey GmbH
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Exchange of APDUs with a card, including response chaining.

use core::convert::TryFrom;

use crate::apdu::{Apdu, Response};
use crate::command::{Command, Select};
use crate::{Error, Result};

/// Response buffer size expected from transports: 256 data bytes and the status word
pub const RESPONSE_BUFFER_SIZE: usize = 258;

/// A connected card, exchanging raw frames
pub trait Session {
    /// Send one command frame and return the raw response, status word included
    fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>>;
}

impl<S: Session + ?Sized> Session for &mut S {
    fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>> {
        (**self).transmit(command)
    }
}

impl<S: Session + ?Sized> Session for Box<S> {
    fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>> {
        (**self).transmit(command)
    }
}

/// Reader subsystem handing out sessions
pub trait Transport {
    /// Session type of connected readers
    type Session: Session;

    /// Names of the readers currently attached
    fn list_readers(&self) -> Result<Vec<String>>;

    /// Connect to the reader called `reader`, claiming it exclusively
    fn connect(&self, reader: &str) -> Result<Self::Session>;
}

/// Sends commands over a [`Session`], following response chaining
#[derive(Debug)]
pub struct Connection<S> {
    session: S,
}

impl<S: Session> Connection<S> {
    /// Wrap a session
    pub fn new(session: S) -> Self {
        Self { session }
    }

    /// Give the session back
    pub fn into_inner(self) -> S {
        self.session
    }

    /// Access the session
    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    /// Transmit a single frame, without looking at the status word
    pub fn transmit_raw(&mut self, apdu: &Apdu) -> Result<Response> {
        let raw = apdu.encode()?;
        debug_now!("> {:?}", apdu);
        let response = Response::decode(&self.session.transmit(&raw)?)?;
        debug_now!("< {} bytes, {}", response.data.len(), response.status);
        Ok(response)
    }

    /// Send `apdu`, fetching continuation frames while the device reports `61xx`.
    ///
    /// The data of all frames is concatenated in order, and the status word is
    /// the one of the last frame. Anything but success is reported as
    /// [`Error::UnexpectedStatus`].
    pub fn send(&mut self, apdu: &Apdu) -> Result<Response> {
        let mut response = self.transmit_raw(apdu)?;
        if response.status.remaining().is_some() {
            let send_remaining = Apdu::try_from(Command::SendRemaining)?;
            while let Some(_remaining) = response.status.remaining() {
                debug_now!("{} more bytes waiting", _remaining);
                let next = self.transmit_raw(&send_remaining)?;
                response.data.extend_from_slice(&next.data);
                response.status = next.status;
            }
        }

        if !response.status.is_success() {
            info_now!("command failed with {}", response.status);
            return Err(Error::UnexpectedStatus(response.status));
        }
        Ok(response)
    }

    /// SELECT the application `aid`
    pub fn select_applet(&mut self, aid: &[u8]) -> Result<Response> {
        let apdu = Apdu::try_from(Command::Select(Select { aid }))?;
        self.send(&apdu)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::apdu::StatusWord;

    /// Replays canned responses and records what was sent
    #[derive(Default)]
    struct Replay {
        responses: VecDeque<Vec<u8>>,
        sent: Vec<Vec<u8>>,
    }

    impl Replay {
        fn new(responses: &[&[u8]]) -> Self {
            Self {
                responses: responses.iter().map(|r| r.to_vec()).collect(),
                sent: Vec::new(),
            }
        }
    }

    impl Session for Replay {
        fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>> {
            self.sent.push(command.to_vec());
            self.responses
                .pop_front()
                .ok_or_else(|| Error::TransportFailure("no response".into()))
        }
    }

    #[test]
    fn chained_response_is_reassembled() {
        let mut connection = Connection::new(Replay::new(&[
            &hex!("01 02 61 03"),
            &hex!("03 04 61 02"),
            &hex!("05 61 01"),
            &hex!("06 90 00"),
        ]));
        let response = connection.send(&Apdu::new(0xa1, 0, 0)).unwrap();
        assert_eq!(response.data, hex!("01 02 03 04 05 06"));
        assert_eq!(response.status, StatusWord::SUCCESS);

        let sent = &connection.session_mut().sent;
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[0], hex!("00 A1 00 00 00"));
        for continuation in &sent[1..] {
            assert_eq!(continuation, &hex!("00 A5 00 00 00"));
        }
    }

    #[test]
    fn final_status_is_checked() {
        let mut connection = Connection::new(Replay::new(&[&hex!("01 61 01"), &hex!("69 82")]));
        assert_eq!(
            connection.send(&Apdu::new(0xa1, 0, 0)),
            Err(Error::UnexpectedStatus(StatusWord::AUTH_REQUIRED))
        );
    }

    #[test]
    fn raw_transmit_keeps_status() {
        let mut connection = Connection::new(Replay::new(&[&hex!("6D 00")]));
        let response = connection.transmit_raw(&Apdu::new(0xa5, 0, 0)).unwrap();
        assert_eq!(response.status, StatusWord::INVALID_INSTRUCTION);
    }

    #[test]
    fn transport_errors_propagate() {
        let mut connection = Connection::new(Replay::default());
        assert!(matches!(
            connection.select_applet(crate::YUBICO_OATH_AID),
            Err(Error::TransportFailure(_))
        ));
        assert_eq!(
            connection.into_inner().sent[0],
            hex!("00 A4 04 00 08 A0 00 00 05 27 21 01 01 00")
        );
    }

    #[test]
    fn malformed_frames() {
        let mut connection = Connection::new(Replay::new(&[&hex!("90")]));
        assert_eq!(
            connection.send(&Apdu::new(0xa1, 0, 0)),
            Err(Error::MalformedResponse)
        );
    }
}
