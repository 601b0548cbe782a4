// Copyright (C) 2023 Nitrokey GmbH
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! PC/SC readers as [`Transport`].

use core::fmt;
use std::ffi::CString;

use pcsc::{Card, Context, Protocols, Scope, ShareMode, MAX_BUFFER_SIZE};

use crate::transport::{Session, Transport, RESPONSE_BUFFER_SIZE};
use crate::{Error, Result};

/// The PC/SC subsystem of the user's session
pub struct PcscTransport {
    context: Context,
}

impl fmt::Debug for PcscTransport {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("PcscTransport").finish_non_exhaustive()
    }
}

impl PcscTransport {
    /// Establish a PC/SC context
    pub fn establish() -> Result<Self> {
        let context = Context::establish(Scope::User)
            .map_err(|e| Error::ConnectionFailed(e.to_string()))?;
        Ok(Self { context })
    }
}

impl Transport for PcscTransport {
    type Session = PcscSession;

    fn list_readers(&self) -> Result<Vec<String>> {
        let length = match self.context.list_readers_len() {
            Ok(length) => length,
            Err(pcsc::Error::NoReadersAvailable) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut buffer = vec![0u8; length];
        let readers = match self.context.list_readers(&mut buffer) {
            Ok(readers) => readers,
            Err(pcsc::Error::NoReadersAvailable) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(readers
            .map(|name| name.to_string_lossy().into_owned())
            .collect())
    }

    fn connect(&self, reader: &str) -> Result<PcscSession> {
        let name = CString::new(reader)
            .map_err(|_| Error::ConnectionFailed(format!("invalid reader name {:?}", reader)))?;
        let card = self
            .context
            .connect(&name, ShareMode::Exclusive, Protocols::ANY)
            .map_err(|e| Error::ConnectionFailed(e.to_string()))?;
        info_now!("connected to {}", reader);
        Ok(PcscSession { card })
    }
}

/// A card claimed exclusively through PC/SC
pub struct PcscSession {
    card: Card,
}

impl fmt::Debug for PcscSession {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("PcscSession").finish_non_exhaustive()
    }
}

impl Session for PcscSession {
    fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>> {
        let mut buffer = [0u8; MAX_BUFFER_SIZE];
        debug_assert!(buffer.len() >= RESPONSE_BUFFER_SIZE);
        let response = self.card.transmit(command, &mut buffer)?;
        Ok(response.to_vec())
    }
}
