// Copyright (C) 2023 Nitrokey GmbH
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A card replaying fuzzer provided responses, and a session driving the client against it.

use std::fmt::Debug;
use std::time::{Duration, UNIX_EPOCH};

use oath_client::transport::Session;
use oath_client::{CredentialData, Error, OathClient, Options, Result};

pub fn parse(data: &[u8]) -> Vec<&[u8]> {
    // Parse incoming data into slices from format:
    // Size N (1 bytes)
    // Value (N bytes)

    let mut res = Vec::with_capacity(100);
    if data.len() < 2 || data.len() > 1024 * 1024 {
        // Too big or too small data found at this point. Skip it.
        return vec![];
    }

    let mut data = data;
    loop {
        if 2 >= data.len() {
            break;
        }
        let (size, rest) = data.split_at(1);
        data = rest;

        let size = size[0] as usize;
        if size >= data.len() {
            break;
        }
        let (v, rest) = data.split_at(size);
        data = rest;
        res.push(v);
    }
    res
}

/// Answers every command with the next recorded response
pub struct Scripted<'a> {
    responses: std::vec::IntoIter<&'a [u8]>,
    verbose: bool,
}

impl<'a> Scripted<'a> {
    pub fn new(responses: Vec<&'a [u8]>, verbose: bool) -> Self {
        Self {
            responses: responses.into_iter(),
            verbose,
        }
    }
}

impl Session for Scripted<'_> {
    fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>> {
        if self.verbose {
            println!(">>> {:02X?}", command);
        }
        let response = self
            .responses
            .next()
            .ok_or_else(|| Error::TransportFailure("script exhausted".into()))?;
        if self.verbose {
            println!("<<< {:02X?}", response);
        }
        Ok(response.to_vec())
    }
}

fn report<T: Debug>(verbose: bool, operation: &str, result: &Result<T>) {
    if verbose {
        println!("{}: {:?}", operation, result);
    }
}

/// Run a typical session against the responses in `data`
pub fn run(data: &[u8], verbose: bool) {
    let session = Scripted::new(parse(data), verbose);
    let mut client = OathClient::new(session, Options::default());

    let selected = client.select().map(Clone::clone);
    report(verbose, "select", &selected);
    if selected.is_err() {
        return;
    }
    report(verbose, "validate", &client.validate("password"));
    report(verbose, "list", &client.list());

    let time = Some(UNIX_EPOCH + Duration::from_secs(59));
    let codes = client.calculate_all(time);
    report(verbose, "calculate all", &codes);
    for code in codes.unwrap_or_default() {
        report(verbose, "calculate", &client.calculate(&code.credential, time));
    }

    let data = CredentialData::new("Example:fuzz", b"12345678901234567890");
    report(verbose, "put", &client.put(&data));
    report(verbose, "rename", &client.rename("Example:fuzz", "Other:fuzz"));
    report(verbose, "delete", &client.delete("Other:fuzz"));
    report(verbose, "set code", &client.set_code("password"));
    report(verbose, "reset", &client.reset());
}
