#![no_main]

// Copyright (C) 2023 Nitrokey GmbH
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use libfuzzer_sys::fuzz_target;

mod scripted;

fuzz_target!(|data: &[u8]| {
    let _ = oath_client::tlv::Tlv::parse_all(data);
    let _ = oath_client::Response::decode(data);
    scripted::run(data, false);
});
