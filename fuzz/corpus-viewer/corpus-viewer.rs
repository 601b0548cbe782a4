// Copyright (C) 2023 Nitrokey GmbH
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::fs;

use clap::Parser;

#[path = "../fuzz_targets/scripted.rs"]
mod scripted;

#[derive(Parser, Debug)]
#[clap(about, version, author)]
struct Args {
    #[clap(short, long)]
    file_name: String,
}

fn main() -> std::io::Result<()> {
    pretty_env_logger::init();
    let args = Args::parse();

    let data = fs::read(args.file_name)?;
    scripted::run(&data, true);
    Ok(())
}
