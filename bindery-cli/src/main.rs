// Copyright (c) The bindery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use bindery_cli::Args;
use clap::{ErrorKind, Parser};
use color_eyre::eyre::Result;

fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err)
            if err.kind() == ErrorKind::DisplayHelp || err.kind() == ErrorKind::DisplayVersion =>
        {
            err.print()?;
            return Ok(());
        }
        Err(err) => {
            // One line on stderr, per the driver contract.
            let message = err.to_string();
            eprintln!(
                "bindery: {}",
                message.lines().next().unwrap_or("invalid arguments")
            );
            std::process::exit(-1);
        }
    };

    std::process::exit(args.exec()?)
}
