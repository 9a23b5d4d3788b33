// Copyright (c) The bindery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process-isolated inspection helper.
//!
//! Reads one module file and writes the wire-encoded record to standard
//! output; the parent process decodes it with `bindery::wire`. Exits 0 on
//! success and -1 on a usage error.

use bindery::{wire, Analyzer, Error};
use camino::Utf8PathBuf;
use std::io::Write;

fn main() {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let path = match (args.next(), args.next()) {
        (Some(path), None) => Utf8PathBuf::from(path),
        _ => {
            eprintln!("usage: bindery-bridge <FILE>");
            std::process::exit(-1);
        }
    };

    match inspect(&path) {
        Ok(encoded) => {
            if let Err(err) = std::io::stdout().write_all(&encoded) {
                eprintln!("bindery-bridge: failed to write output: {}", err);
                std::process::exit(-1);
            }
        }
        Err(err) => {
            eprintln!("bindery-bridge: {}", err);
            std::process::exit(-1);
        }
    }
}

fn inspect(path: &Utf8PathBuf) -> Result<Vec<u8>, Error> {
    let analyzer = Analyzer::new()?;
    let module = analyzer.inspect_cached(path, None)?;
    Ok(wire::encode_module(&module))
}
