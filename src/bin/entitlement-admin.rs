// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::process::ExitCode;

use accessmate_entitlements::cli::{self, exit_codes, Cli};
use accessmate_entitlements::logging;
use clap::error::ErrorKind;
use clap::Parser;

fn main() -> ExitCode {
    logging::init_for_cli();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => exit_codes::SUCCESS,
                _ => exit_codes::USAGE,
            };
            let _ = err.print();
            return ExitCode::from(code);
        }
    };

    cli::run(cli)
}
