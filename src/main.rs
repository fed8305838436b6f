// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The main visgen binary.

use clap::Parser;
use log::info;

use visgen::{Visgen, VisgenError};

fn main() {
    // Stolen from a Burntsushi. Run this program's main function and set an
    // exit code if an error was returned.
    std::process::exit(match try_main() {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {e}");
            1
        }
    });
}

fn try_main() -> Result<(), VisgenError> {
    Visgen::parse().run()?;

    info!("visgen complete.");
    Ok(())
}
