// SPDX-FileCopyrightText: Copyright © 2020-2026 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::sync::Arc;

use clap::{arg, ArgMatches, Command};
use modfw::bundle::BundleId;
use modfw::Framework;
use thiserror::Error;

pub fn command() -> Command {
    Command::new("stop")
        .about("Stop a bundle")
        .long_about("Stop a bundle, recording the persistent state as installed (not active)")
        .arg(arg!(<ID> "bundle id").value_parser(clap::value_parser!(u64)))
}

/// Handle execution of `modfw stop`
pub fn handle(args: &ArgMatches, framework: &Arc<Framework>) -> Result<(), Error> {
    let id = BundleId(*args.get_one::<u64>("ID").expect("required"));
    framework.stop(id, true)?;
    println!("bundle {id} stopped");
    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Lifecycle(#[from] modfw::lifecycle::Error),
}
