// SPDX-FileCopyrightText: Copyright © 2020-2026 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::sync::Arc;

use clap::{arg, ArgMatches, Command};
use modfw::bundle::BundleId;
use modfw::Framework;
use thiserror::Error;

pub fn command() -> Command {
    Command::new("start")
        .about("Start a bundle")
        .long_about("Resolve and start a bundle, recording the persistent state as active")
        .arg(arg!(<ID> "bundle id").value_parser(clap::value_parser!(u64)))
}

/// Handle execution of `modfw start`
pub fn handle(args: &ArgMatches, framework: &Arc<Framework>) -> Result<(), Error> {
    let id = BundleId(*args.get_one::<u64>("ID").expect("required"));
    framework.start(id, true)?;
    println!("bundle {id} started");
    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Lifecycle(#[from] modfw::lifecycle::Error),
}
