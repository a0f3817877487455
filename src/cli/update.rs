// SPDX-FileCopyrightText: Copyright © 2020-2026 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::path::PathBuf;
use std::sync::Arc;

use clap::{arg, ArgMatches, Command};
use modfw::bundle::BundleId;
use modfw::Framework;
use thiserror::Error;

pub fn command() -> Command {
    Command::new("update")
        .about("Update a bundle to a new revision")
        .long_about("Append a new revision to a bundle's archive and rebuild its module")
        .arg(arg!(<ID> "bundle id").value_parser(clap::value_parser!(u64)))
        .arg(arg!(--content <PATH> "path to the new revision's content").value_parser(clap::value_parser!(PathBuf)).required(false))
}

/// Handle execution of `modfw update`
pub fn handle(args: &ArgMatches, framework: &Arc<Framework>) -> Result<(), Error> {
    let id = BundleId(*args.get_one::<u64>("ID").expect("required"));
    let content = args
        .get_one::<PathBuf>("content")
        .map(fs_err::read)
        .transpose()?;

    framework.update(id, content.as_deref())?;
    println!("bundle {id} updated");
    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not read content file: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Lifecycle(#[from] modfw::lifecycle::Error),
}
