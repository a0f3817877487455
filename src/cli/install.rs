// SPDX-FileCopyrightText: Copyright © 2020-2026 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::path::PathBuf;
use std::sync::Arc;

use clap::{arg, ArgMatches, Command};
use modfw::Framework;
use thiserror::Error;

pub fn command() -> Command {
    Command::new("install")
        .about("Install a bundle")
        .long_about("Install a bundle from a location string, optionally copying content from a local file")
        .arg(arg!(<LOCATION> "bundle location, e.g. reference:file:/path/to/bundle").value_parser(clap::value_parser!(String)))
        .arg(arg!(--content <PATH> "path to the bundle content to copy in").value_parser(clap::value_parser!(PathBuf)).required(false))
}

/// Handle execution of `modfw install`
pub fn handle(args: &ArgMatches, framework: &Arc<Framework>) -> Result<(), Error> {
    let location = args.get_one::<String>("LOCATION").expect("required");
    let content = args
        .get_one::<PathBuf>("content")
        .map(fs_err::read)
        .transpose()?;

    let bundle = framework.install(location, content.as_deref())?;
    println!("installed bundle {} at {:?} (state {})", bundle.bundle_id, bundle.location, bundle.state);
    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not read content file: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Lifecycle(#[from] modfw::lifecycle::Error),
}
