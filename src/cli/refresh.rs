// SPDX-FileCopyrightText: Copyright © 2020-2026 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::sync::Arc;

use clap::{Arg, ArgAction, ArgMatches, Command};
use modfw::bundle::BundleId;
use modfw::Framework;
use thiserror::Error;

pub fn command() -> Command {
    Command::new("refresh")
        .about("Refresh packages")
        .long_about("Drop stale revisions of the given bundles (or, with none given, every bundle that has any) and restart their dependency closure")
        .arg(
            Arg::new("ID")
                .help("bundle ids to refresh; omit to refresh every bundle with a pending revision")
                .action(ArgAction::Append)
                .value_parser(clap::value_parser!(u64)),
        )
}

/// Handle execution of `modfw refresh`
pub fn handle(args: &ArgMatches, framework: &Arc<Framework>) -> Result<(), Error> {
    let ids: Vec<BundleId> = args.get_many::<u64>("ID").into_iter().flatten().copied().map(BundleId).collect();

    let targets = if ids.is_empty() { None } else { Some(ids.as_slice()) };
    framework.refresh_packages(targets)?;
    println!("refresh complete");
    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Refresh(#[from] modfw::refresh::Error),
}
