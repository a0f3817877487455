// SPDX-FileCopyrightText: Copyright © 2020-2026 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::sync::Arc;

use clap::{arg, ArgMatches, Command};
use modfw::bundle::BundleId;
use modfw::Framework;
use thiserror::Error;

pub fn command() -> Command {
    Command::new("startlevel")
        .about("Get or set start levels")
        .subcommand_required(true)
        .subcommand(Command::new("get").about("Print the framework's current start level"))
        .subcommand(Command::new("set").about("Set the framework's start level").arg(arg!(<LEVEL> "target start level").value_parser(clap::value_parser!(i32))))
        .subcommand(
            Command::new("set-bundle")
                .about("Set one bundle's start level")
                .arg(arg!(<ID> "bundle id").value_parser(clap::value_parser!(u64)))
                .arg(arg!(<LEVEL> "start level").value_parser(clap::value_parser!(i32))),
        )
}

/// Handle execution of `modfw startlevel`
pub fn handle(args: &ArgMatches, framework: &Arc<Framework>) -> Result<(), Error> {
    match args.subcommand() {
        Some(("get", _)) => {
            println!("framework start level: {}", framework.framework_start_level());
            Ok(())
        }
        Some(("set", sub)) => {
            let level = *sub.get_one::<i32>("LEVEL").expect("required");
            framework.set_framework_start_level(level)?;
            println!("framework start level set to {level}");
            Ok(())
        }
        Some(("set-bundle", sub)) => {
            let id = BundleId(*sub.get_one::<u64>("ID").expect("required"));
            let level = *sub.get_one::<i32>("LEVEL").expect("required");
            framework.set_bundle_start_level(id, level)?;
            println!("bundle {id} start level set to {level}");
            Ok(())
        }
        _ => unreachable!(),
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Framework(#[from] modfw::framework::Error),
}
