// SPDX-FileCopyrightText: Copyright © 2020-2026 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Arg, ArgAction, Command};
use thiserror::Error;

use modfw::{Framework, FrameworkConfig};

mod install;
mod list;
mod refresh;
mod start;
mod startlevel;
mod stop;
mod uninstall;
mod update;
mod version;

/// Generate the CLI command structure
fn command() -> Command {
    Command::new("modfw")
        .about("Bundle lifecycle container")
        .arg(
            Arg::new("version")
                .short('v')
                .long("version")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("root")
                .short('D')
                .long("directory")
                .global(true)
                .help("Cache root directory")
                .action(ArgAction::Set)
                .default_value("/var/lib/modfw"),
        )
        .arg_required_else_help(true)
        .subcommand(install::command())
        .subcommand(start::command())
        .subcommand(stop::command())
        .subcommand(update::command())
        .subcommand(uninstall::command())
        .subcommand(list::command())
        .subcommand(refresh::command())
        .subcommand(startlevel::command())
        .subcommand(version::command())
}

/// Builds the framework over the resolved cache root, rooted at the global
/// `--directory` flag, and brings it to its configured start level.
fn open_framework(matches: &clap::ArgMatches) -> Result<Arc<Framework>, Error> {
    let root: PathBuf = matches.get_one::<String>("root").expect("has default").into();
    let config = FrameworkConfig::load_or_default(&root);
    let framework = Framework::new(&root, config)?;
    framework.init()?;
    framework.start_framework()?;
    Ok(framework)
}

/// Process all CLI arguments
pub fn process() -> Result<(), Error> {
    let matches = command().get_matches();
    if matches.get_flag("version") {
        version::print();
        return Ok(());
    }
    match matches.subcommand() {
        Some(("install", args)) => install::handle(args, &open_framework(&matches)?).map_err(Error::Install),
        Some(("start", args)) => start::handle(args, &open_framework(&matches)?).map_err(Error::Start),
        Some(("stop", args)) => stop::handle(args, &open_framework(&matches)?).map_err(Error::Stop),
        Some(("update", args)) => update::handle(args, &open_framework(&matches)?).map_err(Error::Update),
        Some(("uninstall", args)) => uninstall::handle(args, &open_framework(&matches)?).map_err(Error::Uninstall),
        Some(("list", args)) => list::handle(args, &open_framework(&matches)?).map_err(Error::List),
        Some(("refresh", args)) => refresh::handle(args, &open_framework(&matches)?).map_err(Error::Refresh),
        Some(("startlevel", args)) => startlevel::handle(args, &open_framework(&matches)?).map_err(Error::StartLevel),
        Some(("version", _)) => {
            version::print();
            Ok(())
        }
        _ => unreachable!(),
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("error opening framework: {0}")]
    Framework(#[from] modfw::framework::Error),

    #[error("error installing bundle: {0}")]
    Install(#[from] install::Error),

    #[error("error starting bundle: {0}")]
    Start(#[from] start::Error),

    #[error("error stopping bundle: {0}")]
    Stop(#[from] stop::Error),

    #[error("error updating bundle: {0}")]
    Update(#[from] update::Error),

    #[error("error uninstalling bundle: {0}")]
    Uninstall(#[from] uninstall::Error),

    #[error("error listing bundles: {0}")]
    List(#[from] list::Error),

    #[error("error refreshing bundles: {0}")]
    Refresh(#[from] refresh::Error),

    #[error("error changing start level: {0}")]
    StartLevel(#[from] startlevel::Error),
}
