// SPDX-FileCopyrightText: Copyright © 2020-2026 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::sync::Arc;

use clap::{ArgMatches, Command};
use modfw::Framework;
use thiserror::Error;

pub fn command() -> Command {
    Command::new("list").about("List installed bundles").long_about("List every bundle currently known to the framework")
}

/// Handle execution of `modfw list`
pub fn handle(_args: &ArgMatches, framework: &Arc<Framework>) -> Result<(), Error> {
    let mut bundles = framework.get_bundles();
    bundles.sort_by_key(|b| b.bundle_id.0);

    println!("{:>4}  {:<10}  {:<10}  {:>5}  {}", "ID", "STATE", "PERSIST", "LEVEL", "SYMBOLIC-NAME/VERSION @ LOCATION");
    for bundle in bundles {
        let identity = match (&bundle.symbolic_name, &bundle.version) {
            (Some(name), Some(version)) => format!("{name}/{version}"),
            (Some(name), None) => name.clone(),
            _ => "-".to_string(),
        };
        println!(
            "{:>4}  {:<10}  {:<10?}  {:>5}  {identity} @ {}",
            bundle.bundle_id, bundle.state, bundle.persistent_state, bundle.start_level, bundle.location
        );
    }
    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {}
