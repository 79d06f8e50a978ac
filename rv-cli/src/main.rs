// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#[cfg(test)]
#[path = "./main_test.rs"]
mod tests;

use crate::cli::{Command, Options};
use clap::Parser;
use rv_visits::{Visit, VisitManager, with_manager};
use std::io::Write;
use time::format_description::well_known::Rfc3339;

mod cli;

const DEMO_VISITS: [(u32, u32, &str, &str); 4] = [
  (1, 102, "https://google.com", "Google"),
  (2, 103, "https://github.com", "GitHub"),
  (3, 104, "https://stackoverflow.com", "Stack Overflow"),
  (4, 105, "https://example.com", "Example"),
];

fn main() -> anyhow::Result<()> {
  rv_log::SwapLogger::initialize();
  let options = Options::parse();
  if options.verbose {
    rv_log::SwapLogger::swap("debug")?;
  }

  run(&options, &mut std::io::stdout().lock())
}

fn run(options: &Options, out: &mut impl Write) -> anyhow::Result<()> {
  log::debug!(
    "using store {} with capacity {}",
    options.path.display(),
    options.capacity
  );

  let visits = with_manager(&options.path, options.capacity, |manager| {
    match &options.command {
      Command::Add(cmd) => {
        if !manager.add_visit(cmd.user, cmd.visit, cmd.url.as_str(), cmd.text.as_str())? {
          log::warn!("visit {} was rejected as too large", cmd.visit);
        }
        Ok(None)
      },
      Command::List(cmd) => manager.get_recent_visits(cmd.user).map(Some),
      Command::Delete(cmd) => {
        manager.delete_visits(cmd.user, &cmd.visit)?;
        Ok(None)
      },
      Command::Clear(cmd) => {
        manager.clear_user(cmd.user)?;
        Ok(None)
      },
      Command::Demo => demo(manager).map(Some),
    }
  })?;

  if let Some(visits) = visits {
    print_visits(&visits, out)?;
  }
  Ok(())
}

fn demo(manager: &VisitManager) -> rv_visits::Result<Vec<Visit>> {
  for (user_id, visit_id, url, text) in DEMO_VISITS {
    manager.add_visit(user_id, visit_id, url, text)?;
  }
  manager.get_recent_visits(2)
}

fn print_visits(visits: &[Visit], out: &mut impl Write) -> anyhow::Result<()> {
  for visit in visits {
    writeln!(out, "Visit ID: {}", visit.visit_id)?;
    writeln!(out, "Timestamp: {}", visit.timestamp.format(&Rfc3339)?)?;
    writeln!(out, "URL: {}", visit.url)?;
    writeln!(out, "Text: {}", visit.text)?;
    writeln!(out)?;
  }
  Ok(())
}
