// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Options {
  /// Store file to operate on
  #[clap(env = "RV_STORE_PATH", long, required = false, default_value = "visits.rv")]
  pub path: PathBuf,

  /// Maximum number of visits kept per user
  #[clap(env = "RV_CAPACITY", long, required = false, default_value = "10")]
  pub capacity: u32,

  /// Log at debug level
  #[clap(long, short)]
  pub verbose: bool,

  /// Command to run
  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Record a visit
  Add(AddCommand),

  /// Print a user's visits, most recent first
  List(UserCommand),

  /// Remove visits from a user
  Delete(DeleteCommand),

  /// Remove every visit of a user
  Clear(UserCommand),

  /// Add one visit for each of four users and list user 2
  Demo,
}

#[derive(Args, Debug)]
pub struct AddCommand {
  #[clap(long)]
  pub user: u32,

  #[clap(long)]
  pub visit: u32,

  #[clap(long)]
  pub url: String,

  #[clap(long, required = false, default_value = "")]
  pub text: String,
}

#[derive(Args, Debug)]
pub struct UserCommand {
  #[clap(long)]
  pub user: u32,
}

#[derive(Args, Debug)]
pub struct DeleteCommand {
  #[clap(long)]
  pub user: u32,

  /// Visit ids to remove, may be repeated
  #[clap(long, num_args = 1 ..)]
  pub visit: Vec<u32>,
}
