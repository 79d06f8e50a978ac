// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

use super::run;
use crate::cli::Options;
use clap::Parser;
use pretty_assertions::assert_eq;
use rv_test_helpers::TempStorePath;

#[ctor::ctor]
fn test_global_init() {
  rv_test_helpers::test_global_init();
}

fn invoke(path: &TempStorePath, args: &[&str]) -> String {
  let path = path.path().to_string_lossy().to_string();
  let options = Options::try_parse_from(
    ["rv-cli", "--path", path.as_str(), "--capacity", "2"]
      .iter()
      .chain(args),
  )
  .unwrap();

  let mut out = Vec::new();
  run(&options, &mut out).unwrap();
  String::from_utf8(out).unwrap()
}

fn listed_ids(output: &str) -> Vec<u32> {
  output
    .lines()
    .filter_map(|line| line.strip_prefix("Visit ID: "))
    .map(|id| id.parse().unwrap())
    .collect()
}

#[test]
fn demo_lists_user_two() {
  let path = TempStorePath::default();
  let output = invoke(&path, &["demo"]);

  assert_eq!(vec![103], listed_ids(&output));
  assert!(output.contains("URL: https://github.com\n"));
  assert!(output.contains("Text: GitHub\n"));
}

#[test]
fn add_list_delete_clear() {
  let path = TempStorePath::default();
  for visit in ["1", "2", "3"] {
    let url = format!("https://example.com/{visit}");
    assert_eq!(
      "",
      invoke(&path, &["add", "--user", "7", "--visit", visit, "--url", &url])
    );
  }
  assert_eq!(vec![3, 2], listed_ids(&invoke(&path, &["list", "--user", "7"])));

  invoke(&path, &["delete", "--user", "7", "--visit", "3", "--visit", "9"]);
  assert_eq!(vec![2], listed_ids(&invoke(&path, &["list", "--user", "7"])));

  invoke(&path, &["clear", "--user", "7"]);
  assert_eq!("", invoke(&path, &["list", "--user", "7"]));
}
