// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

pub mod rate_limit_log;

use parking_lot::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::reload::Handle as ReloadHandle;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

const DEFAULT_FILTER_RULES: &str = "info";

//
// SwapLogger
//

// Installs the process wide tracing subscriber and allows the filter to be atomically swapped
// afterwards. `log` records are bridged into tracing by the subscriber's `init`.
#[derive(Default)]
pub struct SwapLogger {
  handle: Mutex<Option<ReloadHandle<EnvFilter, Registry>>>,
}

impl SwapLogger {
  const fn new() -> Self {
    Self {
      handle: Mutex::new(None),
    }
  }

  fn get() -> &'static Self {
    static LOGGER: SwapLogger = SwapLogger::new();

    &LOGGER
  }

  // Initialize the logger to the default. Only the first call installs the subscriber, later
  // calls are ignored so that tests in the same binary can all call this.
  pub fn initialize() {
    let mut handle = Self::get().handle.lock();
    if handle.is_some() {
      return;
    }

    // ANSI output is opt-in so that captured output stays readable.
    let stderr = tracing_subscriber::fmt::layer()
      .with_writer(std::io::stderr)
      .with_ansi(std::env::var("RV_LOG_ANSI").is_ok())
      .with_line_number(true)
      .with_thread_ids(true)
      .compact();

    let filter = EnvFilter::new(
      std::env::var("RUST_LOG")
        .as_deref()
        .unwrap_or(DEFAULT_FILTER_RULES),
    );

    let (filter, reload_handle) = tracing_subscriber::reload::Layer::new(filter);
    if Registry::default().with(filter).with(stderr).try_init().is_ok() {
      *handle = Some(reload_handle);
    }
  }

  // Swap in a new filter using RUST_LOG syntax.
  pub fn swap(new_rust_log: &str) -> anyhow::Result<()> {
    let handle = Self::get().handle.lock();
    let Some(handle) = handle.as_ref() else {
      anyhow::bail!("logger has not been initialized");
    };
    handle.reload(EnvFilter::try_new(new_rust_log)?)?;

    // The `log` max level is only computed at init, so it has to be refreshed on every reload.
    log::set_max_level(tracing_log::AsLog::as_log(
      &tracing_subscriber::filter::LevelFilter::current(),
    ));

    Ok(())
  }
}
