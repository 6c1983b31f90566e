// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Logger bootstrap.

use env_logger::{Builder, Env};

/// Installs the global logger with an `info` default. `RUST_LOG` overrides it.
pub fn init() {
    init_with_default("info");
}

/// Installs the global logger with `filter` as the default directive.
///
/// A second call is a no-op, so tests and binaries can both call it.
pub fn init_with_default(filter: &str) {
    let result = Builder::from_env(Env::default().default_filter_or(filter))
        .format_timestamp_millis()
        .try_init();
    if result.is_err() {
        log::debug!("Logger already initialised.");
    }
}
