// Copyright 2025 Lablup Inc. and Jeongkyu Shin
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

use tracing_subscriber::EnvFilter;

/// Target of per-host output lines.
pub const HOST_LOGGER_TARGET: &str = "pssh::host_logger";

/// Create an environment filter based on verbosity level.
///
/// Host output lines stay visible at every level; they are only emitted
/// when the client enables its host logger.
pub fn create_env_filter(verbosity: u8) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        // Use RUST_LOG if set (allows debugging russh and other dependencies)
        EnvFilter::from_default_env()
    } else {
        match verbosity {
            0 => EnvFilter::new(format!("pssh=warn,{HOST_LOGGER_TARGET}=info")),
            1 => EnvFilter::new("pssh=info"),
            // -vv: Include russh debug logs for SSH troubleshooting
            2 => EnvFilter::new("pssh=debug,russh=debug"),
            // -vvv: Full trace including all dependencies
            _ => EnvFilter::new("pssh=trace,russh=trace,russh_sftp=debug"),
        }
    }
}

/// Install a console subscriber. Calling it twice is harmless.
pub fn init_logging(verbosity: u8) {
    let filter = create_env_filter(verbosity);

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbosity > 0)
        .try_init();
}
