// Copyright (c) 2025 Rajan Panneer Selvam
//
// Licensed under the Business Source License 1.1 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.mariadb.com/bsl11
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use std::env;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

/// Stdout logging is always on. A rolling log file is opt-in via
/// KINESIM_LOG_DIR: the emulator usually runs as a throwaway dev dependency
/// and should not litter the working directory by default. The file is
/// named after the configured default region, so emulators for different
/// regions running side by side do not interleave.
pub fn init_logger(config: &Config) {
    // env var wins, then the config file, then a build-mode default
    let log_level = env::var("KINESIM_LOG_LEVEL")
        .ok()
        .or_else(|| config.log_level.clone())
        .unwrap_or_else(|| {
            if cfg!(debug_assertions) {
                "debug".to_string()
            } else {
                "info".to_string()
            }
        });

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&format!("kinesim={},actix_web=info", log_level)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = env::var("KINESIM_LOG_DIR").ok().map(|log_dir| {
        let file_name = format!("kinesim-{}.log", config.aws.region);
        let appender = RollingFileAppender::new(Rotation::DAILY, log_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        // keep the worker guard alive for the program's lifetime so the
        // file is flushed
        Box::leak(Box::new(guard));
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(non_blocking)
    });

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stdout))
        .with(file_layer)
        .with(filter)
        .init();
}
