/*
Copyright 2024 oceanbin developers

This file is part of oceanbin.

oceanbin is a free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation; either version 3 of the License, or
(at your option) any later version.

oceanbin is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with oceanbin. If not, see https://www.gnu.org/licenses/.
*/

//! Batch converter and inspector of ocean surface grid files.
//!
//! Reads `config.yaml` from the working directory, processes the listed
//! files and writes results to the configured output directory.

use cap::Cap;
use env_logger::Env;
use log::{debug, error, info, warn};
use oceanbin::{configuration::Config, errors::TaskError, tasks};
use std::{alloc, path::Path};

/// Global allocator used by the program.
///
/// Use of static global allocator allows for capping the memory to the limit set by user
/// in configuration file and in effect provide better [OOM error](https://en.wikipedia.org/wiki/Out_of_memory) handling.
#[global_allocator]
static ALLOCATOR: Cap<alloc::System> = Cap::new(alloc::System, usize::MAX);

/// The main program function.
/// Prepares the runtime environment and calls the [`tasks::main`].
///
/// The `env_logger` needs to be initiated before any log messages
/// are possible to occur, including configuration errors.
fn main() {
    #[cfg(not(feature = "debug"))]
    let logger_env = Env::new().filter_or("OCEANBIN_LOG_LEVEL", "info");

    #[cfg(feature = "debug")]
    let logger_env = Env::new().filter_or("OCEANBIN_LOG_LEVEL", "debug");

    env_logger::Builder::from_env(logger_env)
        .format_timestamp_millis()
        .init();

    match run() {
        Ok(_) => info!("Processing finished. Check the output directory and log."),
        Err(err) => error!("Processing failed with error: {}", err),
    }
}

fn run() -> Result<(), TaskError> {
    debug!("Reading configuration from config.yaml");
    let config = Config::new_from_file(Path::new("config.yaml"))?;

    debug!("Setting memory limit");
    let limit = config.resources.memory.saturating_mul(1024 * 1024);
    if let Err(err) = ALLOCATOR.set_limit(limit) {
        warn!("Memory limit could not be set: {:?}", err);
    }

    tasks::main(&config)
}
