// Copyright 2024 Icinga GmbH
// This file is part of ido-writer.

// ido-writer is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// ido-writer is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with ido-writer.  If not, see <http://www.gnu.org/licenses/>.

mod cli_opts;
mod config;
mod domain;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;

/// Logical config-category table names cleared on every reconnect. A
/// real deployment supplies the monitoring core's full category-table
/// catalog here; this binary names only the handful of tables its own
/// test fixtures touch.
const CONFIG_TABLES: &[&str] = &["hosts", "services", "hostgroups", "servicegroups", "commands", "timeperiods"];

fn main() -> Result<()> {
    let config = config::Config::new()?;
    ido_writer::init_logger(config.cli().log_level(), log::LevelFilter::Debug);

    let domain = Arc::new(domain::EmptyDomain);
    let connection = ido_writer::Connection::new(config.inner(), domain, CONFIG_TABLES)?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl-C handler");

    while running.load(Ordering::SeqCst) {}

    connection.shutdown();
    Ok(())
}
