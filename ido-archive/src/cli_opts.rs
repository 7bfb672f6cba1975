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

use std::path::PathBuf;

use clap::Parser;

/// Command-line surface for the `ido-archive` binary: a config path plus
/// repeatable verbosity flags, built on clap's derive API.
#[derive(Debug, Clone, Parser)]
#[command(name = "ido-archive", about = "Writes the live monitoring object graph to an IDO-compatible database")]
pub struct CliOpts {
    /// Path to a TOML config file. Unset fields fall back to built-in
    /// defaults or `DATABASE_*` environment variables (see `Config::new`).
    #[arg(short, long = "config", value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Repeat for more verbose stdout logging (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl CliOpts {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn log_level(&self) -> log::LevelFilter {
        match self.verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}
