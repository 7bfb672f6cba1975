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

use anyhow::Result;
use ido_writer::RawConfig;

use crate::cli_opts::CliOpts;

/// Binary-level config: the library's `RawConfig`/`Config` layering
/// (TOML + `DATABASE_*` env vars + built-in defaults) plus the CLI's own
/// verbosity flag.
#[derive(Debug, Clone)]
pub struct Config {
    cli: CliOpts,
    inner: ido_writer::Config,
}

impl Config {
    pub fn new() -> Result<Self> {
        let cli = CliOpts::parse_args();
        let raw = match &cli.file {
            Some(path) => RawConfig::from_file(path)?,
            None => RawConfig::default(),
        };
        let inner = ido_writer::Config::new(raw)?;
        Ok(Config { cli, inner })
    }

    pub fn cli(&self) -> &CliOpts {
        &self.cli
    }

    pub fn inner(&self) -> &ido_writer::Config {
        &self.inner
    }
}
