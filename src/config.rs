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

//! Configuration: a `RawConfig` (all-`Option`, `serde::Deserialize`) is
//! parsed from TOML and layered under built-in defaults to produce a
//! fully-resolved `Config`.

use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::query::Category;

pub const DEFAULT_TABLE_PREFIX: &str = "icinga_";
pub const DEFAULT_INSTANCE_NAME: &str = "default";
pub const DEFAULT_COMMIT_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_RECONNECT_INTERVAL_SECS: u64 = 10;

/// All-`Option` mirror of `Config`, deserialized directly from the TOML
/// file a `CliOpts` path points at. Any field left out of the file falls
/// back to `Config`'s built-in default.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub table_prefix: Option<String>,
    pub instance_name: Option<String>,
    pub instance_description: Option<String>,
    pub categories: Option<Vec<String>>,
    pub commit_interval_secs: Option<u64>,
    pub reconnect_interval_secs: Option<u64>,
}

impl RawConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }
}

/// The fully-resolved configuration a `Connection` is constructed with:
/// the recognized connection/category options plus the ambient
/// commit/reconnect interval overrides every deployment needs.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: String,
    pub table_prefix: String,
    pub instance_name: String,
    pub instance_description: Option<String>,
    pub categories: Category,
    pub commit_interval_secs: u64,
    pub reconnect_interval_secs: u64,
}

impl Config {
    /// Loads a `.env` file if present (`dotenv::dotenv().ok()` — absence
    /// is not an error) then layers `raw` over the built-in defaults
    /// below.
    pub fn new(raw: RawConfig) -> Result<Self> {
        dotenv::dotenv().ok();

        let database = raw
            .database
            .or_else(|| std::env::var("DATABASE_NAME").ok())
            .ok_or_else(|| Error::Schema("`database` must be set (config file or DATABASE_NAME)".to_owned()))?;

        let categories = match raw.categories {
            Some(names) => parse_categories(&names)?,
            None => Category::ALL,
        };

        Ok(Config {
            host: raw.host.or_else(|| std::env::var("DATABASE_HOST").ok()),
            port: raw.port,
            user: raw.user.or_else(|| std::env::var("DATABASE_USER").ok()),
            password: raw.password.or_else(|| std::env::var("DATABASE_PASS").ok()),
            database,
            table_prefix: raw.table_prefix.unwrap_or_else(|| DEFAULT_TABLE_PREFIX.to_owned()),
            instance_name: raw.instance_name.unwrap_or_else(|| DEFAULT_INSTANCE_NAME.to_owned()),
            instance_description: raw.instance_description,
            categories,
            commit_interval_secs: raw.commit_interval_secs.unwrap_or(DEFAULT_COMMIT_INTERVAL_SECS),
            reconnect_interval_secs: raw.reconnect_interval_secs.unwrap_or(DEFAULT_RECONNECT_INTERVAL_SECS),
        })
    }
}

fn parse_categories(names: &[String]) -> Result<Category> {
    let mut mask = Category::empty();
    for name in names {
        mask |= category_from_name(name)?;
    }
    Ok(mask)
}

fn category_from_name(name: &str) -> Result<Category> {
    match name.to_ascii_lowercase().as_str() {
        "config" => Ok(Category::CONFIG),
        "state" => Ok(Category::STATE),
        "acknowledgement" | "acknowledgements" => Ok(Category::ACKNOWLEDGEMENT),
        "comment" | "comments" => Ok(Category::COMMENT),
        "downtime" | "downtimes" => Ok(Category::DOWNTIME),
        "eventhandler" | "event_handler" => Ok(Category::EVENT_HANDLER),
        "externalcommand" | "external_command" => Ok(Category::EXTERNAL_COMMAND),
        "flapping" => Ok(Category::FLAPPING),
        "check" | "checks" => Ok(Category::CHECK),
        "log" => Ok(Category::LOG),
        "notification" | "notifications" => Ok(Category::NOTIFICATION),
        "programstatus" | "program_status" => Ok(Category::PROGRAM_STATUS),
        "retention" => Ok(Category::RETENTION),
        "statehistory" | "state_history" => Ok(Category::STATE_HISTORY),
        "all" => Ok(Category::ALL),
        other => Err(Error::Schema(format!("unknown category `{}`", other))),
    }
}
