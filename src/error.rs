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

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// The driver or server rejected a statement. Carries the SQL that was
    /// attempted so the exception callback can log it.
    #[error("database error executing `{query}`: {message}")]
    Database { message: String, query: String },

    /// `dbversion` is missing, empty, or older than this crate's
    /// `SCHEMA_VERSION`.
    #[error("schema error: {0}")]
    Schema(String),

    /// An invariant that should be unreachable through the public API was
    /// violated (e.g. an upsert query built with neither `config_update`
    /// nor `status_update` set). Distinct from `Database`: this indicates a
    /// bug in the caller, not a transient failure.
    #[error("programmer error: {0}")]
    Programmer(String),

    #[error(transparent)]
    Pool(#[from] r2d2::Error),

    #[error(transparent)]
    Connection(#[from] diesel::ConnectionError),

    #[error(transparent)]
    Query(#[from] diesel::result::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Env(#[from] std::env::VarError),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    /// The write queue's worker thread is gone; nothing more can be
    /// enqueued.
    #[error("write queue worker is no longer running")]
    Channel,
}

impl Error {
    pub fn database(message: impl Into<String>, query: impl Into<String>) -> Self {
        Error::Database { message: message.into(), query: query.into() }
    }
}
