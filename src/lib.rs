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

//! `ido-writer`: the pipeline that projects a live, mutating graph of
//! monitoring objects onto a relational schema in a remote SQL database,
//! exactly once and in causal order, across reconnects.
//!
//! The crate is organized leaf-first:
//! `driver` is the thin contract over the SQL client; `registry` is the
//! process-wide identity mapping; `value`/`encoder` turn tagged values
//! into SQL literals; `query`/`composer` turn a logical `DbQuery` into a
//! concrete statement; `queue` owns the single worker thread;
//! `connection` is the reconnect protocol and periodic timers built on
//! top of it; `stats` and `ingress` are the two surfaces external callers
//! touch.

mod composer;
mod config;
mod connection;
mod driver;
mod encoder;
mod error;
mod ingress;
mod logger;
mod migrations;
mod query;
mod queue;
mod registry;
mod stats;
mod value;
mod worker;

pub use config::{Config, RawConfig};
pub use connection::{Connection, State};
pub use driver::{ConnectParams, Driver, MysqlDriver};
pub use error::{Error, Result};
pub use ingress::{Domain, Ingress, ObjectDescriptor};
pub use logger::init_logger;
pub use migrations::SCHEMA_VERSION;
pub use query::{Category, DbQuery, DbQueryBuilder, FieldList, QueryType};
pub use registry::ObjectHandle;
pub use stats::Stats;
pub use value::{DbReference, ObjectRefKind, Scalar, Value};
