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

//! The Driver Adapter: the only module that speaks SQL wire protocol.
//! Everything above this trait works in terms of `exec`/`escape`/ids —
//! never a raw connection handle — so the Composer and Connection
//! Lifecycle can be tested against `FakeDriver` without a database.

use diesel::mysql::MysqlConnection;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::{Connection, QueryableByName, RunQueryDsl};

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct ConnectParams {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: String,
}

impl ConnectParams {
    /// Builds the connection URL diesel/mysql expect, following the same
    /// NULL-if-empty convention as the original connect call: an absent
    /// field is simply omitted rather than sent as an empty string.
    pub fn url(&self) -> String {
        let mut url = String::from("mysql://");
        if let Some(user) = &self.user {
            url.push_str(user);
            if let Some(password) = &self.password {
                url.push(':');
                url.push_str(password);
            }
            url.push('@');
        }
        url.push_str(self.host.as_deref().unwrap_or("localhost"));
        if let Some(port) = self.port {
            url.push(':');
            url.push_str(&port.to_string());
        }
        url.push('/');
        url.push_str(&self.database);
        url
    }
}

#[derive(Debug, Clone)]
pub struct ObjectRow {
    pub object_id: u64,
    pub objecttype_id: i64,
    pub name1: String,
    pub name2: Option<String>,
    pub is_active: bool,
}

/// The contract every writer component above this module is built
/// against. A real connection's `exec`/`ping`/`close` map directly onto
/// the MySQL client calls the original design made; the handful of typed
/// `query_*`/`load_*` methods stand in for the dynamic-cursor fetch loop
/// the original used, narrowed to the exact shapes the Connection
/// Lifecycle needs (dbversion row, instance id, the objects table dump,
/// and the bulk insert-id fill), which keeps this trait object-safe.
pub trait Driver: Send {
    fn connect(&mut self, params: &ConnectParams) -> Result<()>;
    fn ping(&mut self) -> bool;
    fn close(&mut self);
    fn is_connected(&self) -> bool;

    /// Executes a statement with no typed result. Sets `affected_rows`.
    fn exec(&mut self, sql: &str) -> Result<()>;
    fn affected_rows(&self) -> u64;
    fn last_insert_id(&self) -> u64;

    /// Escapes a raw string for embedding between single quotes, the way
    /// `mysql_real_escape_string` does against the connection's current
    /// charset.
    fn escape(&self, raw: &str) -> String;

    fn query_dbversion(&mut self, table_prefix: &str) -> Result<Vec<String>>;
    fn query_instance_id(&mut self, table_prefix: &str, instance_name: &str) -> Result<Option<u64>>;
    fn load_objects(&mut self, table_prefix: &str, instance_id: u64) -> Result<Vec<ObjectRow>>;
    fn fill_id_cache(&mut self, table_prefix: &str, table: &str, id_column: &str) -> Result<Vec<(u64, u64)>>;
}

#[derive(QueryableByName)]
struct VersionRow {
    #[sql_type = "diesel::sql_types::Text"]
    version: String,
}

#[derive(QueryableByName)]
struct IdRow {
    #[sql_type = "diesel::sql_types::Unsigned<diesel::sql_types::BigInt>"]
    id: u64,
}

#[derive(QueryableByName)]
struct ObjectRowSql {
    #[sql_type = "diesel::sql_types::Unsigned<diesel::sql_types::BigInt>"]
    object_id: u64,
    #[sql_type = "diesel::sql_types::BigInt"]
    objecttype_id: i64,
    #[sql_type = "diesel::sql_types::Text"]
    name1: String,
    #[sql_type = "diesel::sql_types::Nullable<diesel::sql_types::Text>"]
    name2: Option<String>,
    #[sql_type = "diesel::sql_types::Bool"]
    is_active: bool,
}

#[derive(QueryableByName)]
struct FillIdRow {
    #[sql_type = "diesel::sql_types::Unsigned<diesel::sql_types::BigInt>"]
    object_id: u64,
    #[sql_type = "diesel::sql_types::Unsigned<diesel::sql_types::BigInt>"]
    insert_id: u64,
}

/// The production driver: one pooled MySQL connection (pool size 1 — the
/// Write Queue's worker thread is the only caller, so there is never
/// contention for a second connection; `r2d2` still gives us the same
/// connect-manager abstraction the rest of this codebase's historical
/// database layer used).
pub struct MysqlDriver {
    pool: Option<Pool<ConnectionManager<MysqlConnection>>>,
    conn: Option<PooledConnection<ConnectionManager<MysqlConnection>>>,
    affected_rows: u64,
    last_insert_id: u64,
}

impl MysqlDriver {
    pub fn new() -> Self {
        MysqlDriver { pool: None, conn: None, affected_rows: 0, last_insert_id: 0 }
    }

    fn conn(&self) -> Result<&MysqlConnection> {
        self.conn.as_deref().ok_or_else(|| Error::database("not connected", ""))
    }
}

impl Default for MysqlDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for MysqlDriver {
    fn connect(&mut self, params: &ConnectParams) -> Result<()> {
        let manager = ConnectionManager::<MysqlConnection>::new(params.url());
        let pool = Pool::builder().max_size(1).build(manager).map_err(Error::from)?;
        let conn = pool.get().map_err(Error::from)?;
        self.pool = Some(pool);
        self.conn = Some(conn);
        Ok(())
    }

    fn ping(&mut self) -> bool {
        match &self.conn {
            Some(conn) => diesel::sql_query("SELECT 1").execute(conn).is_ok(),
            None => false,
        }
    }

    fn close(&mut self) {
        self.conn = None;
        self.pool = None;
    }

    fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    fn exec(&mut self, sql: &str) -> Result<()> {
        let conn = self.conn()?;
        let affected = diesel::sql_query(sql)
            .execute(conn)
            .map_err(|e| Error::database(e.to_string(), sql.to_owned()))?;
        self.affected_rows = affected as u64;
        if sql.trim_start().to_ascii_uppercase().starts_with("INSERT") {
            if let Ok(row) = diesel::sql_query("SELECT LAST_INSERT_ID() AS id").get_result::<IdRow>(conn) {
                self.last_insert_id = row.id;
            }
        }
        Ok(())
    }

    fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    fn last_insert_id(&self) -> u64 {
        self.last_insert_id
    }

    fn escape(&self, raw: &str) -> String {
        escape_literal(raw)
    }

    fn query_dbversion(&mut self, table_prefix: &str) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let sql = format!("SELECT version FROM {}dbversion WHERE name = 'idoutils'", table_prefix);
        let rows = diesel::sql_query(sql).load::<VersionRow>(conn)?;
        Ok(rows.into_iter().map(|r| r.version).collect())
    }

    fn query_instance_id(&mut self, table_prefix: &str, instance_name: &str) -> Result<Option<u64>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT instance_id AS id FROM {}instances WHERE instance_name = '{}'",
            table_prefix,
            escape_literal(instance_name).trim_matches('\'')
        );
        let rows = diesel::sql_query(sql).load::<IdRow>(conn)?;
        Ok(rows.into_iter().next().map(|r| r.id))
    }

    fn load_objects(&mut self, table_prefix: &str, instance_id: u64) -> Result<Vec<ObjectRow>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT object_id, objecttype_id, name1, name2, is_active FROM {}objects WHERE instance_id = {}",
            table_prefix, instance_id
        );
        let rows = diesel::sql_query(sql).load::<ObjectRowSql>(conn)?;
        Ok(rows
            .into_iter()
            .map(|r| ObjectRow {
                object_id: r.object_id,
                objecttype_id: r.objecttype_id,
                name1: r.name1,
                name2: r.name2,
                is_active: r.is_active,
            })
            .collect())
    }

    fn fill_id_cache(&mut self, table_prefix: &str, table: &str, id_column: &str) -> Result<Vec<(u64, u64)>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} AS object_id, {}_id AS insert_id FROM {}{}s",
            id_column, table, table_prefix, table
        );
        let rows = diesel::sql_query(sql).load::<FillIdRow>(conn)?;
        Ok(rows.into_iter().map(|r| (r.object_id, r.insert_id)).collect())
    }
}

/// MySQL escapes backslash, single/double quote, NUL, newline, carriage
/// return and Ctrl+Z — the same set `mysql_real_escape_string` covers for
/// the connection's default charset. diesel has no client-side escaping
/// helper of its own (it leans on bind parameters instead), and this
/// design composes literal SQL rather than binding, so the escaping rule
/// is reproduced directly here.
fn escape_literal(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('\'');
    for c in raw.chars() {
        match c {
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\x1a' => out.push_str("\\Z"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    /// An in-memory double for `Driver`, used to test the Composer,
    /// Encoder and Connection Lifecycle without a database. Records every
    /// statement it was given so tests can assert on the generated SQL.
    /// `log` mirrors `executed` but lives behind an `Arc<Mutex<_>>` so a
    /// test can keep a handle to it after the `FakeDriver` itself has
    /// been moved into a `Connection`'s worker thread.
    pub struct FakeDriver {
        pub connected: bool,
        pub executed: Vec<String>,
        pub log: Arc<Mutex<Vec<String>>>,
        pub affected_rows: u64,
        pub last_insert_id: u64,
        pub next_insert_id: u64,
        pub dbversion: Vec<String>,
        pub instance_id: Option<u64>,
        pub objects: Vec<ObjectRow>,
        pub fail_next_exec: bool,
        pub fail_on_call: Option<u64>,
        pub call_count: u64,
        pub ping_ok: bool,
    }

    impl Default for FakeDriver {
        fn default() -> Self {
            FakeDriver {
                connected: false,
                executed: Vec::new(),
                log: Arc::new(Mutex::new(Vec::new())),
                affected_rows: 0,
                last_insert_id: 0,
                next_insert_id: 0,
                dbversion: Vec::new(),
                instance_id: None,
                objects: Vec::new(),
                fail_next_exec: false,
                fail_on_call: None,
                call_count: 0,
                ping_ok: false,
            }
        }
    }

    impl FakeDriver {
        pub fn new() -> Self {
            FakeDriver { ping_ok: true, ..Default::default() }
        }

        /// A handle to the statement log that survives the `FakeDriver`
        /// being moved elsewhere (e.g. into a `Connection`'s worker).
        pub fn log_handle(&self) -> Arc<Mutex<Vec<String>>> {
            self.log.clone()
        }
    }

    impl Driver for FakeDriver {
        fn connect(&mut self, _params: &ConnectParams) -> Result<()> {
            self.connected = true;
            Ok(())
        }

        fn ping(&mut self) -> bool {
            self.connected && self.ping_ok
        }

        fn close(&mut self) {
            self.connected = false;
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn exec(&mut self, sql: &str) -> Result<()> {
            self.call_count += 1;
            let should_fail = self.fail_next_exec || self.fail_on_call == Some(self.call_count);
            if should_fail {
                self.fail_next_exec = false;
                return Err(Error::database("fake failure", sql.to_owned()));
            }
            self.executed.push(sql.to_owned());
            self.log.lock().push(sql.to_owned());
            if sql.trim_start().to_ascii_uppercase().starts_with("INSERT") {
                self.next_insert_id += 1;
                self.last_insert_id = self.next_insert_id;
                self.affected_rows = 1;
            }
            Ok(())
        }

        fn affected_rows(&self) -> u64 {
            self.affected_rows
        }

        fn last_insert_id(&self) -> u64 {
            self.last_insert_id
        }

        fn escape(&self, raw: &str) -> String {
            escape_literal(raw)
        }

        fn query_dbversion(&mut self, _table_prefix: &str) -> Result<Vec<String>> {
            Ok(self.dbversion.clone())
        }

        fn query_instance_id(&mut self, _table_prefix: &str, _instance_name: &str) -> Result<Option<u64>> {
            Ok(self.instance_id)
        }

        fn load_objects(&mut self, _table_prefix: &str, _instance_id: u64) -> Result<Vec<ObjectRow>> {
            Ok(self.objects.clone())
        }

        fn fill_id_cache(&mut self, _table_prefix: &str, _table: &str, _id_column: &str) -> Result<Vec<(u64, u64)>> {
            Ok(Vec::new())
        }
    }

    #[allow(dead_code)]
    pub fn params() -> HashMap<&'static str, &'static str> {
        HashMap::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_covers_quotes_and_backslash() {
        assert_eq!(escape_literal("it's"), "'it\\'s'");
        assert_eq!(escape_literal("a\\b"), "'a\\\\b'");
    }

    #[test]
    fn connect_params_url_omits_empty_fields() {
        let p = ConnectParams { host: Some("db".into()), port: None, user: None, password: None, database: "ido".into() };
        assert_eq!(p.url(), "mysql://db/ido");
    }

    #[test]
    fn connect_params_url_includes_credentials() {
        let p = ConnectParams {
            host: Some("db".into()),
            port: Some(3306),
            user: Some("icinga".into()),
            password: Some("secret".into()),
            database: "ido".into(),
        };
        assert_eq!(p.url(), "mysql://icinga:secret@db:3306/ido");
    }
}
