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

use bitflags::bitflags;

use crate::registry::ObjectHandle;
use crate::value::Value;

bitflags! {
    /// Closed set of write categories a connection can be configured to
    /// accept. A query whose category bit is not in the connection's
    /// enabled mask is dropped before any SQL is built.
    #[derive(Default)]
    pub struct Category: u32 {
        const CONFIG            = 1 << 0;
        const STATE              = 1 << 1;
        const ACKNOWLEDGEMENT    = 1 << 2;
        const COMMENT            = 1 << 3;
        const DOWNTIME           = 1 << 4;
        const EVENT_HANDLER      = 1 << 5;
        const EXTERNAL_COMMAND   = 1 << 6;
        const FLAPPING           = 1 << 7;
        const CHECK              = 1 << 8;
        const LOG                = 1 << 9;
        const NOTIFICATION       = 1 << 10;
        const PROGRAM_STATUS     = 1 << 11;
        const RETENTION          = 1 << 12;
        const STATE_HISTORY      = 1 << 13;

        const ALL = Self::CONFIG.bits
            | Self::STATE.bits
            | Self::ACKNOWLEDGEMENT.bits
            | Self::COMMENT.bits
            | Self::DOWNTIME.bits
            | Self::EVENT_HANDLER.bits
            | Self::EXTERNAL_COMMAND.bits
            | Self::FLAPPING.bits
            | Self::CHECK.bits
            | Self::LOG.bits
            | Self::NOTIFICATION.bits
            | Self::PROGRAM_STATUS.bits
            | Self::RETENTION.bits
            | Self::STATE_HISTORY.bits;
    }
}

bitflags! {
    /// `Insert | Update` together mean "upsert": try UPDATE, fall back to
    /// INSERT when zero rows are affected.
    #[derive(Default)]
    pub struct QueryType: u8 {
        const INSERT = 1 << 0;
        const UPDATE = 1 << 1;
        const DELETE = 1 << 2;
    }
}

/// A single ordered column -> value assignment, used for both the field
/// list and the WHERE clause of a `DbQuery`.
pub type FieldList = Vec<(&'static str, Value)>;

/// The logical write request the Composer turns into concrete SQL. Built
/// through `DbQuery::builder` rather than constructed by hand, so that the
/// "upsert with neither flag set" programmer error is unreachable from
/// ordinary callers.
#[derive(Debug, Clone)]
pub struct DbQuery {
    pub category: Category,
    pub query_type: QueryType,
    pub table: &'static str,
    pub fields: FieldList,
    pub where_clause: FieldList,
    pub object: Option<ObjectHandle>,
    pub config_update: bool,
    pub status_update: bool,
    pub notification_object: Option<ObjectHandle>,
}

impl DbQuery {
    pub fn builder(category: Category, table: &'static str) -> DbQueryBuilder {
        DbQueryBuilder {
            query: DbQuery {
                category,
                query_type: QueryType::empty(),
                table,
                fields: Vec::new(),
                where_clause: Vec::new(),
                object: None,
                config_update: false,
                status_update: false,
                notification_object: None,
            },
        }
    }
}

pub struct DbQueryBuilder {
    query: DbQuery,
}

impl DbQueryBuilder {
    pub fn object(mut self, handle: ObjectHandle) -> Self {
        self.query.object = Some(handle);
        self
    }

    pub fn field(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.query.fields.push((column, value.into()));
        self
    }

    pub fn field_raw(mut self, column: &'static str, value: Value) -> Self {
        self.query.fields.push((column, value));
        self
    }

    pub fn where_eq(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.query.where_clause.push((column, value.into()));
        self
    }

    pub fn where_raw(mut self, column: &'static str, value: Value) -> Self {
        self.query.where_clause.push((column, value));
        self
    }

    pub fn notification_object(mut self, handle: ObjectHandle) -> Self {
        self.query.notification_object = Some(handle);
        self
    }

    pub fn insert(mut self) -> DbQuery {
        self.query.query_type = QueryType::INSERT;
        self.query
    }

    pub fn update(mut self) -> DbQuery {
        self.query.query_type = QueryType::UPDATE;
        self.query
    }

    pub fn delete(mut self) -> DbQuery {
        self.query.query_type = QueryType::DELETE;
        self.query
    }

    /// An upsert driven by the config-dump pass: the config row is written
    /// at most once per session, tracked via `Registry::config_written`.
    pub fn upsert_config(mut self) -> DbQuery {
        self.query.query_type = QueryType::INSERT | QueryType::UPDATE;
        self.query.config_update = true;
        self.query
    }

    /// An upsert driven by a status refresh: tracked via
    /// `Registry::status_written`.
    pub fn upsert_status(mut self) -> DbQuery {
        self.query.query_type = QueryType::INSERT | QueryType::UPDATE;
        self.query.status_update = true;
        self.query
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_config_sets_exactly_config_flag() {
        let q = DbQuery::builder(Category::CONFIG, "hosts")
            .object(ObjectHandle(1))
            .field("display_name", "router1")
            .upsert_config();
        assert_eq!(q.query_type, QueryType::INSERT | QueryType::UPDATE);
        assert!(q.config_update);
        assert!(!q.status_update);
    }

    #[test]
    fn category_all_contains_notification() {
        assert!(Category::ALL.contains(Category::NOTIFICATION));
    }

    #[test]
    fn builder_without_upsert_has_empty_type_until_set() {
        let q = DbQuery::builder(Category::STATE, "hosts").delete();
        assert_eq!(q.query_type, QueryType::DELETE);
    }
}
