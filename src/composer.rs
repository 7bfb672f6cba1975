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

//! The Query Composer: turns a logical `DbQuery` into concrete SQL and
//! runs it, implementing the category filter, the upsert-via-retry
//! fallback, and the post-execute Registry bookkeeping.

use log::debug;

use crate::encoder::{encode, EncodeError};
use crate::error::{Error, Result};
use crate::query::{Category, DbQuery, QueryType};
use crate::worker::WorkerState;

/// Table name the `notification_id` cross-reference hook applies to. The
/// original design special-cased this one table by string comparison in
/// several places; here it is named once, so every reference to the
/// special case points at the same constant.
const NOTIFICATION_TABLE: &str = "notifications";

pub fn execute_query(state: &mut WorkerState, enabled_categories: Category, query: DbQuery) -> Result<()> {
    execute_query_inner(state, enabled_categories, query, None)
}

fn execute_query_inner(
    state: &mut WorkerState,
    enabled_categories: Category,
    query: DbQuery,
    type_override: Option<QueryType>,
) -> Result<()> {
    if (query.category & enabled_categories).is_empty() {
        debug!("dropping query on {}: category not enabled", query.table);
        return Ok(());
    }

    if !state.driver.is_connected() {
        return Ok(());
    }

    let where_sql = match build_clause(state, &query.where_clause, " AND ")? {
        Some(sql) => sql,
        None => return Ok(()),
    };

    let (effective_type, upsert) = resolve_type(state, &query, type_override)?;

    let sql = match effective_type {
        QueryType::INSERT => match build_insert(state, &query)? {
            Some(sql) => sql,
            None => return Ok(()),
        },
        QueryType::UPDATE => match build_update(state, &query, &where_sql)? {
            Some(sql) => sql,
            None => return Ok(()),
        },
        QueryType::DELETE => build_delete(state, &query, &where_sql),
        other => {
            return Err(Error::Programmer(format!("unsupported composed query type {:?}", other)));
        }
    };

    state.driver.exec(&sql)?;

    if upsert && state.driver.affected_rows() == 0 {
        return execute_query_inner(state, enabled_categories, query, Some(QueryType::INSERT));
    }

    apply_post_execute(state, &query, effective_type);
    Ok(())
}

fn resolve_type(state: &WorkerState, query: &DbQuery, type_override: Option<QueryType>) -> Result<(QueryType, bool)> {
    if let Some(t) = type_override {
        return Ok((t, false));
    }

    if query.query_type == (QueryType::INSERT | QueryType::UPDATE) {
        let object = query
            .object
            .ok_or_else(|| Error::Programmer("upsert query requires an object handle".to_owned()))?;

        let written = match (query.config_update, query.status_update) {
            (true, false) => state.registry.get_config_written(object),
            (false, true) => state.registry.get_status_written(object),
            _ => {
                return Err(Error::Programmer(
                    "upsert query must set exactly one of config_update/status_update".to_owned(),
                ));
            }
        };

        return Ok((QueryType::UPDATE, !written));
    }

    Ok((query.query_type, false))
}

fn build_clause(state: &mut WorkerState, fields: &[(&'static str, crate::value::Value)], sep: &str) -> Result<Option<String>> {
    let mut parts = Vec::with_capacity(fields.len());
    for (column, value) in fields {
        match encode(state, column, value) {
            Ok(v) => parts.push(format!("{} = {}", column, v)),
            Err(EncodeError::Abort) => return Ok(None),
            Err(EncodeError::Failed(e)) => return Err(e),
        }
    }
    Ok(Some(parts.join(sep)))
}

fn build_insert(state: &mut WorkerState, query: &DbQuery) -> Result<Option<String>> {
    let mut columns = Vec::new();
    let mut values = Vec::new();
    for (column, value) in &query.fields {
        if value.is_empty() {
            continue;
        }
        match encode(state, column, value) {
            Ok(v) => {
                columns.push(*column);
                values.push(v);
            }
            Err(EncodeError::Abort) => return Ok(None),
            Err(EncodeError::Failed(e)) => return Err(e),
        }
    }
    Ok(Some(format!(
        "INSERT INTO {}{} ({}) VALUES ({})",
        state.table_prefix,
        query.table,
        columns.join(", "),
        values.join(", ")
    )))
}

fn build_update(state: &mut WorkerState, query: &DbQuery, where_sql: &str) -> Result<Option<String>> {
    let mut assignments = Vec::new();
    for (column, value) in &query.fields {
        if value.is_empty() {
            continue;
        }
        match encode(state, column, value) {
            Ok(v) => assignments.push(format!("{} = {}", column, v)),
            Err(EncodeError::Abort) => return Ok(None),
            Err(EncodeError::Failed(e)) => return Err(e),
        }
    }
    let mut sql = format!("UPDATE {}{} SET {}", state.table_prefix, query.table, assignments.join(", "));
    if !where_sql.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(where_sql);
    }
    Ok(Some(sql))
}

fn build_delete(state: &WorkerState, query: &DbQuery, where_sql: &str) -> String {
    let mut sql = format!("DELETE FROM {}{}", state.table_prefix, query.table);
    if !where_sql.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(where_sql);
    }
    sql
}

fn apply_post_execute(state: &mut WorkerState, query: &DbQuery, effective_type: QueryType) {
    if let Some(object) = query.object {
        if query.config_update {
            state.registry.set_config_written(object, true);
        }
        if query.status_update {
            state.registry.set_status_written(object, true);
        }
    }

    if effective_type == QueryType::INSERT {
        if let Some(object) = query.object {
            if query.config_update {
                state.registry.set_insert_id(object, crate::value::DbReference::valid(state.driver.last_insert_id()));
            }
        }
        if query.table == NOTIFICATION_TABLE {
            if let Some(notification_object) = query.notification_object {
                state
                    .registry
                    .set_insert_id(notification_object, crate::value::DbReference::valid(state.driver.last_insert_id()));
            }
        }
    }
}
