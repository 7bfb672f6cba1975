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

use crate::query::DbQuery;
use crate::registry::ObjectHandle;

/// What the writer needs to know about a live object in order to create
/// its `objects` row. Supplied by the domain, not stored by this crate.
#[derive(Debug, Clone)]
pub struct ObjectDescriptor {
    pub objecttype_id: i64,
    pub name1: String,
    pub name2: Option<String>,
}

/// The capability set the writer requires FROM the monitoring core's
/// object model. This replaces the inheritance-based `DbConnection` base
/// class the original design used: rather than the writer being a
/// subclass the domain drives through virtual calls, the domain holds an
/// `Arc<dyn Ingress>` and the writer holds a `Box<dyn Domain>` — two
/// independent trait objects meeting at a narrow, explicit seam.
pub trait Domain: Send + Sync {
    /// Look up a live object's identity-relevant fields, or `None` if it
    /// no longer exists in the graph. Called by the Encoder when
    /// resolving an `ObjectRef`, and by the reconnect protocol's stray
    /// sweep.
    fn describe(&self, handle: ObjectHandle) -> Option<ObjectDescriptor>;

    /// The inverse of `describe`: given the identity triple an `objects`
    /// row was loaded with, returns the live handle it corresponds to,
    /// or `None` if no live object currently matches. Used while
    /// reloading `objects` rows on reconnect to decide whether a
    /// previously-active row is still backed by a live object.
    fn resolve(&self, objecttype_id: i64, name1: &str, name2: Option<&str>) -> Option<ObjectHandle>;

    /// Called once reconnect has released the connection mutex: the
    /// domain re-emits config and status for every live object by calling
    /// back into `bridge.on_query(...)`.
    fn update_all_objects(&self, bridge: &dyn Ingress);
}

/// The writer's inbound surface. External callers (the domain, retention
/// jobs, explicit activation requests) only ever see this trait; nothing
/// about the Write Queue, Registry, or Driver leaks across the seam.
pub trait Ingress: Send + Sync {
    fn on_query(&self, query: DbQuery);
    fn activate_object(&self, handle: ObjectHandle);
    fn deactivate_object(&self, handle: ObjectHandle);
    fn cleanup(&self, table: &'static str, time_column: &'static str, max_age: i64);
}
