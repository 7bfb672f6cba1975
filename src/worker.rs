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

//! The state every worker-thread-only operation (Encoder, Composer,
//! reconnect protocol) is built against. Bundling it into one borrow
//! means the borrow checker enforces single-writer access for us: nothing
//! outside the Write Queue's worker thread can ever hold a `WorkerState`, because
//! constructing one requires `&mut Registry` and `&mut dyn Driver`, both
//! owned exclusively by the worker.

use crate::driver::Driver;
use crate::error::Result;
use crate::ingress::Domain;
use crate::registry::{ObjectHandle, Registry};
use crate::value::DbReference;

pub struct WorkerState<'a> {
    pub driver: &'a mut dyn Driver,
    pub registry: &'a mut Registry,
    pub domain: &'a dyn Domain,
    pub instance_id: u64,
    pub table_prefix: &'a str,
}

impl<'a> WorkerState<'a> {
    /// `InternalActivateObject`: ensures `handle` has a row in `objects`,
    /// inserting one if needed, and returns its (now valid) object id.
    /// Called both by explicit activation requests and, inline, by the
    /// Encoder when it meets an unresolved `ObjectRef`.
    pub fn activate_object(&mut self, handle: ObjectHandle) -> Result<DbReference> {
        let existing = self.registry.get_object_id(handle);
        if existing.is_valid() {
            let sql = format!(
                "UPDATE {}objects SET is_active = 1 WHERE object_id = {}",
                self.table_prefix,
                existing.get()
            );
            self.driver.exec(&sql)?;
            self.registry.set_active(handle, true);
            return Ok(existing);
        }

        let descriptor = match self.domain.describe(handle) {
            Some(d) => d,
            None => return Ok(DbReference::invalid()),
        };
        let name2_sql = match &descriptor.name2 {
            Some(n2) => self.driver.escape(n2),
            None => "NULL".to_owned(),
        };
        let sql = format!(
            "INSERT INTO {}objects (instance_id, objecttype_id, name1, name2, is_active) VALUES ({}, {}, {}, {}, 1)",
            self.table_prefix,
            self.instance_id,
            descriptor.objecttype_id,
            self.driver.escape(&descriptor.name1),
            name2_sql,
        );
        self.driver.exec(&sql)?;
        let id = DbReference::valid(self.driver.last_insert_id());
        self.registry.set_object_id(handle, id);
        self.registry.set_active(handle, true);
        Ok(id)
    }

    /// `DeactivateObject`: flips `is_active` to 0. Does not clear any
    /// Registry flags — the row still exists and its identity must
    /// survive future reconnects.
    pub fn deactivate_object(&mut self, handle: ObjectHandle) -> Result<()> {
        let id = self.registry.get_object_id(handle);
        if !id.is_valid() {
            return Ok(());
        }
        let sql = format!("UPDATE {}objects SET is_active = 0 WHERE object_id = {}", self.table_prefix, id.get());
        self.driver.exec(&sql)?;
        self.registry.set_active(handle, false);
        Ok(())
    }
}
