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

use std::collections::HashMap;

use crate::value::DbReference;

/// An opaque, cheaply-copyable key identifying a live object in the
/// monitoring core's object graph. The writer never dereferences it; it is
/// only ever used as a map key and handed back to the domain's lookup
/// callback (`Domain::resolve`, see `ingress.rs`) when the writer needs to
/// know whether an object is still live. Owned by the caller, not by this
/// crate — the writer holds no strong reference to the object graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectHandle(pub u64);

/// Per-object bookkeeping the writer maintains across a connection's
/// lifetime. Mirrors the fields the original `DbObject` class carried:
/// the assigned `objects` row id, the last insert id captured from a
/// detail-table row representing this object, whether its config/status
/// row has been written this session, and whether the DB currently
/// considers it active.
#[derive(Debug, Clone, Copy, Default)]
pub struct DbObjectState {
    pub object_id: DbReference,
    pub insert_id: DbReference,
    pub config_written: bool,
    pub status_written: bool,
    pub active: bool,
}

/// The Identity Registry. Only the Write Queue's worker thread may call
/// any of these methods. Nothing here takes a lock — the
/// single-writer-thread discipline is the synchronization.
#[derive(Debug, Default)]
pub struct Registry {
    objects: HashMap<ObjectHandle, DbObjectState>,
    /// Inverse of `object_id`, kept in step by `set_object_id`. Lets the
    /// insert-id backfill pass, which comes back from the driver as raw
    /// `(object_id, insert_id)` pairs, find the handle each row belongs
    /// to without the driver ever seeing an `ObjectHandle`.
    by_object_id: HashMap<u64, ObjectHandle>,
}

impl Registry {
    pub fn new() -> Self {
        Registry { objects: HashMap::new(), by_object_id: HashMap::new() }
    }

    /// Drops all entries. Called at the start of every reconnect so that
    /// ids from a previous connection (which may point at a now-foreign
    /// database) are never reused.
    pub fn clear(&mut self) {
        self.objects.clear();
        self.by_object_id.clear();
    }

    fn entry(&mut self, handle: ObjectHandle) -> &mut DbObjectState {
        self.objects.entry(handle).or_default()
    }

    pub fn set_object_id(&mut self, handle: ObjectHandle, id: DbReference) {
        self.entry(handle).object_id = id;
        if id.is_valid() {
            self.by_object_id.insert(id.get(), handle);
        }
    }

    /// The handle that was last assigned a given `objects.object_id`, if
    /// any. `None` means the id was never observed this session — the row
    /// belongs to an object this connection hasn't loaded or activated.
    pub fn handle_for_object_id(&self, object_id: u64) -> Option<ObjectHandle> {
        self.by_object_id.get(&object_id).copied()
    }

    /// Applies a `FillIDCache` batch: for each `(object_id, insert_id)`
    /// pair whose object_id is known, records `insert_id` against the
    /// matching handle. Pairs for unknown object ids are silently
    /// skipped — they belong to objects this connection has not (yet)
    /// loaded.
    pub fn apply_fill_id_cache(&mut self, pairs: impl IntoIterator<Item = (u64, u64)>) {
        for (object_id, insert_id) in pairs {
            if let Some(handle) = self.handle_for_object_id(object_id) {
                self.set_insert_id(handle, DbReference::valid(insert_id));
            }
        }
    }

    pub fn get_object_id(&self, handle: ObjectHandle) -> DbReference {
        self.objects.get(&handle).map(|s| s.object_id).unwrap_or_default()
    }

    pub fn set_insert_id(&mut self, handle: ObjectHandle, id: DbReference) {
        self.entry(handle).insert_id = id;
    }

    pub fn get_insert_id(&self, handle: ObjectHandle) -> DbReference {
        self.objects.get(&handle).map(|s| s.insert_id).unwrap_or_default()
    }

    pub fn set_config_written(&mut self, handle: ObjectHandle, written: bool) {
        self.entry(handle).config_written = written;
    }

    pub fn get_config_written(&self, handle: ObjectHandle) -> bool {
        self.objects.get(&handle).map(|s| s.config_written).unwrap_or(false)
    }

    pub fn set_status_written(&mut self, handle: ObjectHandle, written: bool) {
        self.entry(handle).status_written = written;
    }

    pub fn get_status_written(&self, handle: ObjectHandle) -> bool {
        self.objects.get(&handle).map(|s| s.status_written).unwrap_or(false)
    }

    pub fn set_active(&mut self, handle: ObjectHandle, active: bool) {
        self.entry(handle).active = active;
    }

    pub fn get_active(&self, handle: ObjectHandle) -> bool {
        self.objects.get(&handle).map(|s| s.active).unwrap_or(false)
    }

    /// All handles currently known to the registry, i.e. every object that
    /// had a row loaded (or created) since the last `clear`. Used by the
    /// reconnect protocol's stray-detection pass.
    pub fn known_handles(&self) -> impl Iterator<Item = ObjectHandle> + '_ {
        self.objects.keys().copied()
    }

    pub fn state(&self, handle: ObjectHandle) -> DbObjectState {
        self.objects.get(&handle).copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_handle_reads_as_invalid_and_unwritten() {
        let registry = Registry::new();
        let h = ObjectHandle(1);
        assert!(!registry.get_object_id(h).is_valid());
        assert!(!registry.get_config_written(h));
        assert!(!registry.get_active(h));
    }

    #[test]
    fn set_then_get_round_trips() {
        let mut registry = Registry::new();
        let h = ObjectHandle(42);
        registry.set_object_id(h, DbReference::valid(7));
        registry.set_config_written(h, true);
        registry.set_active(h, true);
        assert_eq!(registry.get_object_id(h).get(), 7);
        assert!(registry.get_config_written(h));
        assert!(registry.get_active(h));
    }

    #[test]
    fn clear_drops_all_entries() {
        let mut registry = Registry::new();
        let h = ObjectHandle(1);
        registry.set_object_id(h, DbReference::valid(1));
        registry.clear();
        assert!(!registry.get_object_id(h).is_valid());
        assert_eq!(registry.known_handles().count(), 0);
    }

    #[test]
    fn known_handles_reflects_inserts() {
        let mut registry = Registry::new();
        registry.set_object_id(ObjectHandle(1), DbReference::valid(1));
        registry.set_object_id(ObjectHandle(2), DbReference::valid(2));
        let mut handles: Vec<_> = registry.known_handles().collect();
        handles.sort();
        assert_eq!(handles, vec![ObjectHandle(1), ObjectHandle(2)]);
    }

    #[test]
    fn handle_for_object_id_resolves_the_reverse_mapping() {
        let mut registry = Registry::new();
        registry.set_object_id(ObjectHandle(5), DbReference::valid(500));
        assert_eq!(registry.handle_for_object_id(500), Some(ObjectHandle(5)));
        assert_eq!(registry.handle_for_object_id(999), None);
    }

    #[test]
    fn clear_drops_the_reverse_mapping_too() {
        let mut registry = Registry::new();
        registry.set_object_id(ObjectHandle(5), DbReference::valid(500));
        registry.clear();
        assert_eq!(registry.handle_for_object_id(500), None);
    }

    #[test]
    fn fill_id_cache_sets_insert_id_for_known_objects_and_skips_unknown() {
        let mut registry = Registry::new();
        registry.set_object_id(ObjectHandle(1), DbReference::valid(100));
        registry.set_object_id(ObjectHandle(2), DbReference::valid(200));
        registry.apply_fill_id_cache(vec![(100, 9001), (200, 9002), (999, 9003)]);
        assert_eq!(registry.get_insert_id(ObjectHandle(1)).get(), 9001);
        assert_eq!(registry.get_insert_id(ObjectHandle(2)).get(), 9002);
    }
}
