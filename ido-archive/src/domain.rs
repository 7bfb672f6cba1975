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

//! A placeholder `Domain` for the standalone binary. The real monitoring
//! core's object graph (hosts, services, endpoints, ...) is an external
//! collaborator this crate only names a contract for — a real deployment
//! links this binary against that object model instead of this stub.

use ido_writer::{Domain, Ingress, ObjectDescriptor, ObjectHandle};

pub struct EmptyDomain;

impl Domain for EmptyDomain {
    fn describe(&self, _handle: ObjectHandle) -> Option<ObjectDescriptor> {
        None
    }

    fn resolve(&self, _objecttype_id: i64, _name1: &str, _name2: Option<&str>) -> Option<ObjectHandle> {
        None
    }

    fn update_all_objects(&self, _bridge: &dyn Ingress) {}
}
