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

//! The Value Encoder: turns a tagged `Value` into the literal SQL
//! fragment that goes into a field list or WHERE clause. Rule order
//! mirrors `FieldToEscapedString` exactly — `instance_id` and
//! `notification_id` are handled as named special cases before the
//! general tagged-value match.

use crate::error::Error;
use crate::registry::ObjectHandle;
use crate::value::{ObjectRefKind, Scalar, Value};
use crate::worker::WorkerState;

/// What can stop `encode` from producing a fragment. `Abort` is the
/// expected, non-exceptional "this reference can never resolve" outcome
/// (the live object legitimately no longer exists) — the enclosing query
/// is dropped silently, never reaching the exception callback. `Failed`
/// carries a genuine error from a Driver call made while resolving the
/// reference (e.g. `InternalActivateObject`'s `INSERT`/`UPDATE` against
/// `objects`); this must propagate like any other `Error`, since it means
/// the connection itself is in trouble.
#[derive(Debug)]
pub enum EncodeError {
    Abort,
    Failed(Error),
}

impl From<Error> for EncodeError {
    fn from(e: Error) -> Self {
        EncodeError::Failed(e)
    }
}

pub fn encode(state: &mut WorkerState, column: &str, value: &Value) -> Result<String, EncodeError> {
    if column == "instance_id" {
        return Ok(state.instance_id.to_string());
    }

    if column == "notification_id" {
        let handle = object_ref_handle(value).expect("notification_id field must carry an ObjectRef");
        let id = state.registry.get_insert_id(handle);
        debug_assert!(id.is_valid(), "notification insert id must already be captured");
        return Ok(id.get().to_string());
    }

    match value {
        Value::Null => Ok("NULL".to_owned()),
        Value::ObjectRef(handle, kind) => encode_object_ref(state, *handle, *kind),
        Value::Timestamp(ts) => Ok(format!("FROM_UNIXTIME({})", ts)),
        Value::TimestampNow => Ok("NOW()".to_owned()),
        Value::Scalar(scalar) => Ok(encode_scalar(state, scalar)),
    }
}

fn object_ref_handle(value: &Value) -> Option<ObjectHandle> {
    match value {
        Value::ObjectRef(handle, _) => Some(*handle),
        _ => None,
    }
}

fn encode_object_ref(state: &mut WorkerState, handle: ObjectHandle, kind: ObjectRefKind) -> Result<String, EncodeError> {
    if state.domain.describe(handle).is_none() {
        return Ok("0".to_owned());
    }

    match kind {
        ObjectRefKind::InsertId => {
            let id = state.registry.get_insert_id(handle);
            debug_assert!(id.is_valid(), "insert-id reference must already be captured");
            Ok(id.get().to_string())
        }
        ObjectRefKind::ObjectId => {
            let mut id = state.registry.get_object_id(handle);
            if !id.is_valid() {
                id = state.activate_object(handle)?;
            }
            if !id.is_valid() {
                return Err(EncodeError::Abort);
            }
            Ok(id.get().to_string())
        }
    }
}

fn encode_scalar(state: &WorkerState, scalar: &Scalar) -> String {
    match scalar {
        Scalar::Text(s) => state.driver.escape(s),
        Scalar::Int(n) => n.to_string(),
        Scalar::Double(d) => d.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fake::FakeDriver;
    use crate::ingress::{Domain, Ingress, ObjectDescriptor};
    use crate::registry::Registry;
    use crate::value::DbReference;

    struct StubDomain {
        known: bool,
    }

    impl Domain for StubDomain {
        fn describe(&self, _handle: ObjectHandle) -> Option<ObjectDescriptor> {
            if self.known {
                Some(ObjectDescriptor { objecttype_id: 1, name1: "host1".into(), name2: None })
            } else {
                None
            }
        }
        fn resolve(&self, _objecttype_id: i64, _name1: &str, _name2: Option<&str>) -> Option<ObjectHandle> {
            None
        }
        fn update_all_objects(&self, _bridge: &dyn Ingress) {}
    }

    fn state<'a>(driver: &'a mut FakeDriver, registry: &'a mut Registry, domain: &'a StubDomain) -> WorkerState<'a> {
        WorkerState { driver, registry, domain, instance_id: 1, table_prefix: "icinga_" }
    }

    #[test]
    fn instance_id_column_uses_literal_instance_id_ignoring_value() {
        let mut driver = FakeDriver::new();
        let mut registry = Registry::new();
        let domain = StubDomain { known: true };
        let mut s = state(&mut driver, &mut registry, &domain);
        let out = encode(&mut s, "instance_id", &Value::Null).unwrap();
        assert_eq!(out, "1");
    }

    #[test]
    fn timestamp_uses_from_unixtime() {
        let mut driver = FakeDriver::new();
        let mut registry = Registry::new();
        let domain = StubDomain { known: true };
        let mut s = state(&mut driver, &mut registry, &domain);
        let out = encode(&mut s, "last_check", &Value::Timestamp(1700000000)).unwrap();
        assert_eq!(out, "FROM_UNIXTIME(1700000000)");
    }

    #[test]
    fn timestamp_now_uses_now() {
        let mut driver = FakeDriver::new();
        let mut registry = Registry::new();
        let domain = StubDomain { known: true };
        let mut s = state(&mut driver, &mut registry, &domain);
        let out = encode(&mut s, "last_checkin_time", &Value::TimestampNow).unwrap();
        assert_eq!(out, "NOW()");
    }

    #[test]
    fn scalar_text_is_escaped_and_quoted() {
        let mut driver = FakeDriver::new();
        let mut registry = Registry::new();
        let domain = StubDomain { known: true };
        let mut s = state(&mut driver, &mut registry, &domain);
        let out = encode(&mut s, "output", &Value::from("it's fine")).unwrap();
        assert_eq!(out, "'it\\'s fine'");
    }

    #[test]
    fn object_ref_to_unknown_object_encodes_zero() {
        let mut driver = FakeDriver::new();
        let mut registry = Registry::new();
        let domain = StubDomain { known: false };
        let mut s = state(&mut driver, &mut registry, &domain);
        let out = encode(&mut s, "host_object_id", &Value::object_ref(ObjectHandle(1))).unwrap();
        assert_eq!(out, "0");
    }

    #[test]
    fn object_ref_activates_on_demand_when_not_yet_in_registry() {
        let mut driver = FakeDriver::new();
        let mut registry = Registry::new();
        let domain = StubDomain { known: true };
        let mut s = state(&mut driver, &mut registry, &domain);
        let out = encode(&mut s, "host_object_id", &Value::object_ref(ObjectHandle(5))).unwrap();
        assert_eq!(out, "1");
        assert!(registry.get_object_id(ObjectHandle(5)).is_valid());
    }

    #[test]
    fn insert_id_ref_uses_registry_insert_id() {
        let mut driver = FakeDriver::new();
        let mut registry = Registry::new();
        registry.set_insert_id(ObjectHandle(9), DbReference::valid(42));
        let domain = StubDomain { known: true };
        let mut s = state(&mut driver, &mut registry, &domain);
        let out = encode(&mut s, "notification_id", &Value::insert_id_ref(ObjectHandle(9))).unwrap();
        assert_eq!(out, "42");
    }
}
