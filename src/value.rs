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

use std::fmt;

use crate::registry::ObjectHandle;

/// Opaque identifier for a row in the remote database. Distinguishes "no
/// row yet" from "row zero" — MySQL auto-increment columns start at 1, so
/// `0` is never a valid id, but the distinction is carried through a flag
/// rather than relying on that fact anywhere outside this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DbReference(Option<u64>);

impl DbReference {
    pub const fn invalid() -> Self {
        DbReference(None)
    }

    pub fn valid(id: u64) -> Self {
        DbReference(Some(id))
    }

    pub fn is_valid(&self) -> bool {
        self.0.is_some()
    }

    /// Panics if called on an invalid reference; callers are expected to
    /// check `is_valid` first, matching the assertion in the original
    /// `GetInsertID()` accessor this mirrors.
    pub fn get(&self) -> u64 {
        self.0.expect("DbReference::get called on an invalid reference")
    }
}

impl Default for DbReference {
    fn default() -> Self {
        DbReference::invalid()
    }
}

impl fmt::Display for DbReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(id) => write!(f, "{}", id),
            None => write!(f, "<invalid>"),
        }
    }
}

/// Whether an `ObjectRef` should resolve to the object's row id (`objects`
/// table) or to its last captured auto-increment insert id (a detail-table
/// row representing it). See `encoder::encode` rule 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectRefKind {
    ObjectId,
    InsertId,
}

/// A tagged value a field or WHERE clause entry can hold. The Composer and
/// Encoder match on this exhaustively; there is no dynamic downcasting.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Scalar(Scalar),
    Timestamp(i64),
    TimestampNow,
    ObjectRef(ObjectHandle, ObjectRefKind),
}

impl Value {
    pub fn object_ref(handle: ObjectHandle) -> Self {
        Value::ObjectRef(handle, ObjectRefKind::ObjectId)
    }

    pub fn insert_id_ref(handle: ObjectHandle) -> Self {
        Value::ObjectRef(handle, ObjectRefKind::InsertId)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Scalar(Scalar::Text(s.to_owned()))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Scalar(Scalar::Text(s))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Scalar(Scalar::Int(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Scalar(Scalar::Double(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Scalar(Scalar::Int(if b { 1 } else { 0 }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Text(String),
    Int(i64),
    Double(f64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_reference_is_not_valid() {
        assert!(!DbReference::invalid().is_valid());
        assert!(DbReference::valid(1).is_valid());
    }

    #[test]
    #[should_panic]
    fn get_on_invalid_reference_panics() {
        let _ = DbReference::invalid().get();
    }

    #[test]
    fn scalar_conversions() {
        assert!(matches!(Value::from("x"), Value::Scalar(Scalar::Text(_))));
        assert!(matches!(Value::from(1i64), Value::Scalar(Scalar::Int(1))));
        assert!(matches!(Value::from(true), Value::Scalar(Scalar::Int(1))));
    }
}
