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

//! The schema version gate. The writer carries a compiled-in expected
//! version and numerically compares it against the `dbversion` row found
//! on connect. Schema migration itself is out of scope; only the
//! version-gate semantics are implemented.

use crate::error::{Error, Result};

/// The schema version this crate was built against. A server whose
/// `dbversion.version` is older is rejected outright — the operator must
/// migrate before the writer will connect. A newer server version is
/// accepted (the writer only ever issues statements valid against the
/// documented column set, never schema DDL).
pub const SCHEMA_VERSION: &str = "1.11.0";

/// Parses a dotted version string (`"1.11.0"`) into its numeric
/// components so that `"1.9.0" < "1.11.0"` compares correctly — a plain
/// string comparison would get this backwards.
fn parse_version(version: &str) -> Result<Vec<u64>> {
    version
        .split('.')
        .map(|part| part.parse::<u64>().map_err(|_| Error::Schema(format!("invalid version component in `{}`", version))))
        .collect()
}

/// Compares a server-reported version against `SCHEMA_VERSION`.
/// Missing trailing components are treated as zero, so `"1.11"` and
/// `"1.11.0"` compare equal.
pub fn check_schema_version(server_version: &str) -> Result<()> {
    let server = parse_version(server_version)?;
    let required = parse_version(SCHEMA_VERSION)?;
    let len = server.len().max(required.len());
    for i in 0..len {
        let s = server.get(i).copied().unwrap_or(0);
        let r = required.get(i).copied().unwrap_or(0);
        if s < r {
            return Err(Error::Schema(format!(
                "server schema version {} is older than required {}; migrate the database before connecting",
                server_version, SCHEMA_VERSION
            )));
        }
        if s > r {
            return Ok(());
        }
    }
    Ok(())
}

/// Validates the row set the Connection Lifecycle reads from
/// `dbversion`. Exactly one row is required: zero rows means the table
/// was never populated, more than one means the database is shared by
/// conflicting schema generations.
pub fn validate_dbversion_rows(rows: &[String]) -> Result<&str> {
    match rows {
        [] => Err(Error::Schema("no `dbversion` row named 'idoutils' found".to_owned())),
        [version] => {
            check_schema_version(version)?;
            Ok(version.as_str())
        }
        _ => Err(Error::Schema(format!("expected exactly one `dbversion` row, found {}", rows.len()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_version_is_accepted() {
        assert!(check_schema_version("1.11.0").is_ok());
    }

    #[test]
    fn newer_server_version_is_accepted() {
        assert!(check_schema_version("1.12.0").is_ok());
        assert!(check_schema_version("2.0.0").is_ok());
    }

    #[test]
    fn older_server_version_is_fatal() {
        assert!(check_schema_version("1.10.0").is_err());
        assert!(check_schema_version("1.9.9").is_err());
    }

    #[test]
    fn numeric_not_lexicographic_comparison() {
        // a naive string compare would say "1.9.0" > "1.11.0"
        assert!(check_schema_version("1.9.0").is_err());
    }

    #[test]
    fn missing_trailing_component_defaults_to_zero() {
        assert!(check_schema_version("1.11").is_ok());
    }

    #[test]
    fn zero_dbversion_rows_is_an_error() {
        assert!(validate_dbversion_rows(&[]).is_err());
    }

    #[test]
    fn multiple_dbversion_rows_is_an_error() {
        assert!(validate_dbversion_rows(&["1.11.0".to_owned(), "1.11.0".to_owned()]).is_err());
    }

    #[test]
    fn single_valid_row_returns_its_version() {
        assert_eq!(validate_dbversion_rows(&["1.11.0".to_owned()]).unwrap(), "1.11.0");
    }
}
