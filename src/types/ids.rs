//! Row identifiers for stored records.
//!
//! Each table gets its own newtype so a scan id can never be passed where an
//! alert id is expected.

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Human-readable record kind, used in error messages.
            pub const KIND: &'static str = $kind;

            /// Wrap a raw row id.
            pub fn new(id: i64) -> Self {
                Self(id)
            }

            /// Get the raw row id.
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().parse::<i64>() {
                    Ok(id) if id > 0 => Ok(Self(id)),
                    _ => Err(IdParseError {
                        kind: $kind,
                        input: s.to_string(),
                    }),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                self.0.to_sql()
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                i64::column_result(value).map(Self)
            }
        }
    };
}

row_id!(
    /// Identifier of a stored security scan result.
    ScanId,
    "scan"
);

row_id!(
    /// Identifier of an alert rule.
    RuleId,
    "alert rule"
);

row_id!(
    /// Identifier of a single alert row.
    AlertId,
    "alert"
);

/// Error returned when an id string is not a positive integer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} id: {input:?}")]
pub struct IdParseError {
    kind: &'static str,
    input: String,
}

impl From<IdParseError> for crate::error::ValidationError {
    fn from(err: IdParseError) -> Self {
        Self::InvalidField {
            field: "id",
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id() {
        let id: ScanId = "42".parse().unwrap();
        assert_eq!(id.get(), 42);
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("abc".parse::<RuleId>().is_err());
        assert!("0".parse::<AlertId>().is_err());
        assert!("-3".parse::<AlertId>().is_err());
    }

    #[test]
    fn test_parse_error_names_kind() {
        let err = "x1".parse::<RuleId>().unwrap_err();
        assert_eq!(err.to_string(), "invalid alert rule id: \"x1\"");
    }
}
