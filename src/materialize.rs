// 🧪 Value Materializer - raw strings → typed attribute values
//
// Each data type has its own strictness:
// - String:   pass-through
// - Boolean:  exactly "true" is true, anything else false (never rejects)
// - Integer:  one bad value fails the whole result
// - DateTime: bad values are dropped, the rest survive

use crate::catalog::DataType;
use crate::error::{AttributeError, AttributeResult};
use crate::store::RawAttributeResult;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Long-form English date, e.g. "March 4, 2014".
pub const DATE_FORMAT: &str = "%B %d, %Y";

/// One typed value, always in its family's declared data type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TypedAttributeValue {
    String(String),
    Boolean(bool),
    Integer(i64),
    DateTime(DateTime<Utc>),
}

impl TypedAttributeValue {
    pub fn data_type(&self) -> DataType {
        match self {
            TypedAttributeValue::String(_) => DataType::String,
            TypedAttributeValue::Boolean(_) => DataType::Boolean,
            TypedAttributeValue::Integer(_) => DataType::Integer,
            TypedAttributeValue::DateTime(_) => DataType::DateTime,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TypedAttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TypedAttributeValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            TypedAttributeValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            TypedAttributeValue::DateTime(d) => Some(*d),
            _ => None,
        }
    }
}

impl std::fmt::Display for TypedAttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypedAttributeValue::String(s) => write!(f, "{}", s),
            TypedAttributeValue::Boolean(b) => write!(f, "{}", b),
            TypedAttributeValue::Integer(i) => write!(f, "{}", i),
            TypedAttributeValue::DateTime(d) => write!(f, "{}", d.to_rfc3339()),
        }
    }
}

/// Convert a raw result into typed values using its declared type.
///
/// A result without a declared type (unknown family) yields no values.
pub fn materialize(raw: &RawAttributeResult) -> AttributeResult<Vec<TypedAttributeValue>> {
    let Some(data_type) = raw.declared_type else {
        return Ok(Vec::new());
    };

    let values = raw.values.iter().map(String::as_str);
    let result: Vec<TypedAttributeValue> = match data_type {
        DataType::String => values
            .map(|s| TypedAttributeValue::String(s.to_string()))
            .collect(),
        DataType::Boolean => values
            .map(|s| TypedAttributeValue::Boolean(parse_boolean(s)))
            .collect(),
        DataType::Integer => values
            .map(|s| parse_integer(s).map(TypedAttributeValue::Integer))
            .collect::<AttributeResult<Vec<_>>>()?,
        DataType::DateTime => values
            .filter_map(|s| match parse_date(s) {
                Some(d) => Some(TypedAttributeValue::DateTime(d)),
                None => {
                    warn!("Could not parse date [{}], dropping value", s);
                    None
                }
            })
            .collect(),
    };

    debug!("Materialized {} {} value(s)", result.len(), data_type);
    Ok(result)
}

pub fn parse_boolean(raw: &str) -> bool {
    raw == "true"
}

pub fn parse_integer(raw: &str) -> AttributeResult<i64> {
    raw.parse().map_err(|_| AttributeError::TypeCoercion {
        value: raw.to_string(),
        data_type: DataType::Integer,
    })
}

/// Midnight UTC of the given long-form date.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone};
    use std::collections::BTreeSet;

    fn raw(values: &[&str], data_type: Option<DataType>) -> RawAttributeResult {
        RawAttributeResult::new(
            values.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
            data_type,
        )
    }

    #[test]
    fn test_untyped_result_is_empty() {
        let out = materialize(&raw(&["x", "y"], None)).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_strings_pass_through() {
        let out = materialize(&raw(&["b", "a"], Some(DataType::String))).unwrap();
        assert_eq!(
            out,
            vec![
                TypedAttributeValue::String("a".into()),
                TypedAttributeValue::String("b".into())
            ]
        );
    }

    #[test]
    fn test_boolean_is_total() {
        let input = ["true", "TRUE", "false", "yes", ""];
        let out = materialize(&raw(&input, Some(DataType::Boolean))).unwrap();
        assert_eq!(out.len(), input.len());
        assert_eq!(out.iter().filter(|v| v.as_bool() == Some(true)).count(), 1);
    }

    #[test]
    fn test_integer_round_trip() {
        let out = materialize(&raw(&["42"], Some(DataType::Integer))).unwrap();
        assert_eq!(out, vec![TypedAttributeValue::Integer(42)]);
    }

    #[test]
    fn test_integer_accepts_sign() {
        let out = materialize(&raw(&["-7", "+3"], Some(DataType::Integer))).unwrap();
        let mut ints: Vec<i64> = out.iter().filter_map(|v| v.as_integer()).collect();
        ints.sort();
        assert_eq!(ints, vec![-7, 3]);
    }

    #[test]
    fn test_integer_fails_fast() {
        let err = materialize(&raw(&["1", "two", "3"], Some(DataType::Integer))).unwrap_err();
        match err {
            AttributeError::TypeCoercion { value, data_type } => {
                assert_eq!(value, "two");
                assert_eq!(data_type, DataType::Integer);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_datetime_drops_unparsable_values() {
        let out = materialize(&raw(
            &["March 4, 2014", "not a date", "December 25, 2020"],
            Some(DataType::DateTime),
        ))
        .unwrap();
        assert_eq!(out.len(), 2);

        let expected = Utc.with_ymd_and_hms(2014, 3, 4, 0, 0, 0).unwrap();
        assert!(out.contains(&TypedAttributeValue::DateTime(expected)));
    }

    #[test]
    fn test_parse_date_formats() {
        let d = parse_date("January 15, 2024").unwrap();
        assert_eq!((d.year(), d.month(), d.day()), (2024, 1, 15));
        assert!(parse_date("2024-01-15").is_none());
        assert!(parse_date("Smarch 1, 2024").is_none());
    }

    #[test]
    fn test_value_types_match_declared_type() {
        let out = materialize(&raw(&["true"], Some(DataType::Boolean))).unwrap();
        assert!(out.iter().all(|v| v.data_type() == DataType::Boolean));
    }
}
