//! Guessing which polygon property holds the ward number.
//!
//! Ward boundary exports do not agree on a name for the identifier field
//! (`WARD`, `WARD_NUM`, `WARDID`, ...), so instead of matching on names we
//! score every field by how much its values look like small ward numbers.

use std::ops::RangeInclusive;

use serde_json::Value;

use crate::error::SchemaError;

/// Metadata attached to one polygon. Field order is the order of the source.
pub type Properties = serde_json::Map<String, Value>;

pub const WARD_NUMBER_RANGE: RangeInclusive<i64> = 1..=30;

pub trait IdFieldStrategy {
    fn infer(&self, records: &[Properties]) -> Result<String, SchemaError>;
}

/// Scores a field as `parsed + parsed_in_range`.
#[derive(Debug, Clone)]
pub struct PlausibleRange {
    pub range: RangeInclusive<i64>,
}

impl Default for PlausibleRange {
    fn default() -> Self {
        Self {
            range: WARD_NUMBER_RANGE,
        }
    }
}

impl PlausibleRange {
    pub fn score<'a, I>(&self, values: I) -> Option<usize>
    where
        I: IntoIterator<Item = Option<&'a Value>>,
    {
        let mut ok = 0;
        let mut in_range = 0;
        for v in values {
            if let Some(id) = v.and_then(parse_int) {
                ok += 1;
                if self.range.contains(&id) {
                    in_range += 1;
                }
            }
        }

        if ok == 0 {
            None
        } else {
            Some(ok + in_range)
        }
    }
}

impl IdFieldStrategy for PlausibleRange {
    fn infer(&self, records: &[Properties]) -> Result<String, SchemaError> {
        let first = records.first().ok_or(SchemaError::NoRecords)?;

        let mut best: Option<(&String, usize)> = None;
        for key in first.keys() {
            let Some(score) = self.score(records.iter().map(|r| r.get(key))) else {
                continue;
            };
            // strictly greater keeps the earliest field on ties
            if best.map(|(_, s)| score > s).unwrap_or(true) {
                best = Some((key, score));
            }
        }

        best.map(|(k, _)| k.clone())
            .ok_or_else(|| SchemaError::NoIdentifierField {
                candidates: first.keys().cloned().collect(),
            })
    }
}

/// Integer reading of a property value. Strings are trimmed; floats and
/// booleans never count, even when they hold a whole number.
pub fn parse_int(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}
