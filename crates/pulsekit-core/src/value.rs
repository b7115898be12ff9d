//! Values delivered by CNC drivers
//!
//! Every driver reports its data as a [`CncValue`]. The representation is
//! deliberately loose: a controller may report a mode as an integer on one
//! machine and as a string on another, so interpretation is left to the
//! module consuming the value.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Tolerance used when comparing doubles for change detection.
pub const DOUBLE_TOLERANCE: f64 = 1e-9;

/// A value read from a controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CncValue {
    /// Boolean signal
    Bool(bool),
    /// Integer value (counters, ids, codes)
    Int(i64),
    /// Floating point value (positions, rates)
    Double(f64),
    /// Text value (program names, tool ids)
    Text(String),
    /// Ordered list of values
    List(Vec<CncValue>),
    /// Named values
    Map(BTreeMap<String, CncValue>),
}

impl CncValue {
    /// Get the value as a boolean
    ///
    /// Integers are accepted with the usual 0/non-zero convention.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CncValue::Bool(b) => Some(*b),
            CncValue::Int(i) => Some(*i != 0),
            _ => None,
        }
    }

    /// Get the value as an integer
    ///
    /// Doubles are accepted only when they carry no fractional part.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CncValue::Int(i) => Some(*i),
            CncValue::Double(d) if d.fract() == 0.0 && d.is_finite() => Some(*d as i64),
            CncValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Get the value as a double
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CncValue::Double(d) => Some(*d),
            CncValue::Int(i) => Some(*i as f64),
            CncValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Get the value as a string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CncValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get the value as a map of named values
    pub fn as_map(&self) -> Option<&BTreeMap<String, CncValue>> {
        match self {
            CncValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Get the value as a list
    pub fn as_list(&self) -> Option<&[CncValue]> {
        match self {
            CncValue::List(l) => Some(l),
            _ => None,
        }
    }

    /// Short name of the variant, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            CncValue::Bool(_) => "bool",
            CncValue::Int(_) => "int",
            CncValue::Double(_) => "double",
            CncValue::Text(_) => "text",
            CncValue::List(_) => "list",
            CncValue::Map(_) => "map",
        }
    }

    /// Whether every double in the value, nested ones included, is finite
    ///
    /// NaN and infinities have no JSON form, so they cannot be queued.
    pub fn is_finite(&self) -> bool {
        match self {
            CncValue::Double(d) => d.is_finite(),
            CncValue::List(items) => items.iter().all(CncValue::is_finite),
            CncValue::Map(items) => items.values().all(CncValue::is_finite),
            _ => true,
        }
    }

    /// Compare two values for change detection
    ///
    /// Numbers compare numerically across `Int` and `Double`, doubles within
    /// [`DOUBLE_TOLERANCE`]. NaN is the same as NaN, so a stuck NaN signal
    /// is not reported as a change every cycle.
    pub fn same_as(&self, other: &CncValue) -> bool {
        match (self, other) {
            (CncValue::Int(a), CncValue::Int(b)) => a == b,
            (CncValue::Double(_), CncValue::Double(_))
            | (CncValue::Int(_), CncValue::Double(_))
            | (CncValue::Double(_), CncValue::Int(_)) => {
                match (self.as_f64(), other.as_f64()) {
                    (Some(a), Some(b)) if a.is_nan() || b.is_nan() => a.is_nan() && b.is_nan(),
                    (Some(a), Some(b)) => a == b || (a - b).abs() <= DOUBLE_TOLERANCE,
                    _ => false,
                }
            }
            (CncValue::List(a), CncValue::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_as(y))
            }
            (CncValue::Map(a), CncValue::Map(b)) => {
                a.len() == b.len()
                    && a
                        .iter()
                        .zip(b)
                        .all(|((ka, va), (kb, vb))| ka == kb && va.same_as(vb))
            }
            _ => self == other,
        }
    }
}

impl fmt::Display for CncValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CncValue::Bool(b) => write!(f, "{}", b),
            CncValue::Int(i) => write!(f, "{}", i),
            CncValue::Double(d) => {
                let text = format!("{:.6}", d);
                let text = text.trim_end_matches('0').trim_end_matches('.');
                write!(f, "{}", text)
            }
            CncValue::Text(s) => write!(f, "{}", s),
            CncValue::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "{}", parts.join(","))
            }
            CncValue::Map(map) => {
                let parts: Vec<String> = map.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                write!(f, "{}", parts.join(","))
            }
        }
    }
}

impl From<bool> for CncValue {
    fn from(value: bool) -> Self {
        CncValue::Bool(value)
    }
}

impl From<i64> for CncValue {
    fn from(value: i64) -> Self {
        CncValue::Int(value)
    }
}

impl From<i32> for CncValue {
    fn from(value: i32) -> Self {
        CncValue::Int(value as i64)
    }
}

impl From<u32> for CncValue {
    fn from(value: u32) -> Self {
        CncValue::Int(value as i64)
    }
}

impl From<f64> for CncValue {
    fn from(value: f64) -> Self {
        CncValue::Double(value)
    }
}

impl From<&str> for CncValue {
    fn from(value: &str) -> Self {
        CncValue::Text(value.to_string())
    }
}

impl From<String> for CncValue {
    fn from(value: String) -> Self {
        CncValue::Text(value)
    }
}

impl From<BTreeMap<String, CncValue>> for CncValue {
    fn from(value: BTreeMap<String, CncValue>) -> Self {
        CncValue::Map(value)
    }
}

impl From<Vec<CncValue>> for CncValue {
    fn from(value: Vec<CncValue>) -> Self {
        CncValue::List(value)
    }
}
