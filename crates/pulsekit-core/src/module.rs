//! CNC module interface
//!
//! Defines the surface a host scheduler uses to drive an acquisition module:
//! one `start`, any number of `set`/`get` calls, one `finish` per cycle.

use crate::error::{ModuleError, Result};
use crate::value::CncValue;
use chrono::{DateTime, Utc};

/// A pluggable acquisition module
///
/// Implementations are single-threaded: the host calls them from its
/// acquisition loop and never concurrently.
pub trait CncModule: Send {
    /// Module name, used in logs and errors
    fn name(&self) -> &str;

    /// Begin an acquisition cycle at the given time
    fn start(&mut self, at: DateTime<Utc>) -> Result<()>;

    /// End the current acquisition cycle
    fn finish(&mut self) -> Result<()>;

    /// Set a value by key
    fn set(&mut self, key: &str, value: CncValue) -> Result<()>;

    /// Get a value by key
    fn get(&self, key: &str) -> Result<CncValue>;
}

/// Build the error returned for a key a module does not handle
pub fn unknown_key(module: &str, key: &str) -> crate::Error {
    ModuleError::UnknownKey {
        module: module.to_string(),
        key: key.to_string(),
    }
    .into()
}

fn invalid(key: &str, expected: &str, value: &CncValue) -> crate::Error {
    ModuleError::InvalidValue {
        key: key.to_string(),
        expected: expected.to_string(),
        actual: format!("{} ({})", value, value.kind()),
    }
    .into()
}

/// Read a boolean argument for `key`
pub fn expect_bool(key: &str, value: &CncValue) -> Result<bool> {
    value.as_bool().ok_or_else(|| invalid(key, "bool", value))
}

/// Read an integer argument for `key`
pub fn expect_i64(key: &str, value: &CncValue) -> Result<i64> {
    value.as_i64().ok_or_else(|| invalid(key, "int", value))
}

/// Read a floating point argument for `key`
pub fn expect_f64(key: &str, value: &CncValue) -> Result<f64> {
    value
        .as_f64()
        .filter(|d| d.is_finite())
        .ok_or_else(|| invalid(key, "finite double", value))
}

/// Accept `value` for `key` only if it can be serialized
///
/// Rejects values holding NaN or an infinity anywhere.
pub fn expect_finite(key: &str, value: CncValue) -> Result<CncValue> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(invalid(key, "finite value", &value))
    }
}

/// Read a text argument for `key`
///
/// Numbers are accepted and rendered, since controllers often report tool
/// or program identifiers as integers.
pub fn expect_text(key: &str, value: &CncValue) -> Result<String> {
    match value {
        CncValue::Text(s) => Ok(s.clone()),
        CncValue::Int(_) | CncValue::Double(_) => Ok(value.to_string()),
        _ => Err(invalid(key, "text", value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_expect_helpers() {
        assert!(expect_bool("Running", &CncValue::Bool(true)).unwrap());
        assert_eq!(expect_i64("Stamp", &CncValue::Int(42)).unwrap(), 42);
        assert_eq!(expect_text("Tool", &CncValue::Int(7)).unwrap(), "7");

        let err = expect_i64("Stamp", &CncValue::from("abc")).unwrap_err();
        assert!(matches!(
            err,
            Error::Module(ModuleError::InvalidValue { ref key, .. }) if key == "Stamp"
        ));
    }

    #[test]
    fn test_non_finite_rejected() {
        let err = expect_f64("SequenceMilestone", &CncValue::Double(f64::NAN)).unwrap_err();
        assert!(err.is_module_error());
        assert!(expect_f64("SequenceMilestone", &CncValue::from("inf")).is_err());
        assert_eq!(expect_f64("Feed", &CncValue::from("2.5")).unwrap(), 2.5);

        let nested = CncValue::List(vec![CncValue::Double(f64::NEG_INFINITY)]);
        assert!(expect_finite("Variable.x", nested).is_err());
        assert_eq!(
            expect_finite("Variable.x", CncValue::Int(3)).unwrap(),
            CncValue::Int(3)
        );
    }

    #[test]
    fn test_unknown_key() {
        let err = unknown_key("mtconnect", "Foo");
        assert_eq!(err.to_string(), "Unknown key 'Foo' for module mtconnect");
    }
}
