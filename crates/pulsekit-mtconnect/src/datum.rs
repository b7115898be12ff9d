//! MTConnect data items
//!
//! A [`DeviceDatum`] holds the SHDR rendering of its current value and a
//! changed flag. The flag is raised only when the rendered value differs, so
//! resetting a data item to the same value sends nothing.

use crate::buffer::ShdrBuffer;
use crate::error::{ShdrError, ShdrResult};
use pulsekit_core::CncValue;
use std::fmt;

/// SHDR text of a data item without value
pub const UNAVAILABLE: &str = "UNAVAILABLE";

/// Kind of a data item, deciding which values it accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatumKind {
    /// AVAILABLE / UNAVAILABLE
    Availability,
    /// Execution state
    Execution,
    /// Controller mode
    ControllerMode,
    /// Free text event
    Event,
    /// Integer event
    IntEvent,
    /// Numeric sample
    Sample,
}

impl fmt::Display for DatumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DatumKind::Availability => "Availability",
            DatumKind::Execution => "Execution",
            DatumKind::ControllerMode => "ControllerMode",
            DatumKind::Event => "Event",
            DatumKind::IntEvent => "IntEvent",
            DatumKind::Sample => "Sample",
        };
        write!(f, "{}", name)
    }
}

/// Availability of the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilityValue {
    Available,
    Unavailable,
}

/// Execution state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Execution {
    Ready,
    Active,
    Interrupted,
    Stopped,
}

/// Controller mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerModeValue {
    Automatic,
    Manual,
    ManualDataInput,
    SemiAutomatic,
}

impl AvailabilityValue {
    pub fn as_shdr(&self) -> &'static str {
        match self {
            AvailabilityValue::Available => "AVAILABLE",
            AvailabilityValue::Unavailable => UNAVAILABLE,
        }
    }
}

impl Execution {
    pub fn as_shdr(&self) -> &'static str {
        match self {
            Execution::Ready => "READY",
            Execution::Active => "ACTIVE",
            Execution::Interrupted => "INTERRUPTED",
            Execution::Stopped => "STOPPED",
        }
    }
}

impl ControllerModeValue {
    pub fn as_shdr(&self) -> &'static str {
        match self {
            ControllerModeValue::Automatic => "AUTOMATIC",
            ControllerModeValue::Manual => "MANUAL",
            ControllerModeValue::ManualDataInput => "MANUAL_DATA_INPUT",
            ControllerModeValue::SemiAutomatic => "SEMI_AUTOMATIC",
        }
    }
}

/// A value offered to a data item
#[derive(Debug, Clone, PartialEq)]
pub enum DatumValue {
    Availability(AvailabilityValue),
    Execution(Execution),
    ControllerMode(ControllerModeValue),
    Text(String),
    Int(i64),
    Double(f64),
}

impl DatumValue {
    fn accepted_by(&self, kind: DatumKind) -> bool {
        matches!(
            (kind, self),
            (DatumKind::Availability, DatumValue::Availability(_))
                | (DatumKind::Execution, DatumValue::Execution(_))
                | (DatumKind::ControllerMode, DatumValue::ControllerMode(_))
                | (DatumKind::Event, DatumValue::Text(_))
                | (DatumKind::Event, DatumValue::Int(_))
                | (DatumKind::Event, DatumValue::Double(_))
                | (DatumKind::IntEvent, DatumValue::Int(_))
                | (DatumKind::Sample, DatumValue::Int(_))
                | (DatumKind::Sample, DatumValue::Double(_))
        )
    }

    /// SHDR rendering; `|` would break the line format and is replaced
    fn render(&self) -> String {
        match self {
            DatumValue::Availability(v) => v.as_shdr().to_string(),
            DatumValue::Execution(v) => v.as_shdr().to_string(),
            DatumValue::ControllerMode(v) => v.as_shdr().to_string(),
            DatumValue::Text(s) => s.replace(['|', '\n', '\r'], " "),
            DatumValue::Int(i) => i.to_string(),
            DatumValue::Double(d) => CncValue::Double(*d).to_string(),
        }
    }
}

impl fmt::Display for DatumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

/// One MTConnect data item published by the adapter
#[derive(Debug, Clone)]
pub struct DeviceDatum {
    name: String,
    kind: DatumKind,
    value: Option<String>,
    has_value: bool,
    changed: bool,
}

impl DeviceDatum {
    /// New data item, unavailable until set
    pub fn new(name: impl Into<String>, kind: DatumKind) -> Self {
        Self {
            name: name.into(),
            kind,
            value: None,
            has_value: false,
            changed: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> DatumKind {
        self.kind
    }

    /// Current SHDR text, `None` when unavailable
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Whether the value changed since it was last appended
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Whether the data item was ever set, and so belongs in initial data
    pub fn has_initial_value(&self) -> bool {
        self.has_value
    }

    /// Set the value; returns whether it changed
    pub fn set(&mut self, value: DatumValue) -> ShdrResult<bool> {
        if !value.accepted_by(self.kind) {
            return Err(ShdrError::KindMismatch {
                name: self.name.clone(),
                kind: self.kind,
                value: value.render(),
            });
        }
        self.has_value = true;
        let rendered = value.render();
        if self.value.as_deref() == Some(rendered.as_str()) {
            return Ok(false);
        }
        self.value = Some(rendered);
        self.changed = true;
        Ok(true)
    }

    /// Mark the value unavailable; returns whether it changed
    pub fn unavailable(&mut self) -> bool {
        if self.value.is_none() {
            return false;
        }
        self.value = None;
        self.changed = true;
        true
    }

    /// `|name|value` as written on an SHDR line
    pub fn shdr_field(&self) -> String {
        format!("|{}|{}", self.name, self.value.as_deref().unwrap_or(UNAVAILABLE))
    }

    /// Write the data item to `buffer` and clear the changed flag
    pub fn append(&mut self, buffer: &mut ShdrBuffer) {
        buffer.append(self);
        self.mark_published();
    }

    /// Clear the changed flag
    pub fn mark_published(&mut self) {
        self.changed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changed_only_on_new_value() {
        let mut x = DeviceDatum::new("Xact", DatumKind::Sample);
        assert!(!x.has_initial_value());
        assert_eq!(x.shdr_field(), "|Xact|UNAVAILABLE");

        assert!(x.set(DatumValue::Double(12.5)).unwrap());
        assert!(x.is_changed());
        assert_eq!(x.value(), Some("12.5"));

        let mut buffer = ShdrBuffer::new();
        x.append(&mut buffer);
        assert!(!x.is_changed());
        assert!(!x.set(DatumValue::Double(12.5)).unwrap());
        assert!(!x.is_changed());
    }

    #[test]
    fn test_unavailable() {
        let mut exec = DeviceDatum::new("execution", DatumKind::Execution);
        assert!(!exec.unavailable());
        exec.set(DatumValue::Execution(Execution::Active)).unwrap();
        assert!(exec.unavailable());
        assert!(exec.has_initial_value());
        assert_eq!(exec.shdr_field(), "|execution|UNAVAILABLE");
    }

    #[test]
    fn test_kind_mismatch() {
        let mut count = DeviceDatum::new("part_count", DatumKind::IntEvent);
        let err = count.set(DatumValue::Text("many".to_string())).unwrap_err();
        assert!(matches!(err, ShdrError::KindMismatch { .. }));
        assert!(!count.has_initial_value());
    }

    #[test]
    fn test_text_is_sanitized() {
        let mut program = DeviceDatum::new("program", DatumKind::Event);
        program
            .set(DatumValue::Text("O1000|rough\n".to_string()))
            .unwrap();
        assert_eq!(program.value(), Some("O1000 rough "));
    }

    #[test]
    fn test_enum_rendering() {
        assert_eq!(ControllerModeValue::ManualDataInput.as_shdr(), "MANUAL_DATA_INPUT");
        assert_eq!(Execution::Interrupted.as_shdr(), "INTERRUPTED");
        assert_eq!(AvailabilityValue::Available.as_shdr(), "AVAILABLE");
    }
}
