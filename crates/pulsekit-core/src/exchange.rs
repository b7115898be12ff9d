//! Outbound exchange data
//!
//! An [`ExchangeData`] is one event queued for the persistence layer:
//! a command, the machine it belongs to, when it happened and its payload.
//! Records are immutable once built; the output module only decides whether
//! and when to queue them.

use crate::value::CncValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kind of exchange data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExchangeDataCommand {
    /// New machine mode (value: machine mode id)
    MachineMode,
    /// A cycle began
    StartCycle,
    /// A cycle ended (value: produced quantity)
    StopCycle,
    /// New stamp (value: stamp id)
    Stamp,
    /// Sequence milestone (value: seconds since the sequence began)
    SequenceMilestone,
    /// CNC variable set (key: variable, value: variable value)
    CncVariableSet,
    /// Field value (key: field, value: field value)
    CncValue,
    /// Field no longer reported (key: field)
    StopCncValue,
    /// Alarm raised (key: alarm key, value: alarm)
    CncAlarm,
    /// Alarm cleared (key: alarm key)
    StopCncAlarm,
}

impl ExchangeDataCommand {
    /// Whether a record of this kind must never be shed under backpressure
    ///
    /// Field values are refreshed continuously and can be dropped; everything
    /// else carries detection state the persistence layer cannot rebuild.
    pub fn is_essential(&self) -> bool {
        !matches!(
            self,
            ExchangeDataCommand::CncValue | ExchangeDataCommand::StopCncValue
        )
    }
}

impl fmt::Display for ExchangeDataCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExchangeDataCommand::MachineMode => "MachineMode",
            ExchangeDataCommand::StartCycle => "StartCycle",
            ExchangeDataCommand::StopCycle => "StopCycle",
            ExchangeDataCommand::Stamp => "Stamp",
            ExchangeDataCommand::SequenceMilestone => "SequenceMilestone",
            ExchangeDataCommand::CncVariableSet => "CncVariableSet",
            ExchangeDataCommand::CncValue => "CncValue",
            ExchangeDataCommand::StopCncValue => "StopCncValue",
            ExchangeDataCommand::CncAlarm => "CncAlarm",
            ExchangeDataCommand::StopCncAlarm => "StopCncAlarm",
        };
        write!(f, "{}", name)
    }
}

/// An alarm reported by a controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CncAlarm {
    /// Source of the alarm on the controller (e.g. "PLC", "NC")
    pub cnc_info: String,
    /// Alarm category
    pub alarm_type: String,
    /// Alarm number, as reported
    pub number: String,
    /// Alarm message
    #[serde(default)]
    pub message: String,
    /// Additional vendor properties
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl CncAlarm {
    /// Create an alarm without properties
    pub fn new(
        cnc_info: impl Into<String>,
        alarm_type: impl Into<String>,
        number: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            cnc_info: cnc_info.into(),
            alarm_type: alarm_type.into(),
            number: number.into(),
            message: message.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Identity of the alarm across acquisitions
    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.cnc_info, self.alarm_type, self.number)
    }

    /// Alarm as a [`CncValue::Map`]
    pub fn to_value(&self) -> CncValue {
        let mut map = BTreeMap::new();
        map.insert("cnc_info".to_string(), CncValue::from(self.cnc_info.as_str()));
        map.insert("alarm_type".to_string(), CncValue::from(self.alarm_type.as_str()));
        map.insert("number".to_string(), CncValue::from(self.number.as_str()));
        map.insert("message".to_string(), CncValue::from(self.message.as_str()));
        if !self.properties.is_empty() {
            let props = self
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), CncValue::from(v.as_str())))
                .collect::<BTreeMap<_, _>>();
            map.insert("properties".to_string(), CncValue::Map(props));
        }
        CncValue::Map(map)
    }

    /// Build an alarm from a [`CncValue::Map`]
    ///
    /// `cnc_info`, `alarm_type` and `number` are required; numbers may be
    /// given as integers.
    pub fn from_value(value: &CncValue) -> Option<Self> {
        let map = value.as_map()?;
        let text = |key: &str| map.get(key).map(|v| v.to_string());
        let properties = map
            .get("properties")
            .and_then(|p| p.as_map())
            .map(|p| p.iter().map(|(k, v)| (k.clone(), v.to_string())).collect())
            .unwrap_or_default();
        Some(Self {
            cnc_info: text("cnc_info")?,
            alarm_type: text("alarm_type")?,
            number: text("number")?,
            message: text("message").unwrap_or_default(),
            properties,
        })
    }
}

/// One event queued for persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeData {
    /// What happened
    pub command: ExchangeDataCommand,
    /// Machine the data belongs to
    pub machine_id: u32,
    /// Machine module the data was read from
    pub machine_module_id: u32,
    /// When it happened (acquisition time)
    pub at: DateTime<Utc>,
    /// Variable, field or alarm key; empty when the command has none
    #[serde(default)]
    pub key: String,
    /// Payload
    pub value: CncValue,
}

impl ExchangeData {
    fn build(
        command: ExchangeDataCommand,
        machine_id: u32,
        machine_module_id: u32,
        at: DateTime<Utc>,
        key: impl Into<String>,
        value: CncValue,
    ) -> Self {
        Self {
            command,
            machine_id,
            machine_module_id,
            at,
            key: key.into(),
            value,
        }
    }

    /// New machine mode
    pub fn machine_mode(machine_id: u32, module_id: u32, at: DateTime<Utc>, mode_id: i64) -> Self {
        Self::build(
            ExchangeDataCommand::MachineMode,
            machine_id,
            module_id,
            at,
            "",
            CncValue::Int(mode_id),
        )
    }

    /// Cycle start
    pub fn start_cycle(machine_id: u32, module_id: u32, at: DateTime<Utc>) -> Self {
        Self::build(
            ExchangeDataCommand::StartCycle,
            machine_id,
            module_id,
            at,
            "",
            CncValue::Bool(true),
        )
    }

    /// Cycle end with the produced quantity
    pub fn stop_cycle(machine_id: u32, module_id: u32, at: DateTime<Utc>, quantity: i64) -> Self {
        Self::build(
            ExchangeDataCommand::StopCycle,
            machine_id,
            module_id,
            at,
            "",
            CncValue::Int(quantity),
        )
    }

    /// New stamp
    pub fn stamp(machine_id: u32, module_id: u32, at: DateTime<Utc>, stamp_id: i64) -> Self {
        Self::build(
            ExchangeDataCommand::Stamp,
            machine_id,
            module_id,
            at,
            "",
            CncValue::Int(stamp_id),
        )
    }

    /// Sequence milestone, in seconds
    pub fn sequence_milestone(
        machine_id: u32,
        module_id: u32,
        at: DateTime<Utc>,
        seconds: f64,
    ) -> Self {
        Self::build(
            ExchangeDataCommand::SequenceMilestone,
            machine_id,
            module_id,
            at,
            "",
            CncValue::Double(seconds),
        )
    }

    /// CNC variable set
    pub fn variable_set(
        machine_id: u32,
        module_id: u32,
        at: DateTime<Utc>,
        variable: impl Into<String>,
        value: CncValue,
    ) -> Self {
        Self::build(
            ExchangeDataCommand::CncVariableSet,
            machine_id,
            module_id,
            at,
            variable,
            value,
        )
    }

    /// Field value
    pub fn cnc_value(
        machine_id: u32,
        module_id: u32,
        at: DateTime<Utc>,
        field: impl Into<String>,
        value: CncValue,
    ) -> Self {
        Self::build(
            ExchangeDataCommand::CncValue,
            machine_id,
            module_id,
            at,
            field,
            value,
        )
    }

    /// Field no longer reported
    pub fn stop_cnc_value(
        machine_id: u32,
        module_id: u32,
        at: DateTime<Utc>,
        field: impl Into<String>,
    ) -> Self {
        Self::build(
            ExchangeDataCommand::StopCncValue,
            machine_id,
            module_id,
            at,
            field,
            CncValue::Bool(false),
        )
    }

    /// Alarm raised
    pub fn alarm(machine_id: u32, module_id: u32, at: DateTime<Utc>, alarm: &CncAlarm) -> Self {
        Self::build(
            ExchangeDataCommand::CncAlarm,
            machine_id,
            module_id,
            at,
            alarm.key(),
            alarm.to_value(),
        )
    }

    /// Alarm cleared
    pub fn stop_alarm(
        machine_id: u32,
        module_id: u32,
        at: DateTime<Utc>,
        alarm_key: impl Into<String>,
    ) -> Self {
        Self::build(
            ExchangeDataCommand::StopCncAlarm,
            machine_id,
            module_id,
            at,
            alarm_key,
            CncValue::Bool(false),
        )
    }

    /// Whether this record must never be shed
    pub fn is_essential(&self) -> bool {
        self.command.is_essential()
    }
}

impl fmt::Display for ExchangeData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} m{}/{} @{}",
            self.command,
            self.machine_id,
            self.machine_module_id,
            self.at.format("%Y-%m-%dT%H:%M:%S%.3fZ")
        )?;
        if !self.key.is_empty() {
            write!(f, " {}", self.key)?;
        }
        write!(f, " = {}", self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_essential_commands() {
        assert!(ExchangeDataCommand::MachineMode.is_essential());
        assert!(ExchangeDataCommand::StopCycle.is_essential());
        assert!(ExchangeDataCommand::CncAlarm.is_essential());
        assert!(!ExchangeDataCommand::CncValue.is_essential());
        assert!(!ExchangeDataCommand::StopCncValue.is_essential());
    }

    #[test]
    fn test_alarm_key_and_value() {
        let mut alarm = CncAlarm::new("NC", "Servo", "401", "Servo alarm");
        alarm.properties.insert("axis".to_string(), "X".to_string());
        assert_eq!(alarm.key(), "NC/Servo/401");

        let back = CncAlarm::from_value(&alarm.to_value()).unwrap();
        assert_eq!(back, alarm);
    }

    #[test]
    fn test_alarm_from_value_requires_identity() {
        let mut map = BTreeMap::new();
        map.insert("cnc_info".to_string(), CncValue::from("PLC"));
        map.insert("number".to_string(), CncValue::Int(12));
        assert!(CncAlarm::from_value(&CncValue::Map(map.clone())).is_none());

        map.insert("alarm_type".to_string(), CncValue::from("Warning"));
        let alarm = CncAlarm::from_value(&CncValue::Map(map)).unwrap();
        assert_eq!(alarm.number, "12");
        assert_eq!(alarm.message, "");
    }

    #[test]
    fn test_display() {
        let data = ExchangeData::variable_set(1, 2, t0(), "Part", CncValue::from("A12"));
        assert_eq!(
            data.to_string(),
            "CncVariableSet m1/2 @2024-03-01T08:00:00.000Z Part = A12"
        );
        let data = ExchangeData::machine_mode(1, 2, t0(), 3);
        assert_eq!(data.to_string(), "MachineMode m1/2 @2024-03-01T08:00:00.000Z = 3");
    }

    #[test]
    fn test_json_shape() {
        let data = ExchangeData::stop_cycle(4, 5, t0(), 2);
        let json = serde_json::to_string(&data).unwrap();
        let back: ExchangeData = serde_json::from_str(&json).unwrap();
        assert_eq!(back, data);
        assert!(json.contains("\"command\":\"StopCycle\""));
    }
}
