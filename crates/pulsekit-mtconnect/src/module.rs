//! MTConnect adapter module
//!
//! Exposes a fixed set of controller data items through the module key/value
//! surface. Data items are created the first time they are set, so an agent
//! only sees what the driver chain actually reports. Setting any data item
//! marks the device available.

use crate::adapter::Adapter;
use crate::datum::{
    AvailabilityValue, ControllerModeValue, DatumKind, DatumValue, DeviceDatum, Execution,
};
use chrono::{DateTime, Utc};
use pulsekit_core::{
    expect_bool, expect_f64, expect_i64, expect_text, unknown_key, CncModule, CncValue,
    ModuleError, Result,
};
use std::collections::HashMap;

/// Axis positions; axes left `None` are not updated
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AxisPosition {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub u: Option<f64>,
    pub v: Option<f64>,
    pub w: Option<f64>,
    pub a: Option<f64>,
    pub b: Option<f64>,
    pub c: Option<f64>,
}

impl AxisPosition {
    /// Read a map of axis letters (either case) to numbers
    pub fn from_value(value: &CncValue) -> Option<Self> {
        let map = value.as_map()?;
        let mut position = AxisPosition::default();
        for (axis, coordinate) in map {
            let coordinate = coordinate.as_f64()?;
            let slot = match axis.to_ascii_uppercase().as_str() {
                "X" => &mut position.x,
                "Y" => &mut position.y,
                "Z" => &mut position.z,
                "U" => &mut position.u,
                "V" => &mut position.v,
                "W" => &mut position.w,
                "A" => &mut position.a,
                "B" => &mut position.b,
                "C" => &mut position.c,
                _ => return None,
            };
            *slot = Some(coordinate);
        }
        Some(position)
    }
}

/// CNC module publishing controller data to MTConnect agents
#[derive(Debug)]
pub struct MtConnectModule {
    name: String,
    acquisition_name: String,
    adapter: Adapter,
    items: HashMap<&'static str, usize>,
}

impl MtConnectModule {
    pub fn new(acquisition_id: u32, adapter: Adapter) -> Self {
        Self {
            name: format!("mtconnect.{}", acquisition_id),
            acquisition_name: String::new(),
            adapter,
            items: HashMap::new(),
        }
    }

    pub fn with_acquisition_name(mut self, name: impl Into<String>) -> Self {
        self.acquisition_name = name.into();
        self
    }

    pub fn acquisition_name(&self) -> &str {
        &self.acquisition_name
    }

    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    /// Current SHDR text of a data item; `None` if never set or unavailable
    pub fn datum_value(&self, name: &str) -> Option<&str> {
        self.adapter.datum(name).and_then(DeviceDatum::value)
    }

    fn update(&mut self, name: &'static str, kind: DatumKind, value: DatumValue) -> Result<()> {
        let index = match self.items.get(name) {
            Some(index) => *index,
            None => {
                let index = self.adapter.add_datum(DeviceDatum::new(name, kind));
                self.items.insert(name, index);
                index
            }
        };
        if let Some(datum) = self.adapter.datum_mut(index) {
            datum.set(value)?;
        }
        Ok(())
    }

    fn update_data(
        &mut self,
        name: &'static str,
        kind: DatumKind,
        value: DatumValue,
    ) -> Result<()> {
        self.update(name, kind, value)?;
        self.set_available(true)
    }

    // Availability and errors

    pub fn set_available(&mut self, available: bool) -> Result<()> {
        let value = if available {
            AvailabilityValue::Available
        } else {
            AvailabilityValue::Unavailable
        };
        self.update("avail", DatumKind::Availability, DatumValue::Availability(value))
    }

    /// An acquisition error makes every data item unavailable
    pub fn set_error(&mut self, error: bool) {
        if error {
            tracing::debug!(module = %self.name, "Acquisition error, data unavailable");
            self.adapter.unavailable();
        }
    }

    /// Zero means no error
    pub fn set_error_code(&mut self, code: i64) {
        self.set_error(code != 0);
    }

    // Positions

    pub fn set_position(&mut self, position: &AxisPosition) -> Result<()> {
        let axes = [
            ("Xact", position.x),
            ("Yact", position.y),
            ("Zact", position.z),
            ("Uact", position.u),
            ("Vact", position.v),
            ("Wact", position.w),
            ("Apos", position.a),
            ("Bpos", position.b),
            ("Cpos", position.c),
        ];
        for (name, coordinate) in axes {
            if let Some(coordinate) = coordinate {
                self.set_sample(name, coordinate)?;
            }
        }
        Ok(())
    }

    /// Only X, Y and Z are taken from `position`
    pub fn set_position_xyz(&mut self, position: &AxisPosition) -> Result<()> {
        self.set_position(&AxisPosition {
            x: position.x,
            y: position.y,
            z: position.z,
            ..AxisPosition::default()
        })
    }

    fn set_sample(&mut self, name: &'static str, value: f64) -> Result<()> {
        self.update_data(name, DatumKind::Sample, DatumValue::Double(value))
    }

    pub fn set_x(&mut self, value: f64) -> Result<()> {
        self.set_sample("Xact", value)
    }

    pub fn set_y(&mut self, value: f64) -> Result<()> {
        self.set_sample("Yact", value)
    }

    pub fn set_z(&mut self, value: f64) -> Result<()> {
        self.set_sample("Zact", value)
    }

    pub fn set_u(&mut self, value: f64) -> Result<()> {
        self.set_sample("Uact", value)
    }

    pub fn set_v(&mut self, value: f64) -> Result<()> {
        self.set_sample("Vact", value)
    }

    pub fn set_w(&mut self, value: f64) -> Result<()> {
        self.set_sample("Wact", value)
    }

    pub fn set_a(&mut self, value: f64) -> Result<()> {
        self.set_sample("Apos", value)
    }

    pub fn set_b(&mut self, value: f64) -> Result<()> {
        self.set_sample("Bpos", value)
    }

    pub fn set_c(&mut self, value: f64) -> Result<()> {
        self.set_sample("Cpos", value)
    }

    // Spindle and feed

    pub fn set_feedrate(&mut self, value: f64) -> Result<()> {
        self.set_sample("path_feedrate", value)
    }

    pub fn set_spindle_speed(&mut self, value: f64) -> Result<()> {
        self.set_sample("spindle_speed", value)
    }

    pub fn set_spindle_load(&mut self, value: f64) -> Result<()> {
        self.set_sample("spindle_load", value)
    }

    /// Percentage
    pub fn set_feedrate_override(&mut self, value: i64) -> Result<()> {
        self.update_data("feed_ovr", DatumKind::Sample, DatumValue::Int(value))
    }

    /// Percentage
    pub fn set_spindle_speed_override(&mut self, value: i64) -> Result<()> {
        self.update_data("SspeedOvr", DatumKind::Sample, DatumValue::Int(value))
    }

    // Controller mode
    //
    // Auto and Manual are two-state: false selects the other mode. Mdi, Jog
    // and ManualAny only select their mode when true.

    fn set_mode(&mut self, mode: ControllerModeValue) -> Result<()> {
        self.update_data("mode", DatumKind::ControllerMode, DatumValue::ControllerMode(mode))
    }

    pub fn set_auto(&mut self, auto: bool) -> Result<()> {
        self.set_mode(if auto {
            ControllerModeValue::Automatic
        } else {
            ControllerModeValue::Manual
        })
    }

    pub fn set_manual(&mut self, manual: bool) -> Result<()> {
        self.set_mode(if manual {
            ControllerModeValue::Manual
        } else {
            ControllerModeValue::Automatic
        })
    }

    pub fn set_mdi(&mut self, mdi: bool) -> Result<()> {
        if mdi {
            self.set_mode(ControllerModeValue::ManualDataInput)?;
        }
        Ok(())
    }

    pub fn set_jog(&mut self, jog: bool) -> Result<()> {
        if jog {
            self.set_mode(ControllerModeValue::Manual)?;
        }
        Ok(())
    }

    pub fn set_manual_any(&mut self, manual: bool) -> Result<()> {
        if manual {
            self.set_mode(ControllerModeValue::Manual)?;
        }
        Ok(())
    }

    // Program and production

    /// Running is ACTIVE, not running is INTERRUPTED
    pub fn set_running(&mut self, running: bool) -> Result<()> {
        let execution = if running {
            Execution::Active
        } else {
            Execution::Interrupted
        };
        self.update_data("execution", DatumKind::Execution, DatumValue::Execution(execution))
    }

    pub fn set_program_name(&mut self, name: &str) -> Result<()> {
        self.update_data("program", DatumKind::Event, DatumValue::Text(name.to_string()))
    }

    pub fn set_part_count(&mut self, count: i64) -> Result<()> {
        self.update_data("part_count", DatumKind::IntEvent, DatumValue::Int(count))
    }

    pub fn set_tool_number(&mut self, tool: &str) -> Result<()> {
        self.update_data("tool_number", DatumKind::Event, DatumValue::Text(tool.to_string()))
    }
}

fn expect_position(key: &str, value: &CncValue) -> Result<AxisPosition> {
    AxisPosition::from_value(value).ok_or_else(|| {
        ModuleError::InvalidValue {
            key: key.to_string(),
            expected: "map of axis coordinates".to_string(),
            actual: value.to_string(),
        }
        .into()
    })
}

impl CncModule for MtConnectModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.adapter.start(at).map_err(|e| {
            tracing::warn!(module = %self.name, "SHDR adapter not started: {}", e);
            e.into()
        })
    }

    fn finish(&mut self) -> Result<()> {
        self.adapter.finish();
        Ok(())
    }

    fn set(&mut self, key: &str, value: CncValue) -> Result<()> {
        match key {
            "Available" => self.set_available(expect_bool(key, &value)?),
            "Error" => {
                self.set_error(expect_bool(key, &value)?);
                Ok(())
            }
            "ErrorCode" => {
                self.set_error_code(expect_i64(key, &value)?);
                Ok(())
            }
            "Position" => self.set_position(&expect_position(key, &value)?),
            "PositionXYZ" => self.set_position_xyz(&expect_position(key, &value)?),
            "X" => self.set_x(expect_f64(key, &value)?),
            "Y" => self.set_y(expect_f64(key, &value)?),
            "Z" => self.set_z(expect_f64(key, &value)?),
            "U" => self.set_u(expect_f64(key, &value)?),
            "V" => self.set_v(expect_f64(key, &value)?),
            "W" => self.set_w(expect_f64(key, &value)?),
            "A" => self.set_a(expect_f64(key, &value)?),
            "B" => self.set_b(expect_f64(key, &value)?),
            "C" => self.set_c(expect_f64(key, &value)?),
            "Feedrate" => self.set_feedrate(expect_f64(key, &value)?),
            "SpindleSpeed" => self.set_spindle_speed(expect_f64(key, &value)?),
            "SpindleLoad" => self.set_spindle_load(expect_f64(key, &value)?),
            "Auto" => self.set_auto(expect_bool(key, &value)?),
            "Mdi" => self.set_mdi(expect_bool(key, &value)?),
            "Jog" => self.set_jog(expect_bool(key, &value)?),
            "ManualAny" => self.set_manual_any(expect_bool(key, &value)?),
            "Manual" => self.set_manual(expect_bool(key, &value)?),
            "FeedrateOverride" => self.set_feedrate_override(expect_i64(key, &value)?),
            "SpindleSpeedOverride" => self.set_spindle_speed_override(expect_i64(key, &value)?),
            "Running" => self.set_running(expect_bool(key, &value)?),
            "ProgramName" => self.set_program_name(&expect_text(key, &value)?),
            "CncPartCount" => self.set_part_count(expect_i64(key, &value)?),
            "ToolNumber" => self.set_tool_number(&expect_text(key, &value)?),
            _ => Err(unknown_key(&self.name, key)),
        }
    }

    fn get(&self, key: &str) -> Result<CncValue> {
        match key {
            "ClientCount" => Ok(CncValue::Int(self.adapter.client_count() as i64)),
            "Port" => {
                let port = match self.adapter.server() {
                    Some(server) => server.local_addr()?.port(),
                    None => self.adapter.port(),
                };
                Ok(CncValue::Int(i64::from(port)))
            }
            _ => Err(unknown_key(&self.name, key)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module() -> MtConnectModule {
        MtConnectModule::new(7, Adapter::new().with_host("127.0.0.1").with_port(0))
    }

    #[test]
    fn test_items_created_on_first_set() {
        let mut module = module();
        assert!(module.adapter().data().is_empty());

        module.set("X", CncValue::Double(10.0)).unwrap();
        let names: Vec<&str> = module.adapter().data().iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["Xact", "avail"]);
        assert_eq!(module.datum_value("avail"), Some("AVAILABLE"));
    }

    #[test]
    fn test_position_maps() {
        let mut module = module();
        let mut axes = std::collections::BTreeMap::new();
        axes.insert("x".to_string(), CncValue::Double(1.0));
        axes.insert("Y".to_string(), CncValue::Int(2));
        axes.insert("a".to_string(), CncValue::Double(90.0));
        module.set("PositionXYZ", CncValue::Map(axes.clone())).unwrap();
        assert_eq!(module.datum_value("Xact"), Some("1"));
        assert_eq!(module.datum_value("Yact"), Some("2"));
        assert_eq!(module.datum_value("Apos"), None);

        module.set("Position", CncValue::Map(axes)).unwrap();
        assert_eq!(module.datum_value("Apos"), Some("90"));

        let mut bad = std::collections::BTreeMap::new();
        bad.insert("Q".to_string(), CncValue::Double(1.0));
        assert!(module.set("Position", CncValue::Map(bad)).is_err());
    }

    #[test]
    fn test_mode_and_execution() {
        let mut module = module();
        module.set("Running", CncValue::Bool(false)).unwrap();
        assert_eq!(module.datum_value("execution"), Some("INTERRUPTED"));

        module.set("Manual", CncValue::Bool(false)).unwrap();
        assert_eq!(module.datum_value("mode"), Some("AUTOMATIC"));
        module.set("Mdi", CncValue::Bool(true)).unwrap();
        assert_eq!(module.datum_value("mode"), Some("MANUAL_DATA_INPUT"));
        module.set("Jog", CncValue::Bool(false)).unwrap();
        assert_eq!(module.datum_value("mode"), Some("MANUAL_DATA_INPUT"));
        module.set("Auto", CncValue::Bool(true)).unwrap();
        assert_eq!(module.datum_value("mode"), Some("AUTOMATIC"));
    }

    #[test]
    fn test_error_makes_data_unavailable() {
        let mut module = module();
        module.set("ProgramName", CncValue::from("O1000")).unwrap();
        module.set("CncPartCount", CncValue::Int(12)).unwrap();
        module.set("ErrorCode", CncValue::Int(0)).unwrap();
        assert_eq!(module.datum_value("program"), Some("O1000"));

        module.set("ErrorCode", CncValue::Int(3)).unwrap();
        assert_eq!(module.datum_value("program"), None);
        assert_eq!(module.datum_value("part_count"), None);
        assert_eq!(module.datum_value("avail"), None);
    }

    #[test]
    fn test_unknown_and_invalid_keys() {
        let mut module = module();
        let err = module.set("Coolant", CncValue::Bool(true)).unwrap_err();
        assert!(matches!(
            err,
            pulsekit_core::Error::Module(ModuleError::UnknownKey { .. })
        ));
        assert!(module.set("X", CncValue::from("left")).is_err());
        assert_eq!(module.get("ClientCount").unwrap(), CncValue::Int(0));
        assert_eq!(module.get("Port").unwrap(), CncValue::Int(0));
    }
}
