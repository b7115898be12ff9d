//! Cycle detection methods
//!
//! A bitmask selecting which signal patterns the output module turns into
//! cycle, stamp and milestone events.

use crate::error::{DetectionError, DetectionResult};
use bitflags::bitflags;

bitflags! {
    /// Enabled detection methods
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DetectionMethod: u32 {
        /// Rising edge of the cycle-running signal starts a cycle
        const CYCLE_START_SIGNAL = 0x01;
        /// Falling edge of the cycle-running signal ends a cycle
        const CYCLE_STOP_SIGNAL = 0x02;
        /// An increase of the part counter ends a cycle with the increase as quantity
        const PART_COUNT = 0x04;
        /// A new stamp is reported
        const STAMP = 0x08;
        /// A new sequence milestone is reported
        const SEQUENCE_MILESTONE = 0x10;
    }
}

impl Default for DetectionMethod {
    fn default() -> Self {
        Self::CYCLE_START_SIGNAL | Self::CYCLE_STOP_SIGNAL | Self::STAMP
    }
}

impl DetectionMethod {
    /// Parse one method name, case-insensitively
    pub fn parse_method(name: &str) -> DetectionResult<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "cycle_start_signal" => Ok(Self::CYCLE_START_SIGNAL),
            "cycle_stop_signal" => Ok(Self::CYCLE_STOP_SIGNAL),
            "part_count" => Ok(Self::PART_COUNT),
            "stamp" => Ok(Self::STAMP),
            "sequence_milestone" => Ok(Self::SEQUENCE_MILESTONE),
            _ => Err(DetectionError::UnknownMethod(name.to_string())),
        }
    }

    /// Combine method names into a mask
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> DetectionResult<Self> {
        names
            .iter()
            .try_fold(Self::empty(), |mask, name| {
                Self::parse_method(name.as_ref()).map(|method| mask | method)
            })
    }

    /// Whether a falling edge of the running signal should end a cycle
    ///
    /// The part counter is authoritative when both are enabled.
    pub fn stops_on_falling_edge(&self) -> bool {
        self.contains(Self::CYCLE_STOP_SIGNAL) && !self.contains(Self::PART_COUNT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_names() {
        let mask = DetectionMethod::from_names(&["Part_Count", "stamp"]).unwrap();
        assert_eq!(mask, DetectionMethod::PART_COUNT | DetectionMethod::STAMP);
        assert_eq!(
            DetectionMethod::from_names::<&str>(&[]).unwrap(),
            DetectionMethod::empty()
        );
    }

    #[test]
    fn test_parse_method() {
        assert_eq!(
            DetectionMethod::parse_method(" Sequence_Milestone ").unwrap(),
            DetectionMethod::SEQUENCE_MILESTONE
        );
        // The bitflags constant names are matched case-insensitively too
        assert_eq!(
            DetectionMethod::parse_method("CYCLE_START_SIGNAL").unwrap(),
            DetectionMethod::CYCLE_START_SIGNAL
        );
        assert!(DetectionMethod::parse_method("").is_err());
    }

    #[test]
    fn test_unknown_name() {
        let err = DetectionMethod::from_names(&["stamp", "spindle"]).unwrap_err();
        assert_eq!(err, DetectionError::UnknownMethod("spindle".to_string()));
    }

    #[test]
    fn test_falling_edge_rule() {
        assert!(DetectionMethod::default().stops_on_falling_edge());
        let mask = DetectionMethod::CYCLE_STOP_SIGNAL | DetectionMethod::PART_COUNT;
        assert!(!mask.stops_on_falling_edge());
    }
}
