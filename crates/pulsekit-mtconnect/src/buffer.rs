//! SHDR line buffer

use crate::datum::DeviceDatum;
use chrono::{DateTime, Utc};

/// Render `at` the way SHDR lines are stamped: `YYYY-MM-DDTHH:MM:SS.ffffZ`
pub fn shdr_timestamp(at: DateTime<Utc>) -> String {
    format!(
        "{}.{:04}Z",
        at.format("%Y-%m-%dT%H:%M:%S"),
        at.timestamp_subsec_micros() / 100
    )
}

/// Accumulates one SHDR line: a timestamp followed by `|name|value` fields
#[derive(Debug, Default, Clone)]
pub struct ShdrBuffer {
    line: String,
    stamped: bool,
    fields: usize,
}

impl ShdrBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new line stamped with `at`, discarding any pending content
    pub fn timestamp(&mut self, at: DateTime<Utc>) {
        self.line = shdr_timestamp(at);
        self.stamped = true;
        self.fields = 0;
    }

    /// Whether the current line carries a timestamp
    pub fn is_stamped(&self) -> bool {
        self.stamped
    }

    /// Number of fields appended since the last timestamp
    pub fn field_count(&self) -> usize {
        self.fields
    }

    /// Append a data item to the line
    pub fn append(&mut self, datum: &DeviceDatum) {
        self.line.push_str(&datum.shdr_field());
        self.fields += 1;
    }

    /// Take the line, newline-terminated
    ///
    /// Returns `None` when no field was appended. The buffer is reset either way.
    pub fn take_line(&mut self) -> Option<String> {
        let line = if self.fields > 0 {
            let mut line = std::mem::take(&mut self.line);
            line.push('\n');
            Some(line)
        } else {
            None
        };
        self.reset();
        line
    }

    /// Drop any pending content
    pub fn reset(&mut self) {
        self.line.clear();
        self.stamped = false;
        self.fields = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::{DatumKind, DatumValue};
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 17, 14, 3, 9).unwrap()
            + chrono::Duration::microseconds(123_456)
    }

    #[test]
    fn test_timestamp_format() {
        assert_eq!(shdr_timestamp(at()), "2024-05-17T14:03:09.1234Z");
    }

    #[test]
    fn test_line_assembly() {
        let mut x = DeviceDatum::new("Xact", DatumKind::Sample);
        x.set(DatumValue::Double(1.5)).unwrap();
        let avail = DeviceDatum::new("avail", DatumKind::Availability);

        let mut buffer = ShdrBuffer::new();
        buffer.timestamp(at());
        buffer.append(&x);
        buffer.append(&avail);
        assert_eq!(
            buffer.take_line().as_deref(),
            Some("2024-05-17T14:03:09.1234Z|Xact|1.5|avail|UNAVAILABLE\n")
        );
        assert!(!buffer.is_stamped());
    }

    #[test]
    fn test_timestamp_only_yields_nothing() {
        let mut buffer = ShdrBuffer::new();
        buffer.timestamp(at());
        assert!(buffer.take_line().is_none());
        assert!(!buffer.is_stamped());
    }
}
