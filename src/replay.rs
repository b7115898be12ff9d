//! Signal replay
//!
//! Drives an output module, and optionally other modules such as the
//! MTConnect adapter, from recorded acquisition frames. A frame is one line
//! of JSON holding the acquisition time and the values read during that
//! cycle:
//!
//! ```json
//! {"at": "2024-05-17T14:03:09Z", "values": {"MachineModeId": 2, "CycleRunning": true}}
//! ```
//!
//! Every value is offered to every module. Keys no module handles are
//! counted, not fatal, so one signal file can feed different module sets.

use anyhow::Context;
use chrono::{DateTime, Utc};
use pulsekit_core::{CncModule, CncValue, Error, ExchangeData, ExchangeDataCommand, ModuleError};
use pulsekit_queue::CncDataQueueOutput;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

/// Values read during one acquisition cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalFrame {
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub values: BTreeMap<String, CncValue>,
}

/// Read every frame of a JSON-lines signal file
///
/// Blank lines are skipped; a malformed line fails with its line number.
pub fn read_frames(path: &Path) -> anyhow::Result<Vec<SignalFrame>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut frames = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let frame = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid frame", path.display(), index + 1))?;
        frames.push(frame);
    }
    Ok(frames)
}

/// Outcome of applying one frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Keys accepted by at least one module
    pub applied: usize,
    /// Keys no module handles
    pub unknown: usize,
    /// Keys a module rejected
    pub failed: usize,
}

/// Records committed so far, per command
#[derive(Debug, Clone, Default)]
pub struct CommandCounts {
    counts: Arc<parking_lot::Mutex<BTreeMap<ExchangeDataCommand, usize>>>,
}

impl CommandCounts {
    fn record(&self, data: &ExchangeData) {
        *self.counts.lock().entry(data.command).or_default() += 1;
    }

    pub fn get(&self, command: ExchangeDataCommand) -> usize {
        self.counts.lock().get(&command).copied().unwrap_or(0)
    }

    pub fn snapshot(&self) -> BTreeMap<ExchangeDataCommand, usize> {
        self.counts.lock().clone()
    }

    pub fn total(&self) -> usize {
        self.counts.lock().values().sum()
    }
}

/// An output module plus the modules fed alongside it
pub struct Acquisition {
    output: CncDataQueueOutput,
    modules: Vec<Box<dyn CncModule>>,
    counts: CommandCounts,
}

impl Acquisition {
    pub fn new(mut output: CncDataQueueOutput) -> Self {
        let counts = CommandCounts::default();
        let observed = counts.clone();
        output.set_observer(Box::new(move |data: ExchangeData| observed.record(&data)));
        Self {
            output,
            modules: Vec::new(),
            counts,
        }
    }

    /// Feed `module` with the same frames as the output
    pub fn with_module(mut self, module: Box<dyn CncModule>) -> Self {
        self.modules.push(module);
        self
    }

    pub fn output(&self) -> &CncDataQueueOutput {
        &self.output
    }

    pub fn counts(&self) -> &CommandCounts {
        &self.counts
    }

    /// Run one acquisition cycle
    ///
    /// Errors from `start` and `finish` abort the replay; errors from
    /// individual keys are logged and counted.
    pub fn apply(&mut self, frame: &SignalFrame) -> pulsekit_core::Result<FrameReport> {
        self.output.start(frame.at)?;
        for module in &mut self.modules {
            module.start(frame.at)?;
        }

        let mut report = FrameReport::default();
        for (key, value) in &frame.values {
            let mut handled = false;
            let mut failed = false;
            let outcomes = std::iter::once(CncModule::set(&mut self.output, key, value.clone()))
                .chain(
                    self.modules
                        .iter_mut()
                        .map(|module| module.set(key, value.clone())),
                )
                .collect::<Vec<_>>();
            for outcome in outcomes {
                match outcome {
                    Ok(()) => handled = true,
                    Err(Error::Module(ModuleError::UnknownKey { .. })) => {}
                    Err(e) => {
                        tracing::warn!(at = %frame.at, "Cannot set {}: {}", key, e);
                        failed = true;
                    }
                }
            }
            if failed {
                report.failed += 1;
            } else if handled {
                report.applied += 1;
            } else {
                tracing::debug!("No module handles {}", key);
                report.unknown += 1;
            }
        }

        self.output.finish()?;
        for module in &mut self.modules {
            module.finish()?;
        }
        Ok(report)
    }

    /// Release anything the output still holds back
    pub fn flush(&mut self) -> pulsekit_core::Result<()> {
        self.output.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulsekit_queue::{shared_queue, MemoryCncDataQueue, OutputOptions, VariableChangeTracker};
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn acquisition() -> Acquisition {
        let options = OutputOptions {
            machine_id: 1,
            machine_module_id: 1,
            flicker_window: Duration::from_secs(5),
            ..OutputOptions::default()
        };
        let output = CncDataQueueOutput::new(
            options,
            shared_queue(MemoryCncDataQueue::new()),
            VariableChangeTracker::in_memory(),
        );
        Acquisition::new(output)
    }

    fn frame(secs: i64, values: &[(&str, CncValue)]) -> SignalFrame {
        SignalFrame {
            at: DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap(),
            values: values
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        }
    }

    #[test]
    fn test_frame_parsing() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"at":"2024-05-17T14:03:09Z","values":{{"MachineModeId":2,"Value.feed":12.5}}}}"#
        )
        .unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"at":"2024-05-17T14:03:10Z"}}"#).unwrap();

        let frames = read_frames(file.path()).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].values["MachineModeId"], CncValue::Int(2));
        assert_eq!(frames[0].values["Value.feed"], CncValue::Double(12.5));
        assert!(frames[1].values.is_empty());
    }

    #[test]
    fn test_bad_frame_reports_line() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"at":"2024-05-17T14:03:09Z"}}"#).unwrap();
        writeln!(file, "not json").unwrap();

        let err = read_frames(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains(":2: invalid frame"));
    }

    #[test]
    fn test_apply_counts_keys() {
        let mut acquisition = acquisition();
        let report = acquisition
            .apply(&frame(
                0,
                &[
                    ("MachineModeId", CncValue::Int(1)),
                    ("CycleRunning", CncValue::Text("maybe".into())),
                    ("SpindleTemperature", CncValue::Double(40.0)),
                ],
            ))
            .unwrap();
        assert_eq!(
            report,
            FrameReport {
                applied: 1,
                unknown: 1,
                failed: 1,
            }
        );
        assert_eq!(acquisition.counts().get(ExchangeDataCommand::MachineMode), 1);
    }

    #[test]
    fn test_flush_releases_pending_mode() {
        let mut acquisition = acquisition();
        acquisition
            .apply(&frame(0, &[("MachineModeId", CncValue::Int(1))]))
            .unwrap();
        acquisition
            .apply(&frame(1, &[("MachineModeId", CncValue::Int(2))]))
            .unwrap();
        assert_eq!(acquisition.counts().total(), 1);

        acquisition.flush().unwrap();
        assert_eq!(acquisition.counts().get(ExchangeDataCommand::MachineMode), 2);
        assert_eq!(acquisition.output().committed_machine_mode(), Some(2));
    }
}
