//! Exchange-data queue output
//!
//! [`CncDataQueueOutput`] is the module at the end of an acquisition chain.
//! Drivers push raw signals into it every cycle; it decides which of them are
//! events worth persisting and commits those to the exchange-data queue.
//!
//! # Features
//! - Change tracking: repeated values are suppressed, across restarts for
//!   stamps, cycle signals and variables
//! - Cycle detection driven by [`DetectionMethod`]
//! - Machine-mode flicker collapsing: a mode change is held in a pause buffer
//!   until it has lasted for the flicker window, and dropped if the machine
//!   goes back to the previous mode before that
//! - Field values stop automatically when a cycle no longer reports them
//! - Backpressure: field values are shed while the queue is saturated
//!
//! Records always reach the queue in the order they were produced; the pause
//! buffer delays them, it never reorders them.

use crate::detection::DetectionMethod;
use crate::queue::SharedCncDataQueue;
use crate::tracker::{Change, VariableChangeTracker};
use chrono::{DateTime, Utc};
use pulsekit_core::{
    expect_bool, expect_f64, expect_finite, expect_i64, expect_text, unknown_key, CncAlarm,
    CncModule, CncValue, DataCallback, ExchangeData, ExchangeDataCommand, ModuleError, Result,
};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::time::Duration;

const CYCLE_RUNNING_KEY: &str = "cycle.running";
const PART_COUNT_KEY: &str = "cycle.partcount";
const STAMP_KEY: &str = "stamp";
const MILESTONE_KEY: &str = "milestone";
const VARIABLE_PREFIX: &str = "variable.";

/// Configuration of the output module
#[derive(Debug, Clone)]
pub struct OutputOptions {
    /// Machine the data belongs to
    pub machine_id: u32,
    /// Machine module the data is read from
    pub machine_module_id: u32,
    /// Enabled detection methods
    pub detection: DetectionMethod,
    /// How long a new machine mode must last before it is committed
    ///
    /// Zero commits mode changes immediately.
    pub flicker_window: Duration,
    /// Re-emit an unchanged machine mode after this long (zero: never)
    pub mode_refresh: Duration,
    /// Queue length at which field values are shed (zero: never)
    pub max_queue_size: usize,
    /// Pause buffer length forcing an early release
    pub max_pause_buffer: usize,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            machine_id: 0,
            machine_module_id: 0,
            detection: DetectionMethod::default(),
            flicker_window: Duration::from_secs(5),
            mode_refresh: Duration::from_secs(60),
            max_queue_size: 100_000,
            max_pause_buffer: 256,
        }
    }
}

/// Records held back while a machine-mode change is unconfirmed
#[derive(Debug)]
struct PauseBuffer {
    started_at: DateTime<Utc>,
    pending_mode: i64,
    records: Vec<ExchangeData>,
}

/// The stateful reducer between drivers and the exchange-data queue
pub struct CncDataQueueOutput {
    name: String,
    options: OutputOptions,
    queue: SharedCncDataQueue,
    /// Stamps, cycle signals and variables; persisted when a directory is set
    tracker: VariableChangeTracker,
    /// Field values; memory only
    value_tracker: VariableChangeTracker,
    pause: Option<PauseBuffer>,
    committed_mode: Option<i64>,
    last_mode_at: Option<DateTime<Utc>>,
    active_values: BTreeSet<String>,
    stopped_values: HashSet<String>,
    seen_values: HashSet<String>,
    active_alarms: BTreeMap<String, CncAlarm>,
    now: Option<DateTime<Utc>>,
    in_error: bool,
    saturated: bool,
    observer: Option<DataCallback<ExchangeData>>,
}

impl CncDataQueueOutput {
    /// Create an output committing to `queue`
    pub fn new(
        options: OutputOptions,
        queue: SharedCncDataQueue,
        tracker: VariableChangeTracker,
    ) -> Self {
        let name = format!(
            "output.{}.{}",
            options.machine_id, options.machine_module_id
        );
        Self {
            name,
            options,
            queue,
            tracker,
            value_tracker: VariableChangeTracker::in_memory(),
            pause: None,
            committed_mode: None,
            last_mode_at: None,
            active_values: BTreeSet::new(),
            stopped_values: HashSet::new(),
            seen_values: HashSet::new(),
            active_alarms: BTreeMap::new(),
            now: None,
            in_error: false,
            saturated: false,
            observer: None,
        }
    }

    /// Call `observer` with every record committed to the queue
    pub fn set_observer(&mut self, observer: DataCallback<ExchangeData>) {
        self.observer = Some(observer);
    }

    /// The options the output was built with
    pub fn options(&self) -> &OutputOptions {
        &self.options
    }

    /// The queue records are committed to
    pub fn queue(&self) -> &SharedCncDataQueue {
        &self.queue
    }

    /// Last machine mode committed to the queue
    pub fn committed_machine_mode(&self) -> Option<i64> {
        self.committed_mode
    }

    /// Whether a machine-mode change is waiting for confirmation
    pub fn is_paused(&self) -> bool {
        self.pause.is_some()
    }

    /// Number of records held in the pause buffer
    pub fn paused_len(&self) -> usize {
        self.pause.as_ref().map_or(0, |p| p.records.len())
    }

    /// Whether field values are currently being shed
    pub fn is_saturated(&self) -> bool {
        self.saturated
    }

    /// Fields currently reported as active
    pub fn active_values(&self) -> impl Iterator<Item = &str> {
        self.active_values.iter().map(String::as_str)
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Begin an acquisition cycle at `at`
    pub fn start(&mut self, at: DateTime<Utc>) -> Result<()> {
        if let Some(previous) = self.now {
            if at < previous {
                tracing::warn!(
                    module = %self.name,
                    "Acquisition time went backwards from {} to {}",
                    previous,
                    at
                );
            }
        }
        self.now = Some(at);
        self.seen_values.clear();
        self.release_expired_pause(at)
    }

    /// End the current acquisition cycle
    ///
    /// Active fields the cycle did not report are stopped, unless the cycle
    /// was flagged in error.
    pub fn finish(&mut self) -> Result<()> {
        let now = self.now()?;
        if !self.in_error {
            let unseen: Vec<String> = self
                .active_values
                .iter()
                .filter(|field| !self.seen_values.contains(*field))
                .cloned()
                .collect();
            for field in unseen {
                tracing::debug!(module = %self.name, "Field {} not reported, stopping it", field);
                self.stop_cnc_value(&field)?;
            }
        }
        self.release_expired_pause(now)
    }

    /// Commit the pause buffer now, confirming any pending machine mode
    pub fn flush(&mut self) -> Result<()> {
        self.release_pause()
    }

    // ---------------------------------------------------------------------
    // Machine mode
    // ---------------------------------------------------------------------

    /// Report the current machine mode
    pub fn set_machine_mode(&mut self, mode_id: i64) -> Result<()> {
        let now = self.now()?;
        self.release_expired_pause(now)?;
        let record = self.machine_mode_record(now, mode_id);

        let Some(committed) = self.committed_mode else {
            return self.commit_mode(record, mode_id);
        };

        if let Some(pause) = self.pause.as_mut() {
            if mode_id == committed {
                tracing::debug!(
                    module = %self.name,
                    "Machine mode flicker {} -> {} -> {} collapsed",
                    committed,
                    pause.pending_mode,
                    mode_id
                );
                return self.collapse_pause();
            }
            if mode_id != pause.pending_mode {
                tracing::debug!(
                    module = %self.name,
                    "Pending machine mode {} replaced by {}",
                    pause.pending_mode,
                    mode_id
                );
                pause
                    .records
                    .retain(|r| r.command != ExchangeDataCommand::MachineMode);
                pause.records.push(record);
                pause.pending_mode = mode_id;
                pause.started_at = now;
            }
            return Ok(());
        }

        if mode_id == committed {
            if self.mode_refresh_due(now) {
                return self.commit_mode(record, mode_id);
            }
            return Ok(());
        }

        if self.options.flicker_window.is_zero() {
            return self.commit_mode(record, mode_id);
        }

        tracing::debug!(
            module = %self.name,
            "Machine mode {} -> {} pending confirmation",
            committed,
            mode_id
        );
        self.pause = Some(PauseBuffer {
            started_at: now,
            pending_mode: mode_id,
            records: vec![record],
        });
        self.release_full_pause()
    }

    fn machine_mode_record(&self, at: DateTime<Utc>, mode_id: i64) -> ExchangeData {
        ExchangeData::machine_mode(
            self.options.machine_id,
            self.options.machine_module_id,
            at,
            mode_id,
        )
    }

    fn commit_mode(&mut self, record: ExchangeData, mode_id: i64) -> Result<()> {
        let at = record.at;
        self.commit(record)?;
        self.committed_mode = Some(mode_id);
        self.last_mode_at = Some(at);
        Ok(())
    }

    fn mode_refresh_due(&self, now: DateTime<Utc>) -> bool {
        if self.options.mode_refresh.is_zero() {
            return false;
        }
        match self.last_mode_at {
            Some(last) => elapsed_at_least(last, now, self.options.mode_refresh),
            None => true,
        }
    }

    // ---------------------------------------------------------------------
    // Cycles, stamps and milestones
    // ---------------------------------------------------------------------

    /// Report whether a cycle is running
    pub fn set_cycle_running(&mut self, running: bool) -> Result<()> {
        let now = self.now()?;
        let value = CncValue::Bool(running);
        let detection = self.options.detection;
        let record = match self.tracker.compare(CYCLE_RUNNING_KEY, &value) {
            Change::Unchanged => return Ok(()),
            Change::First | Change::Changed { .. } if running => detection
                .contains(DetectionMethod::CYCLE_START_SIGNAL)
                .then(|| self.start_cycle_record(now)),
            Change::First => None,
            Change::Changed { .. } => detection
                .stops_on_falling_edge()
                .then(|| self.stop_cycle_record(now, 1)),
        };
        self.emit_tracked(CYCLE_RUNNING_KEY, value, record)
    }

    /// Report the controller part counter
    pub fn set_part_count(&mut self, count: i64) -> Result<()> {
        let now = self.now()?;
        let value = CncValue::Int(count);
        let previous = match self.tracker.compare(PART_COUNT_KEY, &value) {
            Change::Unchanged => return Ok(()),
            Change::First => {
                tracing::debug!(module = %self.name, "Initial part count {}", count);
                None
            }
            Change::Changed { previous } => previous.as_i64(),
        };
        let record = match previous {
            Some(previous) if count > previous => match count.checked_sub(previous) {
                Some(quantity) => self
                    .options
                    .detection
                    .contains(DetectionMethod::PART_COUNT)
                    .then(|| self.stop_cycle_record(now, quantity)),
                None => {
                    tracing::warn!(
                        module = %self.name,
                        "Part counter jumped from {} to {}, increase ignored",
                        previous,
                        count
                    );
                    None
                }
            },
            Some(previous) => {
                tracing::info!(
                    module = %self.name,
                    "Part counter reset from {} to {}",
                    previous,
                    count
                );
                None
            }
            None => None,
        };
        self.emit_tracked(PART_COUNT_KEY, value, record)
    }

    /// Report an explicit cycle start
    pub fn set_cycle_begin(&mut self) -> Result<()> {
        let now = self.now()?;
        self.emit(self.start_cycle_record(now)).map(drop)
    }

    /// Report an explicit cycle end, with the produced quantity if known
    pub fn set_cycle_end(&mut self, quantity: Option<i64>) -> Result<()> {
        let now = self.now()?;
        self.emit(self.stop_cycle_record(now, quantity.unwrap_or(1)))
            .map(drop)
    }

    /// Report the current stamp
    pub fn set_stamp(&mut self, stamp_id: i64) -> Result<()> {
        let now = self.now()?;
        let value = CncValue::Int(stamp_id);
        if !self.tracker.compare(STAMP_KEY, &value).is_changed() {
            return Ok(());
        }
        let record = self
            .options
            .detection
            .contains(DetectionMethod::STAMP)
            .then(|| {
                ExchangeData::stamp(
                    self.options.machine_id,
                    self.options.machine_module_id,
                    now,
                    stamp_id,
                )
            });
        self.emit_tracked(STAMP_KEY, value, record)
    }

    /// Report the current sequence milestone, in seconds
    ///
    /// A NaN or infinite milestone is rejected.
    pub fn set_sequence_milestone(&mut self, seconds: f64) -> Result<()> {
        let now = self.now()?;
        let value = expect_finite("SequenceMilestone", CncValue::Double(seconds))?;
        if !self.tracker.compare(MILESTONE_KEY, &value).is_changed() {
            return Ok(());
        }
        let record = self
            .options
            .detection
            .contains(DetectionMethod::SEQUENCE_MILESTONE)
            .then(|| {
                ExchangeData::sequence_milestone(
                    self.options.machine_id,
                    self.options.machine_module_id,
                    now,
                    seconds,
                )
            });
        self.emit_tracked(MILESTONE_KEY, value, record)
    }

    fn start_cycle_record(&self, at: DateTime<Utc>) -> ExchangeData {
        ExchangeData::start_cycle(self.options.machine_id, self.options.machine_module_id, at)
    }

    fn stop_cycle_record(&self, at: DateTime<Utc>, quantity: i64) -> ExchangeData {
        ExchangeData::stop_cycle(
            self.options.machine_id,
            self.options.machine_module_id,
            at,
            quantity,
        )
    }

    // ---------------------------------------------------------------------
    // Variables and field values
    // ---------------------------------------------------------------------

    /// Report a CNC variable
    ///
    /// Values holding NaN or an infinity are rejected.
    pub fn set_variable(&mut self, variable: &str, value: CncValue) -> Result<()> {
        let now = self.now()?;
        let key = format!("{}{}", VARIABLE_PREFIX, variable);
        let value = expect_finite(&key, value)?;
        if !self.tracker.compare(&key, &value).is_changed() {
            return Ok(());
        }
        let record = ExchangeData::variable_set(
            self.options.machine_id,
            self.options.machine_module_id,
            now,
            variable,
            value.clone(),
        );
        self.emit_tracked(&key, value, Some(record))
    }

    /// Report several CNC variables, in key order
    pub fn set_variables(&mut self, variables: BTreeMap<String, CncValue>) -> Result<()> {
        for (variable, value) in variables {
            self.set_variable(&variable, value)?;
        }
        Ok(())
    }

    /// Report a field value
    ///
    /// Values holding NaN or an infinity are rejected.
    pub fn set_cnc_value(&mut self, field: &str, value: CncValue) -> Result<()> {
        let now = self.now()?;
        let value = expect_finite(field, value)?;
        self.seen_values.insert(field.to_string());

        let was_stopped = self.stopped_values.contains(field);
        let change = self.value_tracker.compare(field, &value);
        if !was_stopped && !change.is_changed() {
            return Ok(());
        }

        let record = ExchangeData::cnc_value(
            self.options.machine_id,
            self.options.machine_module_id,
            now,
            field,
            value.clone(),
        );
        if self.emit(record)? {
            self.value_tracker.record(field, value);
            self.stopped_values.remove(field);
            self.active_values.insert(field.to_string());
        }
        Ok(())
    }

    /// Report that a field is no longer available
    ///
    /// Only the first stop after a value is emitted.
    pub fn stop_cnc_value(&mut self, field: &str) -> Result<()> {
        let now = self.now()?;
        if self.stopped_values.contains(field) || !self.active_values.contains(field) {
            return Ok(());
        }

        let record = ExchangeData::stop_cnc_value(
            self.options.machine_id,
            self.options.machine_module_id,
            now,
            field,
        );
        if self.emit(record)? {
            self.stopped_values.insert(field.to_string());
            self.active_values.remove(field);
            self.value_tracker.forget(field);
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Alarms and errors
    // ---------------------------------------------------------------------

    /// Report the complete set of currently active alarms
    pub fn set_alarms(&mut self, alarms: Vec<CncAlarm>) -> Result<()> {
        let now = self.now()?;
        let current: BTreeMap<String, CncAlarm> =
            alarms.into_iter().map(|a| (a.key(), a)).collect();

        let cleared: Vec<String> = self
            .active_alarms
            .keys()
            .filter(|key| !current.contains_key(*key))
            .cloned()
            .collect();

        // An alarm only becomes active once its record is accepted, so a
        // failed commit is retried with the next report
        for (key, alarm) in current {
            if let Some(active) = self.active_alarms.get_mut(&key) {
                *active = alarm;
                continue;
            }
            let record = ExchangeData::alarm(
                self.options.machine_id,
                self.options.machine_module_id,
                now,
                &alarm,
            );
            if self.emit(record)? {
                self.active_alarms.insert(key, alarm);
            }
        }
        for key in cleared {
            let record = ExchangeData::stop_alarm(
                self.options.machine_id,
                self.options.machine_module_id,
                now,
                key.as_str(),
            );
            if self.emit(record)? {
                self.active_alarms.remove(&key);
            }
        }
        Ok(())
    }

    /// Flag the current acquisition as failed
    pub fn set_error(&mut self, in_error: bool) -> Result<()> {
        self.now()?;
        if in_error != self.in_error {
            tracing::info!(module = %self.name, "Acquisition error flag set to {}", in_error);
        }
        self.in_error = in_error;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Commit path
    // ---------------------------------------------------------------------

    fn now(&self) -> Result<DateTime<Utc>> {
        self.now.ok_or_else(|| ModuleError::NotStarted.into())
    }

    /// Queue a record, or hold it behind a pending machine mode
    ///
    /// Returns whether the record was accepted. Only field values are
    /// refused, while the queue is saturated. A buffered record counts as
    /// accepted: it stays in the pause buffer until it reaches the queue.
    fn emit(&mut self, record: ExchangeData) -> Result<bool> {
        if !record.command.is_essential() && !self.accepts_non_essential()? {
            return Ok(false);
        }
        if let Some(pause) = self.pause.as_mut() {
            pause.records.push(record);
            if let Err(e) = self.release_full_pause() {
                tracing::debug!(
                    module = %self.name,
                    "Full pause buffer kept ({} records): {}",
                    self.paused_len(),
                    e
                );
            }
            return Ok(true);
        }
        self.commit(record)?;
        Ok(true)
    }

    /// Emit `record`, then remember `value` under `key`
    ///
    /// Without a record the value is remembered directly. A refused or
    /// failed record leaves the tracker untouched so the change is seen
    /// again next cycle.
    fn emit_tracked(
        &mut self,
        key: &str,
        value: CncValue,
        record: Option<ExchangeData>,
    ) -> Result<()> {
        let accepted = match record {
            Some(record) => self.emit(record)?,
            None => true,
        };
        if accepted {
            self.tracker.record(key, value);
        }
        Ok(())
    }

    fn commit(&mut self, record: ExchangeData) -> Result<()> {
        tracing::trace!(module = %self.name, "Commit {}", record);
        if let Some(observer) = &self.observer {
            let copy = record.clone();
            self.queue.lock().enqueue(record)?;
            observer(copy);
        } else {
            self.queue.lock().enqueue(record)?;
        }
        Ok(())
    }

    /// Check the queue length before producing a non-essential record
    fn accepts_non_essential(&mut self) -> Result<bool> {
        if self.options.max_queue_size == 0 {
            return Ok(true);
        }
        let len = self.queue.lock().len()?;
        if len >= self.options.max_queue_size {
            if !self.saturated {
                tracing::warn!(
                    module = %self.name,
                    "Queue saturated ({} >= {}), shedding field values",
                    len,
                    self.options.max_queue_size
                );
                self.saturated = true;
            }
            return Ok(false);
        }
        if self.saturated {
            tracing::info!(module = %self.name, "Queue drained to {}, resuming field values", len);
            self.saturated = false;
        }
        Ok(true)
    }

    fn release_expired_pause(&mut self, now: DateTime<Utc>) -> Result<()> {
        let expired = self.pause.as_ref().is_some_and(|pause| {
            elapsed_at_least(pause.started_at, now, self.options.flicker_window)
        });
        if expired {
            self.release_pause()?;
        }
        Ok(())
    }

    fn release_full_pause(&mut self) -> Result<()> {
        let full = self
            .pause
            .as_ref()
            .is_some_and(|pause| pause.records.len() >= self.options.max_pause_buffer);
        if full {
            tracing::debug!(module = %self.name, "Pause buffer full, releasing it");
            self.release_pause()?;
        }
        Ok(())
    }

    /// Confirm the pending machine mode and commit everything buffered
    fn release_pause(&mut self) -> Result<()> {
        let Some(pause) = self.pause.take() else {
            return Ok(());
        };
        tracing::debug!(
            module = %self.name,
            "Machine mode {} confirmed, committing {} records",
            pause.pending_mode,
            pause.records.len()
        );
        self.commit_buffered(pause)
    }

    /// Drop the pending machine mode and commit the rest of the buffer
    fn collapse_pause(&mut self) -> Result<()> {
        let Some(mut pause) = self.pause.take() else {
            return Ok(());
        };
        pause
            .records
            .retain(|r| r.command != ExchangeDataCommand::MachineMode);
        if let Some(committed) = self.committed_mode {
            pause.pending_mode = committed;
        }
        self.commit_buffered(pause)
    }

    /// Commit buffered records in order
    ///
    /// The committed machine mode advances when its record reaches the
    /// queue. On failure the failed record and everything after it go back
    /// into the pause buffer, to be retried on the next release.
    fn commit_buffered(&mut self, pause: PauseBuffer) -> Result<()> {
        let PauseBuffer {
            started_at,
            pending_mode,
            records,
        } = pause;
        let mut remaining = VecDeque::from(records);
        while let Some(record) = remaining.pop_front() {
            let mode = (record.command == ExchangeDataCommand::MachineMode)
                .then(|| (record.value.as_i64(), record.at));
            if let Err(e) = self.commit(record.clone()) {
                remaining.push_front(record);
                tracing::error!(
                    module = %self.name,
                    "Commit failed, {} buffered records kept: {}",
                    remaining.len(),
                    e
                );
                let mode_pending = remaining
                    .iter()
                    .any(|r| r.command == ExchangeDataCommand::MachineMode);
                let pending_mode = match self.committed_mode {
                    Some(committed) if !mode_pending => committed,
                    _ => pending_mode,
                };
                self.pause = Some(PauseBuffer {
                    started_at,
                    pending_mode,
                    records: remaining.into(),
                });
                return Err(e);
            }
            if let Some((mode_id, at)) = mode {
                self.committed_mode = mode_id.or(Some(pending_mode));
                self.last_mode_at = Some(at);
            }
        }
        Ok(())
    }
}

fn elapsed_at_least(since: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    (now - since).to_std().is_ok_and(|elapsed| elapsed >= window)
}

impl std::fmt::Debug for CncDataQueueOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CncDataQueueOutput")
            .field("name", &self.name)
            .field("committed_mode", &self.committed_mode)
            .field("paused", &self.paused_len())
            .field("active_values", &self.active_values.len())
            .field("active_alarms", &self.active_alarms.len())
            .field("saturated", &self.saturated)
            .finish()
    }
}

impl CncModule for CncDataQueueOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self, at: DateTime<Utc>) -> Result<()> {
        CncDataQueueOutput::start(self, at)
    }

    fn finish(&mut self) -> Result<()> {
        CncDataQueueOutput::finish(self)
    }

    fn set(&mut self, key: &str, value: CncValue) -> Result<()> {
        if let Some(variable) = key.strip_prefix("Variable.") {
            return self.set_variable(variable, value);
        }
        if let Some(field) = key.strip_prefix("Value.") {
            return self.set_cnc_value(field, value);
        }
        match key {
            "MachineModeId" => self.set_machine_mode(expect_i64(key, &value)?),
            "CycleRunning" => self.set_cycle_running(expect_bool(key, &value)?),
            "PartCount" => self.set_part_count(expect_i64(key, &value)?),
            "CycleBegin" => {
                if expect_bool(key, &value)? {
                    self.set_cycle_begin()?;
                }
                Ok(())
            }
            "CycleEnd" => match value {
                CncValue::Bool(true) => self.set_cycle_end(None),
                CncValue::Bool(false) => Ok(()),
                other => self.set_cycle_end(Some(expect_i64(key, &other)?)),
            },
            "Stamp" => self.set_stamp(expect_i64(key, &value)?),
            "SequenceMilestone" => self.set_sequence_milestone(expect_f64(key, &value)?),
            "StopValue" => self.stop_cnc_value(&expect_text(key, &value)?),
            "Alarms" => {
                let items = value.as_list().ok_or_else(|| ModuleError::InvalidValue {
                    key: key.to_string(),
                    expected: "list".to_string(),
                    actual: value.kind().to_string(),
                })?;
                let alarms = items
                    .iter()
                    .map(|item| {
                        CncAlarm::from_value(item).ok_or_else(|| ModuleError::InvalidValue {
                            key: key.to_string(),
                            expected: "alarm map".to_string(),
                            actual: item.to_string(),
                        })
                    })
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                self.set_alarms(alarms)
            }
            "Error" => self.set_error(expect_bool(key, &value)?),
            _ => Err(unknown_key(&self.name, key)),
        }
    }

    fn get(&self, key: &str) -> Result<CncValue> {
        match key {
            "MachineModeId" => self.committed_mode.map(CncValue::Int).ok_or_else(|| {
                ModuleError::Unavailable {
                    reason: "no machine mode committed yet".to_string(),
                }
                .into()
            }),
            "QueueLength" => Ok(CncValue::Int(self.queue.lock().len()? as i64)),
            "Paused" => Ok(CncValue::Bool(self.is_paused())),
            "Saturated" => Ok(CncValue::Bool(self.saturated)),
            _ => Err(unknown_key(&self.name, key)),
        }
    }
}
