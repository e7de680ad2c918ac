//! The fixed-tick state machine that calibrates the sensors, streams
//! filtered readings to the transport, and checks in with the operator
//! after every run.
//!
//! ```text
//!   Calibrating --(buffers full)--> Running --(execution time)--> AwaitingContinue
//!        ^                                                             |
//!        +------------------------(continue)---------------------------+
//!                                                                      |
//!   any state --(cancel)--> Stopped <-------------(stop)---------------+
//! ```
//!
//! [ControlLoop::without_calibration] starts straight in Running against a
//! zero baseline and never leaves it until cancelled.
//!
//! Time inside a phase is counted in ticks, so the transitions do not depend
//! on how punctual the scheduler is. [ControlLoop::run] paces the ticks
//! against the wall clock.

use crate::calibration_buffer::{CalibrationBuffer, CalibrationError};
use crate::config::{FilterConfig, SimulationConfig};
use crate::filter_pipeline::MultiChannelFilter;
use crate::force_sensor::FORCE_CHANNELS;
use crate::sensor::{ChannelSource, SensorError};
use crate::tactile_sensor::TACTILE_CHANNELS;
use crate::transport::{Record, TransportSink};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use std::{fmt, io};

const FORCE_FIELDS: [&str; FORCE_CHANNELS] = ["fx", "fy", "fz", "mx", "my", "mz"];
const TACTILE_FIELDS: [&str; TACTILE_CHANNELS] = ["s0", "s1", "s2", "s3"];

/// Where the loop is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Collecting readings for a new baseline
    Calibrating,
    /// Streaming baseline-relative readings
    Running,
    /// The run is over; the next tick asks the operator what to do
    AwaitingContinue,
    /// Finished
    Stopped,
}

/// Asked once per run whether to recalibrate and go again.
pub trait ContinuePrompt {
    /// True to continue, false to stop
    fn ask_continue(&mut self) -> bool;
}

impl<F: FnMut() -> bool> ContinuePrompt for F {
    fn ask_continue(&mut self) -> bool {
        self()
    }
}

/// A shareable stop flag, checked by the loop between ticks.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// A token that has not been cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks every holder of this token to stop.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// True once [CancellationToken::cancel] has been called on any clone
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How long running ticks take.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickStats {
    /// Running ticks completed
    pub ticks: u64,
    /// Total time spent in running ticks
    pub busy: Duration,
    /// Duration of the most recent running tick
    pub last: Duration,
    /// Ticks that started later than scheduled
    pub overruns: u64,
}

impl TickStats {
    fn record(&mut self, elapsed: Duration) {
        self.ticks += 1;
        self.busy += elapsed;
        self.last = elapsed;
    }

    /// Average running tick, in milliseconds
    pub fn mean_ms(&self) -> f64 {
        if self.ticks == 0 {
            return 0.0;
        }
        self.busy.as_secs_f64() * 1000.0 / self.ticks as f64
    }

    /// Most recent running tick, in milliseconds
    pub fn last_ms(&self) -> f64 {
        self.last.as_secs_f64() * 1000.0
    }
}

/// Why the loop stopped early.
#[derive(Debug)]
pub enum LoopError {
    /// A sensor could not be read
    Sensor(SensorError),
    /// A record could not be delivered
    Transport(io::Error),
    /// The calibration buffer was misused or misconfigured
    Calibration(CalibrationError),
    /// There is nothing to read from
    NoSensors,
}

impl fmt::Display for LoopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopError::Sensor(error) => write!(f, "{error}"),
            LoopError::Transport(error) => write!(f, "transport error: {error}"),
            LoopError::Calibration(error) => write!(f, "{error}"),
            LoopError::NoSensors => write!(f, "no sensors configured"),
        }
    }
}

impl std::error::Error for LoopError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoopError::Sensor(error) => Some(error),
            LoopError::Transport(error) => Some(error),
            LoopError::Calibration(error) => Some(error),
            LoopError::NoSensors => None,
        }
    }
}

impl From<SensorError> for LoopError {
    fn from(value: SensorError) -> Self {
        Self::Sensor(value)
    }
}

impl From<CalibrationError> for LoopError {
    fn from(value: CalibrationError) -> Self {
        Self::Calibration(value)
    }
}

/// One sensor with its filter cascade and calibration buffer.
struct SensorStage<const N: usize> {
    source: Box<dyn ChannelSource<N>>,
    filter: MultiChannelFilter<f64, N>,
    buffer: CalibrationBuffer<f64, N>,
    scale: f64,
}

impl<const N: usize> SensorStage<N> {
    fn new(
        source: Box<dyn ChannelSource<N>>,
        filter: &FilterConfig,
        capacity: usize,
        scale: f64,
    ) -> Result<Self, CalibrationError> {
        Ok(Self {
            source,
            filter: MultiChannelFilter::zeroed(filter.settings()),
            buffer: CalibrationBuffer::new(capacity)?,
            scale,
        })
    }

    fn read_filtered(&mut self) -> Result<[f64; N], SensorError> {
        let raw = self.source.read()?;
        Ok(self.filter.compute(raw))
    }

    fn write_fields(&self, record: &mut Record, names: &[&str; N], values: &[f64; N]) {
        for (name, value) in names.iter().zip(values) {
            record.insert(*name, value * self.scale);
        }
    }

    fn recalibrate(&mut self, trim: f64) -> Result<[f64; N], CalibrationError> {
        let baseline = self.buffer.trimmed_mean(trim)?;
        self.filter.reset(baseline);
        Ok(baseline)
    }

    fn restart(&mut self) {
        self.buffer.clear();
        self.filter.reset([0.0; N]);
    }
}

/// Calibrates, runs, and asks to continue, over and over, until told to stop.
pub struct ControlLoop {
    settings: SimulationConfig,
    force: Option<SensorStage<FORCE_CHANNELS>>,
    tactile: Option<SensorStage<TACTILE_CHANNELS>>,
    sink: Box<dyn TransportSink>,
    prompt: Box<dyn ContinuePrompt>,
    phase: Phase,
    phase_ticks: usize,
    timed: bool,
    stats: TickStats,
}

impl ControlLoop {
    /// A loop with no sensors attached yet, starting in [Phase::Calibrating].
    pub fn new(
        settings: SimulationConfig,
        sink: Box<dyn TransportSink>,
        prompt: Box<dyn ContinuePrompt>,
    ) -> Self {
        Self {
            settings,
            force: None,
            tactile: None,
            sink,
            prompt,
            phase: Phase::Calibrating,
            phase_ticks: 0,
            timed: true,
            stats: TickStats::default(),
        }
    }

    /// Skips calibration: readings are streamed against a zero baseline from
    /// the first tick, with no execution time limit, until cancelled.
    pub fn without_calibration(mut self) -> Self {
        self.phase = Phase::Running;
        self.phase_ticks = 0;
        self.timed = false;
        self
    }

    /// Attaches the force/torque sensor; its channels are sent unscaled.
    pub fn with_force_sensor(
        mut self,
        source: Box<dyn ChannelSource<FORCE_CHANNELS>>,
        filter: &FilterConfig,
    ) -> Result<Self, LoopError> {
        let capacity = self.settings.calibration_ticks();
        self.force = Some(SensorStage::new(source, filter, capacity, 1.0)?);
        Ok(self)
    }

    /// Attaches the tactile array; its channels are multiplied by `scale`.
    pub fn with_tactile_sensor(
        mut self,
        source: Box<dyn ChannelSource<TACTILE_CHANNELS>>,
        filter: &FilterConfig,
        scale: f64,
    ) -> Result<Self, LoopError> {
        let capacity = self.settings.calibration_ticks();
        self.tactile = Some(SensorStage::new(source, filter, capacity, scale)?);
        Ok(self)
    }

    /// The current phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Seconds spent in the current phase, by tick count
    pub fn elapsed(&self) -> f64 {
        self.phase_ticks as f64 * self.settings.dt
    }

    /// Timing of the running ticks so far
    pub fn stats(&self) -> TickStats {
        self.stats
    }

    /// The force/torque baseline in use, if that sensor is attached
    pub fn force_baseline(&self) -> Option<[f64; FORCE_CHANNELS]> {
        self.force.as_ref().map(|stage| *stage.filter.baseline())
    }

    /// The tactile baseline in use, if that sensor is attached
    pub fn tactile_baseline(&self) -> Option<[f64; TACTILE_CHANNELS]> {
        self.tactile.as_ref().map(|stage| *stage.filter.baseline())
    }

    /// Performs one tick and returns the phase the loop is in afterwards.
    pub fn tick(&mut self) -> Result<Phase, LoopError> {
        if self.force.is_none() && self.tactile.is_none() {
            return Err(LoopError::NoSensors);
        }

        match self.phase {
            Phase::Calibrating => self.calibrate_tick()?,
            Phase::Running => self.run_tick()?,
            Phase::AwaitingContinue => self.ask_continue(),
            Phase::Stopped => {}
        }
        Ok(self.phase)
    }

    /// Ticks every `dt` seconds until the operator stops, `cancel` fires, or
    /// something fails. Returns the timing of the last run.
    pub fn run(&mut self, cancel: &CancellationToken) -> Result<TickStats, LoopError> {
        let period = self.settings.period();
        let mut next = Instant::now();
        if self.timed {
            info!(
                "control loop starting: dt {:.4} s, calibrating for {} ticks",
                self.settings.dt,
                self.settings.calibration_ticks()
            );
        } else {
            info!("control loop streaming uncalibrated: dt {:.4} s", self.settings.dt);
        }

        loop {
            if cancel.is_cancelled() {
                info!("control loop cancelled");
                self.phase = Phase::Stopped;
                break;
            }

            let blocking = self.phase == Phase::AwaitingContinue;
            let phase = match self.tick() {
                Ok(phase) => phase,
                Err(e) => {
                    self.phase = Phase::Stopped;
                    return Err(e);
                }
            };
            if phase == Phase::Stopped {
                break;
            }

            if blocking {
                // the operator took as long as they took
                next = Instant::now();
                continue;
            }

            next += period;
            let now = Instant::now();
            if next > now {
                spin_sleep::sleep(next - now);
            } else {
                self.stats.overruns += 1;
                debug!("tick overran by {:?}", now - next);
                next = now;
            }
        }

        Ok(self.stats)
    }

    fn calibrate_tick(&mut self) -> Result<(), LoopError> {
        let force = match self.force.as_mut() {
            Some(stage) => Some(stage.read_filtered()?),
            None => None,
        };
        let tactile = match self.tactile.as_mut() {
            Some(stage) => Some(stage.read_filtered()?),
            None => None,
        };

        let mut full = true;
        if let (Some(stage), Some(reading)) = (self.force.as_mut(), force) {
            stage.buffer.append(reading)?;
            full &= stage.buffer.full();
        }
        if let (Some(stage), Some(reading)) = (self.tactile.as_mut(), tactile) {
            stage.buffer.append(reading)?;
            full &= stage.buffer.full();
        }
        self.phase_ticks += 1;

        if !full {
            return Ok(());
        }

        let trim = self.settings.calibration_trim;
        if let Some(stage) = self.force.as_mut() {
            let baseline = stage.recalibrate(trim)?;
            info!("force/torque baseline: {baseline:?}");
        }
        if let Some(stage) = self.tactile.as_mut() {
            let baseline = stage.recalibrate(trim)?;
            info!("tactile baseline: {baseline:?}");
        }

        info!("calibration done, running for {:.1} s", self.settings.execution_time);
        self.phase = Phase::Running;
        self.phase_ticks = 0;
        Ok(())
    }

    fn run_tick(&mut self) -> Result<(), LoopError> {
        let started = Instant::now();

        let mut record = Record::new();
        record.insert("time", self.elapsed());
        if let Some(stage) = self.force.as_mut() {
            let values = stage.read_filtered()?;
            stage.write_fields(&mut record, &FORCE_FIELDS, &values);
        }
        if let Some(stage) = self.tactile.as_mut() {
            let values = stage.read_filtered()?;
            stage.write_fields(&mut record, &TACTILE_FIELDS, &values);
        }

        self.sink.send(&record).map_err(LoopError::Transport)?;
        self.phase_ticks += 1;
        self.stats.record(started.elapsed());

        if self.timed && self.phase_ticks >= self.settings.execution_ticks() {
            info!(
                "run finished: {} ticks, {:.3} ms per tick, {} overruns",
                self.stats.ticks,
                self.stats.mean_ms(),
                self.stats.overruns
            );
            self.phase = Phase::AwaitingContinue;
        }
        Ok(())
    }

    fn ask_continue(&mut self) {
        if !self.prompt.ask_continue() {
            info!("stopping at operator request");
            self.phase = Phase::Stopped;
            return;
        }

        if let Some(stage) = self.force.as_mut() {
            stage.restart();
        }
        if let Some(stage) = self.tactile.as_mut() {
            stage.restart();
        }
        if self.stats.overruns > 0 {
            warn!("{} ticks overran their slot last run", self.stats.overruns);
        }
        self.stats = TickStats::default();
        self.phase_ticks = 0;
        self.phase = Phase::Calibrating;
        info!("recalibrating");
    }
}
