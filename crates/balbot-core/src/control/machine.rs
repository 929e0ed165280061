//! Per-tick control state machine
//!
//! The host drives the machine through four callbacks:
//!
//! ```text
//! Uninitialized ──initialize──► Ready ──shutdown──► Uninitialized
//!                                 │ ▲
//!                           sense │ │ actuate      (once each per tick)
//!                                 ▼ │
//! ```
//!
//! All mutable loop state lives in one [`ControlContext`] owned by the
//! `Ready` phase, so nothing survives a shutdown by accident.

use crate::actuator::{ActuatorCommand, ActuatorMapper};
use crate::config::BalanceConfig;
use crate::control::{build_controller, Controller};
use crate::estimate::{Estimate, Setpoints, StateEstimator};
use crate::hardware::{ActuatorSink, SensorSource};
use crate::input::InputShaper;
use crate::synthesis::GainMatrix;
use crate::{Error, Result};

/// Upper bound on key events consumed per tick
const MAX_EVENTS_PER_TICK: usize = 32;

/// Tick counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MachineStats {
    /// Ticks that wrote a fresh command
    pub applied: u64,
    /// Ticks that held the previous command
    pub held: u64,
    /// Failed sensor reads
    pub sensor_failures: u64,
    /// Ticks whose command could not be written to every joint
    pub actuator_failures: u64,
}

/// Outcome of one `actuate` call
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tick {
    /// A fresh command was computed and written
    Applied(ActuatorCommand),
    /// The previous command stays in effect: either there was no fresh
    /// estimate and nothing was written, or writing the fresh command failed
    /// and the previous one was re-issued
    Held(ActuatorCommand),
}

impl Tick {
    /// The command in effect after this tick
    pub fn command(&self) -> &ActuatorCommand {
        match self {
            Self::Applied(c) | Self::Held(c) => c,
        }
    }
}

/// Everything the loop mutates between ticks
pub struct ControlContext {
    estimator: StateEstimator,
    shaper: InputShaper,
    controller: Box<dyn Controller>,
    mapper: ActuatorMapper,
    setpoints: Setpoints,
    estimate: Option<Estimate>,
    last_command: ActuatorCommand,
    stats: MachineStats,
}

impl ControlContext {
    fn new(config: &BalanceConfig, gain: Option<&GainMatrix>) -> Result<Self> {
        Ok(Self {
            estimator: StateEstimator::new(config.estimator),
            shaper: InputShaper::new(config.input),
            controller: build_controller(config, gain)?,
            mapper: ActuatorMapper::new(config.actuator),
            setpoints: Setpoints::default(),
            estimate: None,
            last_command: ActuatorCommand::ZERO,
            stats: MachineStats::default(),
        })
    }

    /// Current setpoints
    pub fn setpoints(&self) -> &Setpoints {
        &self.setpoints
    }

    /// Estimate waiting to be acted on, if the last read succeeded
    pub fn pending_estimate(&self) -> Option<&Estimate> {
        self.estimate.as_ref()
    }

    /// Command currently in effect
    pub fn last_command(&self) -> &ActuatorCommand {
        &self.last_command
    }

    /// Active controller name
    pub fn controller_name(&self) -> &str {
        self.controller.name()
    }
}

/// Machine phase
pub enum Phase {
    /// Not yet initialized, or shut down; ticks are rejected
    Uninitialized,
    /// Accepting ticks with the given loop state
    Ready(Box<ControlContext>),
}

/// Host-driven balance control loop
///
/// # Example
/// ```
/// use balbot_core::{BalanceConfig, BalanceMachine};
/// use balbot_core::sim::{MockBalanceBot, PlantConfig, SimBackend};
///
/// let mut bot = MockBalanceBot::new(PlantConfig::default().with_initial_tilt(0.05));
/// let mut machine = BalanceMachine::new(BalanceConfig::default());
/// machine.initialize().unwrap();
///
/// for _ in 0..100 {
///     machine.sense(&mut bot).unwrap();
///     machine.actuate(&mut bot).unwrap();
///     bot.step().unwrap();
/// }
/// machine.shutdown(&mut bot).unwrap();
/// ```
pub struct BalanceMachine {
    config: BalanceConfig,
    gain: Option<GainMatrix>,
    phase: Phase,
}

impl BalanceMachine {
    /// Create an uninitialized machine
    pub fn new(config: BalanceConfig) -> Self {
        Self {
            config,
            gain: None,
            phase: Phase::Uninitialized,
        }
    }

    /// Use a synthesized state-feedback gain
    pub fn with_gain(mut self, gain: GainMatrix) -> Self {
        self.gain = Some(gain);
        self
    }

    /// Get the configuration
    pub fn config(&self) -> &BalanceConfig {
        &self.config
    }

    /// Current phase
    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    /// Check whether the machine accepts ticks
    pub fn is_ready(&self) -> bool {
        matches!(self.phase, Phase::Ready(_))
    }

    /// Loop state, once initialized
    pub fn context(&self) -> Option<&ControlContext> {
        match &self.phase {
            Phase::Ready(ctx) => Some(ctx.as_ref()),
            Phase::Uninitialized => None,
        }
    }

    /// Tick counters (zero before initialization)
    pub fn stats(&self) -> MachineStats {
        self.context().map(|c| c.stats).unwrap_or_default()
    }

    /// Validate the configuration and create fresh loop state
    ///
    /// Re-initializing a ready machine discards its memory.
    pub fn initialize(&mut self) -> Result<()> {
        self.config.validate()?;
        let ctx = ControlContext::new(&self.config, self.gain.as_ref())?;
        tracing::debug!(controller = ctx.controller_name(), "State transition: -> ready");
        self.phase = Phase::Ready(Box::new(ctx));
        Ok(())
    }

    fn ready_mut(&mut self, op: &str) -> Result<&mut ControlContext> {
        match &mut self.phase {
            Phase::Ready(ctx) => Ok(ctx.as_mut()),
            Phase::Uninitialized => Err(Error::InvalidState(format!(
                "{} called before initialize",
                op
            ))),
        }
    }

    /// Read sensors, apply key events and update the estimate
    ///
    /// A failed, non-finite or negative-`dt` read is not an error: it is
    /// logged, counted, and leaves this tick without an estimate so `actuate`
    /// holds. Setpoints and pending key events are left untouched.
    pub fn sense<S: SensorSource + ?Sized>(&mut self, sensors: &mut S) -> Result<()> {
        let ctx = self.ready_mut("sense")?;
        ctx.estimate = None;

        let frame = match sensors.read() {
            Ok(frame) if frame.is_finite() && frame.dt >= 0.0 => frame,
            Ok(frame) => {
                ctx.stats.sensor_failures += 1;
                tracing::warn!(
                    time = frame.time,
                    dt = frame.dt,
                    "invalid sensor frame, holding last command"
                );
                return Ok(());
            }
            Err(e) => {
                ctx.stats.sensor_failures += 1;
                tracing::warn!(error = %e, "sensor read failed, holding last command");
                return Ok(());
            }
        };

        for _ in 0..MAX_EVENTS_PER_TICK {
            let Some(event) = sensors.poll_event() else {
                break;
            };
            ctx.shaper.handle_event(event, frame.time, &mut ctx.setpoints);
        }
        ctx.shaper.tick(frame.time, &mut ctx.setpoints);

        match ctx.estimator.estimate(&frame, &mut ctx.setpoints) {
            Ok(estimate) => ctx.estimate = Some(estimate),
            Err(e) => {
                ctx.stats.sensor_failures += 1;
                tracing::warn!(error = %e, time = frame.time, "rejected sensor frame");
            }
        }
        Ok(())
    }

    /// Compute and write this tick's command, or hold the previous one
    ///
    /// If any joint rejects the fresh command, the previous command is
    /// re-issued to every joint, the failure is counted, and the tick
    /// reports [`Tick::Held`].
    ///
    /// # Errors
    /// [`Error::InvalidState`] before initialization.
    pub fn actuate<A: ActuatorSink + ?Sized>(&mut self, actuators: &mut A) -> Result<Tick> {
        let ctx = self.ready_mut("actuate")?;

        let Some(estimate) = ctx.estimate.take() else {
            ctx.stats.held += 1;
            tracing::debug!("no fresh estimate, command held");
            return Ok(Tick::Held(ctx.last_command));
        };

        let drive = ctx.controller.compute(&estimate, &ctx.setpoints);
        let command = ctx.mapper.map(&drive, &ctx.setpoints);
        if let Err(e) = ctx.mapper.write(&command, actuators) {
            ctx.stats.actuator_failures += 1;
            ctx.stats.held += 1;
            tracing::warn!(error = %e, "actuator write failed, re-issuing last command");
            if let Err(e) = ctx.mapper.write(&ctx.last_command, actuators) {
                tracing::warn!(error = %e, "re-issuing last command failed");
            }
            return Ok(Tick::Held(ctx.last_command));
        }

        ctx.last_command = command;
        ctx.stats.applied += 1;
        Ok(Tick::Applied(command))
    }

    /// Stop every joint and drop the loop state
    pub fn shutdown<A: ActuatorSink + ?Sized>(&mut self, actuators: &mut A) -> Result<()> {
        let mapper = ActuatorMapper::new(self.config.actuator);
        mapper.write(&ActuatorCommand::ZERO, actuators)?;
        if let Phase::Ready(ctx) = &self.phase {
            tracing::debug!(stats = ?ctx.stats, "State transition: -> uninitialized");
        }
        self.phase = Phase::Uninitialized;
        Ok(())
    }
}
