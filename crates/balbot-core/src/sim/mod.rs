//! Simulation support
//!
//! A mock two-wheeled robot that implements the host interfaces, the
//! matching analytic plant model for gain synthesis, and an episode driver
//! that runs the [`BalanceMachine`] against any [`SimBackend`].
//!
//! # Example
//! ```
//! use balbot_core::BalanceConfig;
//! use balbot_core::control::BalanceMachine;
//! use balbot_core::sim::{run_episode, MockBalanceBot, PlantConfig};
//!
//! let mut bot = MockBalanceBot::new(PlantConfig::default().with_initial_tilt(0.05));
//! let mut machine = BalanceMachine::new(BalanceConfig::default());
//! let stats = run_episode(&mut machine, &mut bot, 2.0).unwrap();
//! assert!(!stats.fell);
//! ```

mod backend;
mod config;
mod mock;
mod plant;

pub use backend::{SimBackend, SimState, StepResult};
pub use config::PlantConfig;
pub use mock::MockBalanceBot;
pub use plant::BalancePlant;

use serde::Serialize;

use crate::control::{BalanceMachine, Tick};
use crate::{Error, Result};

/// Summary of one simulated run
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct EpisodeStats {
    /// Ticks simulated
    pub ticks: u64,
    /// Ticks that wrote a fresh command
    pub applied: u64,
    /// Ticks that held the previous command
    pub held: u64,
    /// Whether the robot fell before the end
    pub fell: bool,
    /// Largest tilt magnitude seen
    pub max_abs_tilt: f64,
    /// Plant state at the end
    pub final_state: SimState,
}

/// Run `machine` against `sim` for `seconds` of simulated time
///
/// Initializes the machine if needed and stops early if the robot falls.
/// The machine is left ready so the caller can continue or shut it down.
pub fn run_episode<B: SimBackend + ?Sized>(
    machine: &mut BalanceMachine,
    sim: &mut B,
    seconds: f64,
) -> Result<EpisodeStats> {
    if !(seconds.is_finite() && seconds >= 0.0) {
        return Err(Error::Config(format!("episode length must be non-negative, got {}", seconds)));
    }
    if !machine.is_ready() {
        machine.initialize()?;
    }

    let steps = (seconds / sim.config().dt).round() as u64;
    let mut stats = EpisodeStats {
        max_abs_tilt: sim.state().tilt.abs(),
        final_state: sim.state(),
        ..Default::default()
    };

    for _ in 0..steps {
        machine.sense(sim)?;
        match machine.actuate(sim)? {
            Tick::Applied(_) => stats.applied += 1,
            Tick::Held(_) => stats.held += 1,
        }

        let result = sim.step()?;
        stats.ticks += 1;
        stats.max_abs_tilt = stats.max_abs_tilt.max(result.state.tilt.abs());
        stats.final_state = result.state;
        if result.done {
            stats.fell = true;
            break;
        }
    }

    tracing::info!(
        backend = sim.name(),
        ticks = stats.ticks,
        fell = stats.fell,
        max_abs_tilt = stats.max_abs_tilt,
        final_tilt = stats.final_state.tilt,
        "episode finished"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BalanceConfig, StateFeedbackConfig};
    use crate::hardware::keys;
    use approx::assert_relative_eq;

    fn tilted_bot(tilt: f64) -> MockBalanceBot {
        MockBalanceBot::new(PlantConfig::default().with_initial_tilt(tilt))
    }

    fn assert_upright(stats: &EpisodeStats) {
        assert!(!stats.fell, "fell: {:?}", stats);
        assert!(stats.final_state.tilt.abs() < 1e-3, "tilt {}", stats.final_state.tilt);
        assert!(
            stats.final_state.tilt_rate.abs() < 1e-2,
            "tilt rate {}",
            stats.final_state.tilt_rate
        );
    }

    #[test]
    fn test_state_feedback_recovers() {
        for tilt in [0.02, 0.05, 0.1, 0.2, -0.1] {
            let mut machine = BalanceMachine::new(BalanceConfig::default());
            let mut bot = tilted_bot(tilt);
            let stats = run_episode(&mut machine, &mut bot, 5.0).unwrap();

            assert_upright(&stats);
            assert_eq!(stats.ticks, 500);
            assert_eq!(stats.applied, 500);
            assert!(stats.max_abs_tilt >= tilt.abs());
        }
    }

    #[test]
    fn test_pid_recovers() {
        for tilt in [0.05, 0.1] {
            let mut machine = BalanceMachine::new(BalanceConfig::pid_position());
            let mut bot = tilted_bot(tilt);
            let stats = run_episode(&mut machine, &mut bot, 10.0).unwrap();
            assert_upright(&stats);
        }
    }

    #[test]
    fn test_synthesized_gain_balances() {
        let config = BalanceConfig::default();
        for tilt in [0.05, 0.1, 0.2] {
            let mut bot = tilted_bot(tilt);
            let plant = BalancePlant::from_config(bot.config());
            let solution = plant.synthesize(&config.lqr).unwrap();

            let mut machine = BalanceMachine::new(config.clone()).with_gain(solution.gain);
            let stats = run_episode(&mut machine, &mut bot, 5.0).unwrap();
            assert_upright(&stats);
        }
    }

    #[test]
    fn test_velocity_mode_tracks_forward_speed() {
        let mut machine = BalanceMachine::new(BalanceConfig::teleop());
        let mut bot = MockBalanceBot::default();
        bot.hold_key(keys::UP, 0.0, 10.0, 0.05);

        let stats = run_episode(&mut machine, &mut bot, 10.0).unwrap();
        assert!(!stats.fell);
        assert_relative_eq!(stats.final_state.wheel_velocity(), 0.25, epsilon = 0.01);
        assert!(stats.final_state.wheel_position() > 2.0);
        assert!(stats.final_state.tilt.abs() < 1e-2);
    }

    #[test]
    fn test_turn_key_yaws_while_balanced() {
        let mut machine = BalanceMachine::new(BalanceConfig::teleop());
        let mut bot = MockBalanceBot::default();
        bot.hold_key(keys::RIGHT, 0.0, 1.0, 0.05);

        let stats = run_episode(&mut machine, &mut bot, 3.0).unwrap();
        assert!(!stats.fell);
        assert!(stats.final_state.yaw > 0.5, "yaw {}", stats.final_state.yaw);
        assert!(stats.final_state.tilt.abs() < 1e-6);

        // Key released by timeout: turning has stopped
        let rates = stats.final_state.wheel_rates;
        assert!((rates[0] - rates[1]).abs() < 1e-3);
    }

    #[test]
    fn test_sensor_dropout_holds_command() {
        let mut machine = BalanceMachine::new(BalanceConfig::default());
        let mut bot = tilted_bot(0.05);
        bot.drop_reads(0.995, 1.045);

        let stats = run_episode(&mut machine, &mut bot, 5.0).unwrap();
        assert_eq!(stats.held, 5);
        assert_eq!(stats.applied, 495);
        assert_eq!(machine.stats().sensor_failures, 5);
        assert_upright(&stats);
    }

    #[test]
    fn test_fall_ends_episode() {
        let config = BalanceConfig::default()
            .with_state_feedback(StateFeedbackConfig::default().with_gains([0.0; 4]));
        let mut machine = BalanceMachine::new(config);
        let mut bot = tilted_bot(0.1);

        let stats = run_episode(&mut machine, &mut bot, 5.0).unwrap();
        assert!(stats.fell);
        assert!(stats.ticks < 500);
        assert!(bot.has_fallen());
        assert!(machine.is_ready());
    }

    #[test]
    fn test_rejects_bad_length() {
        let mut machine = BalanceMachine::new(BalanceConfig::default());
        let mut bot = MockBalanceBot::default();
        assert!(run_episode(&mut machine, &mut bot, -1.0).is_err());
        assert!(run_episode(&mut machine, &mut bot, f64::NAN).is_err());

        let stats = run_episode(&mut machine, &mut bot, 0.0).unwrap();
        assert_eq!(stats.ticks, 0);
    }
}
