//! balbot: gain synthesis and mock balance runs from the command line
//!
//! ```text
//! balbot synth --q 1,1 --r 1
//! balbot simulate --controller pid --tilt 0.1 --seconds 10
//! balbot --config robot.toml simulate --synthesize
//! ```
//!
//! Log verbosity follows `RUST_LOG` when set, otherwise `-v`/`-vv`.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use balbot_core::hardware::keys;
use balbot_core::sim::{run_episode, BalancePlant, MockBalanceBot, PlantConfig, SimBackend};
use balbot_core::synthesis::{LqrWeights, ReferenceDynamics, SolverConfig, SynthesisConfig, SynthesisPipeline};
use balbot_core::{BalanceConfig, BalanceMachine, ControllerKind};

#[derive(Parser, Debug)]
#[command(name = "balbot", version, about = "Self-balancing robot synthesis and simulation")]
struct Cli {
    /// Balance configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Find the equilibria of the reference dynamics and synthesize an LQR gain
    Synth {
        /// Diagonal of Q
        #[arg(long, value_delimiter = ',', default_values_t = [1.0, 1.0])]
        q: Vec<f64>,

        /// Diagonal of R
        #[arg(long, value_delimiter = ',', default_values_t = [1.0])]
        r: Vec<f64>,

        /// Newton seeds per state axis
        #[arg(long, default_value_t = 9)]
        seeds: usize,
    },

    /// Balance the mock robot from an initial tilt
    Simulate {
        /// Controller variant (overrides the configuration)
        #[arg(long, value_enum)]
        controller: Option<ControllerArg>,

        /// Simulated seconds
        #[arg(long, default_value_t = 5.0)]
        seconds: f64,

        /// Initial tilt in radians
        #[arg(long, default_value_t = 0.05)]
        tilt: f64,

        /// Replace the configured gains with LQR gains for the plant model
        #[arg(long, default_value_t = false)]
        synthesize: bool,

        /// Hold the forward key for the whole run
        #[arg(long, default_value_t = false)]
        forward: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ControllerArg {
    Lqr,
    Pid,
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init();
}

fn load_config(path: Option<&PathBuf>, controller: Option<ControllerArg>) -> Result<BalanceConfig> {
    let config = match (path, controller) {
        (Some(path), _) => BalanceConfig::from_toml_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        (None, Some(ControllerArg::Pid)) => BalanceConfig::pid_position(),
        (None, _) => BalanceConfig::default(),
    };
    Ok(match controller {
        Some(ControllerArg::Lqr) => config.with_controller(ControllerKind::StateFeedback),
        Some(ControllerArg::Pid) => config.with_controller(ControllerKind::Pid),
        None => config,
    })
}

fn synth(q: Vec<f64>, r: Vec<f64>, seeds: usize) -> Result<()> {
    let config = SynthesisConfig {
        solver: SolverConfig::default().with_seeds_per_axis(seeds),
        weights: LqrWeights::new(q, r),
    };
    let report = SynthesisPipeline::new(ReferenceDynamics, config)
        .run()
        .context("gain synthesis failed")?;
    println!("{}", report);
    Ok(())
}

fn simulate(
    config: BalanceConfig,
    seconds: f64,
    tilt: f64,
    synthesize: bool,
    forward: bool,
) -> Result<()> {
    let plant_config = PlantConfig::default().with_initial_tilt(tilt);
    plant_config.validate().context("invalid initial conditions")?;
    let mut bot = MockBalanceBot::new(plant_config);
    if forward {
        bot.hold_key(keys::UP, 0.0, seconds, 0.05);
    }

    let mut machine = if synthesize {
        if config.controller != ControllerKind::StateFeedback {
            bail!("--synthesize needs the state-feedback controller");
        }
        let solution = BalancePlant::from_config(bot.config())
            .synthesize(&config.lqr)
            .context("plant gain synthesis failed")?;
        println!("K = {}", solution.gain);
        BalanceMachine::new(config).with_gain(solution.gain)
    } else {
        BalanceMachine::new(config)
    };

    let stats = run_episode(&mut machine, &mut bot, seconds).context("simulation failed")?;
    machine.shutdown(&mut bot).context("failed to stop the robot")?;

    let s = &stats.final_state;
    println!("ticks:        {} ({} held)", stats.ticks, stats.held);
    println!("fell:         {}", stats.fell);
    println!("max |tilt|:   {:.4} rad", stats.max_abs_tilt);
    println!("final tilt:   {:.6} rad", s.tilt);
    println!("wheel pos:    {:.4} rad", s.wheel_position());
    println!("wheel vel:    {:.4} rad/s", s.wheel_velocity());
    println!("yaw:          {:.4} rad", s.yaw);

    if stats.fell {
        bail!("robot fell after {:.2} s", s.sim_time);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Synth { q, r, seeds } => synth(q, r, seeds),
        Command::Simulate {
            controller,
            seconds,
            tilt,
            synthesize,
            forward,
        } => {
            let config = load_config(cli.config.as_ref(), controller)?;
            simulate(config, seconds, tilt, synthesize, forward)
        }
    }
}
