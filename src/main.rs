//! Analog Sim - nonlinear circuit emulation for audio effects
//!
//! # Usage
//!
//! ```bash
//! ffmpeg -i input.wav -f f32le -ac 1 -ar 48000 - \
//!   | analog-sim --circuit big-muff --set stages=3 \
//!   | ffmpeg -f f32le -ac 1 -ar 48000 -i - output.wav
//! ```

use std::time::Instant;

use clap::{ArgAction, Parser};
use log::{info, warn, LevelFilter};

use analog_sim::{
    audio::process_audio,
    error::{Result, SimError},
    Circuit, CircuitKind, IterationPolicy, DEFAULT_SAMPLE_RATE,
};

/// Real-time analog circuit emulator, raw f32le mono on stdin and stdout
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Circuit model to run
    #[arg(short, long, value_enum, default_value_t = CircuitKind::DiodeClipper)]
    circuit: CircuitKind,

    /// Sample rate in Hz
    #[arg(short, long, default_value_t = DEFAULT_SAMPLE_RATE)]
    sample_rate: f32,

    /// Drive, 0..1
    #[arg(long)]
    drive: Option<f64>,

    /// Low-pass cutoff in Hz
    #[arg(long)]
    cutoff: Option<f64>,

    /// Fuzz pot, 0..1
    #[arg(long)]
    fuzz: Option<f64>,

    /// Wah treadle, 0..1
    #[arg(long)]
    wah: Option<f64>,

    /// Any control as NAME=VALUE, repeatable
    #[arg(long = "set", value_name = "NAME=VALUE", value_parser = parse_control)]
    controls: Vec<(String, f64)>,

    /// Newton-Raphson iterations per sample (upper bound with --early-exit)
    #[arg(short, long)]
    iterations: Option<usize>,

    /// Stop iterating once the update falls below this tolerance
    #[arg(long, value_name = "TOLERANCE")]
    early_exit: Option<f64>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn parse_control(s: &str) -> std::result::Result<(String, f64), String> {
    let (name, value) = s.split_once('=').ok_or_else(|| format!("expected NAME=VALUE, got '{s}'"))?;
    let value = value
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid value for '{name}': {e}"))?;
    Ok((name.trim().to_string(), value))
}

impl Args {
    fn iteration_policy(&self) -> Option<IterationPolicy> {
        match (self.iterations, self.early_exit) {
            (None, None) => None,
            (iterations, None) => iterations.map(|n| IterationPolicy::Fixed(n.max(1))),
            (iterations, Some(tolerance)) => Some(IterationPolicy::EarlyExit {
                max_iterations: iterations.unwrap_or(16).max(1),
                tolerance: tolerance.abs(),
            }),
        }
    }

    fn control_values(&self) -> Vec<(String, f64)> {
        let named = [
            ("drive", self.drive),
            ("cutoff", self.cutoff),
            ("fuzz", self.fuzz),
            ("wah", self.wah),
        ];
        named
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (name.to_string(), v)))
            .chain(self.controls.iter().cloned())
            .collect()
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .init();
}

fn apply_controls(circuit: &mut dyn Circuit, values: &[(String, f64)]) -> Result<()> {
    for (name, value) in values {
        match circuit.set_control(name, *value) {
            Ok(()) => info!("{} = {value}", name),
            Err(SimError::InvalidParameter { .. }) if circuit.controls().iter().all(|c| c.name != name.as_str()) => {
                let known: Vec<&str> = circuit.controls().iter().map(|c| c.name).collect();
                warn!(
                    "{} has no control '{name}', ignoring (controls: {})",
                    circuit.name(),
                    known.join(", ")
                );
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let policy = args.iteration_policy();
    let mut circuit = args.circuit.build(1, policy)?;
    apply_controls(circuit.as_mut(), &args.control_values())?;
    circuit.prepare(f64::from(args.sample_rate))?;

    info!(
        "running {} at {} Hz{}",
        args.circuit,
        args.sample_rate,
        policy.map(|p| format!(" with {p:?}")).unwrap_or_default()
    );

    let started = Instant::now();
    let samples = process_audio(circuit.as_mut())?;
    let elapsed = started.elapsed().as_secs_f64();

    let audio_seconds = samples as f64 / f64::from(args.sample_rate);
    info!(
        "processed {samples} samples ({audio_seconds:.2} s of audio) in {elapsed:.2} s, {:.1}x real time",
        if elapsed > 0.0 { audio_seconds / elapsed } else { 0.0 }
    );
    if circuit.recoveries() > 0 {
        warn!("{} recovered from {} unstable samples", circuit.name(), circuit.recoveries());
    }

    Ok(())
}
