//! Fleet Telemetry Simulation
//!
//! Generates probe telemetry for a fleet of simulated vehicles, written as
//! `InboundMessage` JSON lines for piping into Fleet Sentinel.
//! Each vehicle drives a noisy heading from a shared start point while:
//! - Fuel burns down every tick (crossing half tank, then 1/10 tank)
//! - Engine temperature random-walks upward and resets past its maximum
//!
//! # Usage
//! ```bash
//! ./simulation --vehicles 5 --ticks 6000 --fuel-burn 0.05 | ./fleet-sentinel --stdin
//! ```
//!
//! Vehicle assets matching the generated device ids are printed to stderr
//! with `--print-assets`, ready to paste into `fleet_config.toml`.

use clap::Parser;
use rand::prelude::*;
use rand_distr::{Distribution, Normal};
use serde_json::json;
use std::io::{self, Write};
use std::time::Duration;

use fleet_sentinel::config::defaults::{
    SIMULATION_VENDOR, SIM_ENGINE_TEMP_DEFAULT, SIM_ENGINE_TEMP_MAX, SIM_FUEL_DEFAULT, SIM_FUEL_TANK,
    VEHICLE_DEVICE_TYPE,
};
use fleet_sentinel::types::InboundMessage;

// ============================================================================
// Simulation Constants
// ============================================================================

/// Start latitude (Tokyo station)
const START_LAT: f64 = 35.681_382;
/// Start longitude
const START_LNG: f64 = 139.766_084;
/// Cruising speed (km/h)
const BASE_SPEED: f64 = 40.0;
/// Simulated time between probes (ms)
const TICK_MS: i64 = 1000;
/// Degrees of latitude per metre (approx.)
const DEG_PER_METRE: f64 = 1.0 / 111_320.0;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "fleet-simulation")]
#[command(about = "Vehicle probe simulation for Fleet Sentinel testing")]
#[command(version = "1.0")]
struct Args {
    /// Number of simulated vehicles
    #[arg(short, long, default_value = "3", value_parser = clap::value_parser!(u32).range(1..=1000))]
    vehicles: u32,

    /// Probes generated per vehicle
    #[arg(short, long, default_value = "600")]
    ticks: u64,

    /// Wall-clock pause between ticks in ms (0 = as fast as possible)
    #[arg(short, long, default_value = "0")]
    interval_ms: u64,

    /// Fuel burned per tick (litres)
    #[arg(long, default_value = "0.01")]
    fuel_burn: f64,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Print matching `[[assets]]` config to stderr before running
    #[arg(long)]
    print_assets: bool,

    /// Suppress mission log (only output messages)
    #[arg(short, long)]
    quiet: bool,
}

// ============================================================================
// Vehicle State
// ============================================================================

struct SimulatedVehicle {
    device_id: String,
    trip_id: String,
    lat: f64,
    lng: f64,
    heading: f64,
    speed: f64,
    fuel: f64,
    engine_temp: f64,
}

impl SimulatedVehicle {
    fn new(index: u32, rng: &mut StdRng) -> Self {
        Self {
            device_id: format!("sim-dev-{}", index),
            trip_id: format!("sim-trip-{}-{}", index, rng.gen::<u32>()),
            lat: START_LAT,
            lng: START_LNG,
            heading: rng.gen_range(0.0..360.0),
            speed: BASE_SPEED,
            fuel: SIM_FUEL_DEFAULT,
            engine_temp: SIM_ENGINE_TEMP_DEFAULT,
        }
    }

    /// Advance one tick: move along the heading and update sensor props.
    fn step(&mut self, rng: &mut StdRng, noise: &Normal<f64>, fuel_burn: f64) {
        self.heading = (self.heading + noise.sample(rng) * 5.0).rem_euclid(360.0);
        self.speed = (BASE_SPEED + noise.sample(rng) * 5.0).max(0.0);

        let metres = self.speed / 3.6 * (TICK_MS as f64 / 1000.0);
        let rad = self.heading.to_radians();
        self.lat += metres * rad.cos() * DEG_PER_METRE;
        self.lng += metres * rad.sin() * DEG_PER_METRE / self.lat.to_radians().cos();

        self.fuel = (self.fuel - fuel_burn).max(0.0);

        // Random walk biased upward; out-of-range readings reset to default
        self.engine_temp += rng.gen::<f64>() * 0.5 - 0.15;
        if !(0.0..=SIM_ENGINE_TEMP_MAX).contains(&self.engine_temp) {
            self.engine_temp = SIM_ENGINE_TEMP_DEFAULT;
        }
    }

    fn probe_message(&self, ts: i64) -> InboundMessage {
        let payload = json!({
            "d": {
                "lat": self.lat,
                "lng": self.lng,
                "trip_id": self.trip_id,
                "speed": (self.speed * 10.0).round() / 10.0,
                "heading": (self.heading * 10.0).round() / 10.0,
                "ts": ts,
                "props": {
                    "fuel": (self.fuel * 100.0).round() / 100.0,
                    "engineTemp": (self.engine_temp * 100.0).round() / 100.0,
                }
            }
        });
        InboundMessage::Event {
            device_type: VEHICLE_DEVICE_TYPE.to_string(),
            device_id: self.device_id.clone(),
            event_type: "probe".to_string(),
            format: "json".to_string(),
            payload: payload.to_string(),
        }
    }
}

fn asset_config(vehicles: &[SimulatedVehicle]) -> String {
    let mut out = String::new();
    for (i, v) in vehicles.iter().enumerate() {
        out.push_str(&format!(
            "[[assets]]\ndevice_id = \"{}\"\ndevice_type = \"{}\"\nvehicle_id = \"sim-car-{}\"\nvendor = \"{}\"\nproperties = {{ fueltank = {} }}\n\n",
            v.device_id, VEHICLE_DEVICE_TYPE, i, SIMULATION_VENDOR, SIM_FUEL_TANK
        ));
    }
    out
}

fn log_mission(tick: u64, message: &str, quiet: bool) {
    if !quiet {
        eprintln!("[tick {:>6}] {}", tick, message);
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let noise = Normal::new(0.0, 1.0)?;

    let mut fleet: Vec<SimulatedVehicle> = (0..args.vehicles)
        .map(|i| SimulatedVehicle::new(i, &mut rng))
        .collect();

    if args.print_assets {
        eprint!("{}", asset_config(&fleet));
    }

    log_mission(0, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━", args.quiet);
    log_mission(
        0,
        &format!(
            "Fleet simulation: {} vehicles x {} ticks | fuel {:.0}/{:.0} L, burn {} L/tick",
            args.vehicles, args.ticks, SIM_FUEL_DEFAULT, SIM_FUEL_TANK, args.fuel_burn
        ),
        args.quiet,
    );
    log_mission(0, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━", args.quiet);

    let stdout = io::stdout();
    let mut stdout_lock = stdout.lock();
    let start_ts = chrono::Utc::now().timestamp_millis();
    let mut last_log_percent = 0u64;

    for tick in 0..args.ticks {
        let ts = start_ts + tick as i64 * TICK_MS;
        for vehicle in fleet.iter_mut() {
            vehicle.step(&mut rng, &noise, args.fuel_burn);
            let json = serde_json::to_string(&vehicle.probe_message(ts))?;
            writeln!(stdout_lock, "{}", json)?;
        }

        // Progress logging (every 10%)
        let current_percent = (tick + 1) * 100 / args.ticks.max(1) / 10 * 10;
        if current_percent > last_log_percent {
            if let Some(first) = fleet.first() {
                log_mission(
                    tick + 1,
                    &format!(
                        "Progress: {}% | {}: fuel {:.1}/{:.0} L, engineTemp {:.1}",
                        current_percent, first.device_id, first.fuel, SIM_FUEL_TANK, first.engine_temp
                    ),
                    args.quiet,
                );
            }
            last_log_percent = current_percent;
        }

        if args.interval_ms > 0 {
            stdout_lock.flush()?;
            std::thread::sleep(Duration::from_millis(args.interval_ms));
        }
    }

    stdout_lock.flush()?;
    log_mission(args.ticks, "Simulation complete", args.quiet);
    Ok(())
}
