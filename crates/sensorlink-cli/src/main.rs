//! `sensorlink` – headless ingestion host
//!
//! Runs the two-port ingestion service against a simulated world:
//!
//! 1. Loads `~/.sensorlink/config.toml` (defaults when absent, then
//!    `SENSORLINK_*` overrides) and validates it.
//! 2. Starts the bounded notifier, the world and the ingestion service.
//! 3. Ticks a fixed-rate physics step and a frame-rate dispatcher drain until
//!    **Ctrl-C**, then stops and joins both acceptors before exiting.
//!
//! Pass `--write-config` to save the effective configuration to disk.

mod config;
mod telemetry;

use colored::Colorize;
use std::fs;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use sensorlink_middleware::{IngestionService, MainThreadDispatcher, Notifier};
use sensorlink_scene::{HandoffFile, PhysicsGrabbable, Scene, SimRigidBody, World};
use sensorlink_types::{LinkError, Vec3};

fn main() -> ExitCode {
    let _telemetry = telemetry::init_tracing("sensorlink");

    print_banner();

    // ── Configuration ─────────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = cfg.validate() {
        println!("{}: {}", "Invalid configuration".red(), e);
        return ExitCode::FAILURE;
    }
    if std::env::args().skip(1).any(|a| a == "--write-config") {
        match config::save(&cfg) {
            Ok(()) => println!(
                "  {} Config saved to {}",
                "✓".green().bold(),
                config::config_path().display().to_string().bold()
            ),
            Err(e) => println!("{}: {}", "Error saving config".red(), e),
        }
    }

    // ── Shutdown flag ─────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping listeners …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; the host can only be killed");
    }

    match run(&cfg, &shutdown) {
        Ok(()) => {
            println!("{}", "  ✓ Listeners joined. Bye.".green());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "sensorlink host failed");
            println!("{}: {}", "Startup failed".red(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(cfg: &config::Config, shutdown: &AtomicBool) -> Result<(), LinkError> {
    fs::create_dir_all(&cfg.data_dir).map_err(|source| LinkError::Handoff {
        path: cfg.data_dir.clone(),
        source,
    })?;

    let notifier = if cfg.notifier_enabled {
        Some(Notifier::spawn(cfg.notifier())?)
    } else {
        None
    };

    let handoff = HandoffFile::new(cfg.handoff_path());
    let mut grabbable = PhysicsGrabbable::new(
        "sensor-body",
        SimRigidBody::new(Vec3::new(0.0, 1.0, 0.0), 1.0),
        handoff.clone(),
    );
    if let Some(notifier) = &notifier {
        grabbable = grabbable.with_notifier(notifier.handle());
    }
    grabbable.on_velocities_applied(|v| {
        debug!(linear = %v.linear, angular = %v.angular, "velocities applied");
    });
    let mut world = World::new(
        Scene::with_counts(cfg.light_count, cfg.cylinder_count),
        handoff,
        grabbable,
    );

    let dispatcher = MainThreadDispatcher::<World>::new();
    let mut service = IngestionService::new(cfg.ingestion(), dispatcher.handle());
    service.start_all()?;

    if let (Some(sensor), Some(command)) = (service.sensor_addr(), service.command_addr()) {
        println!("  Sensor stream   {}", sensor.to_string().bold());
        println!("  Command stream  {}", command.to_string().bold());
        println!("  Handoff file    {}", cfg.handoff_path().display().to_string().dimmed());
        println!();
    }

    run_tick_loop(&mut world, &dispatcher, cfg.fixed_hz, cfg.frame_hz, shutdown);

    service.stop_all();
    if let Some(notifier) = notifier {
        notifier.shutdown();
    }
    info!("sensorlink host stopped");
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tick loop
// ─────────────────────────────────────────────────────────────────────────────

/// Fixed-step physics plus one dispatcher drain per frame, until `shutdown`.
fn run_tick_loop(
    world: &mut World,
    dispatcher: &MainThreadDispatcher<World>,
    fixed_hz: u32,
    frame_hz: u32,
    shutdown: &AtomicBool,
) {
    let fixed_dt = Duration::from_secs_f64(1.0 / f64::from(fixed_hz.max(1)));
    let frame = Duration::from_secs_f64(1.0 / f64::from(frame_hz.max(1)));
    let mut accumulator = Duration::ZERO;
    let mut last = Instant::now();

    while !shutdown.load(Ordering::SeqCst) {
        let frame_start = Instant::now();
        accumulator += frame_start - last;
        last = frame_start;

        while accumulator >= fixed_dt {
            world.step(fixed_dt.as_secs_f32());
            accumulator -= fixed_dt;
        }
        dispatcher.drain(world);

        if let Some(rest) = frame.checked_sub(frame_start.elapsed()) {
            thread::sleep(rest);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"  ___                        _    _      _   "#.bold().cyan());
    println!("{}", r#" / __| ___ _ _  ___ ___ _ _| |  (_)_ _ | |__"#.bold().cyan());
    println!("{}", r#" \__ \/ -_) ' \(_-</ _ \ '_| |__| | ' \| / /"#.bold().cyan());
    println!("{}", r#" |___/\___|_||_/__/\___/_| |____|_|_||_|_\_\"#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "SensorLink".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Dual-port sensor and command ingestion host");
    println!();
}
