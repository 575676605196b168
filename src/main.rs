//! Process entry point (`SPEC_FULL.md` §4.M). Loads configuration,
//! initializes logging, spawns the real-time fast-loop thread, and runs
//! the slow loop on the main thread until a shutdown signal arrives.

use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use stator::config::Config;
use stator::context::MotorContext;
use stator::drivers::sim::SimHandle;
use stator::fast_loop::{rt_setup, FastLoop};
use stator::phase_driver::{GpioBackend, PhaseDriver};
use stator::slow_loop::SlowLoop;

const DEFAULT_CONFIG_PATH: &str = "/etc/stator/motor.conf";

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Installs a SIGINT/SIGTERM handler that flips `flag`. Both loops poll
/// `flag` each iteration rather than being interrupted mid-operation.
fn install_shutdown_handler(flag: Arc<AtomicBool>) {
    use nix::sys::signal::{self, SigHandler, Signal};

    static SHUTDOWN: std::sync::OnceLock<Arc<AtomicBool>> = std::sync::OnceLock::new();
    let _ = SHUTDOWN.set(flag);

    extern "C" fn handle(_: i32) {
        if let Some(flag) = SHUTDOWN.get() {
            flag.store(true, Ordering::SeqCst);
        }
    }

    unsafe {
        let _ = signal::signal(Signal::SIGINT, SigHandler::Handler(handle));
        let _ = signal::signal(Signal::SIGTERM, SigHandler::Handler(handle));
    }
}

fn main() {
    init_tracing();

    let config_path = env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let cfg = Config::load(&config_path);
    if !cfg.is_healthy() {
        error!("configuration failed sanity check, using it anyway; review the override file");
    }
    info!(path = %config_path, pole_pairs = cfg.pole_pairs, fast_hz = cfg.fast_hz, slow_hz = cfg.slow_hz, "configuration loaded");

    // No real GPIO/SPI backend is wired up for this target yet; the `sim`
    // collaborators stand in so the process is runnable and observable
    // end-to-end off real hardware (`SPEC_FULL.md` §4.M).
    let sim = SimHandle::new();
    sim.set_v_bus(cfg.bus_v_min + 1.0);

    let ctx = MotorContext::new();
    let shutdown = Arc::new(AtomicBool::new(false));
    install_shutdown_handler(shutdown.clone());

    rt_setup(&cfg);

    let driver = PhaseDriver::new(GpioBackend::new(core::array::from_fn(|_| {
        Box::new(stator::drivers::sim::SimDigitalOutput::new(Default::default())) as Box<dyn stator::drivers::DigitalOutput>
    })));

    let mut fast_loop = FastLoop::new(cfg, ctx.clone(), driver, sim.hall_inputs(), sim.adc(), sim.gate_driver());
    let fast_shutdown = shutdown.clone();
    let fast_handle = thread::Builder::new()
        .name("stator-fast".into())
        .spawn(move || fast_loop.run(fast_shutdown))
        .expect("failed to spawn fast-loop thread");

    let mut slow_loop = SlowLoop::new(cfg, ctx, sim.adc());
    slow_loop.run(shutdown.clone());

    if fast_handle.join().is_err() {
        error!("fast-loop thread panicked");
    }
    info!("shutdown complete");
}
