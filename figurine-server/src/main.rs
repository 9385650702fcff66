use std::path::PathBuf;
use std::sync::Arc;
use anyhow::{anyhow, Context};
use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, EnvFilter};

use figurine_common::models::Settings;
use figurine_core::drivers::{as_drivers, virtual_joints, VirtualJointOptions};
use figurine_core::eventbus::EventBus;
use figurine_core::tasks::{spawn_pose_sampler, spawn_telemetry_logger};
use figurine_core::MotionController;

mod console;

#[derive(Parser, Debug, Clone)]
#[command(name = "figurine")]
#[command(author, version, about = "Figurine motion controller driving simulated joints")]
struct Args {
    /// JSON settings file; any field left out keeps its default.
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Override the control tick rate.
    #[arg(long)]
    tick_hz: Option<f64>,

    /// Override the idle behaviour: none, sweep, patrol or minimal.
    #[arg(long)]
    idle: Option<String>,

    /// Log level for the figurine crates.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log the pose at this rate (debug level); 0 disables.
    #[arg(long, default_value_t = 0.0)]
    pose_log_hz: f64,

    /// No console; run until Ctrl-C.
    #[arg(long, default_value = "false")]
    headless: bool,
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("figurine={}", level).parse().unwrap_or_default());
    let sub = fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(sub).context("failed to set global subscriber")
}

fn load_settings(args: &Args) -> anyhow::Result<Settings> {
    let mut settings = match &args.config {
        Some(path) => Settings::from_json_file(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => Settings::default(),
    };
    if let Some(hz) = args.tick_hz {
        settings.tick_hz = hz;
    }
    if let Some(name) = &args.idle {
        settings.idle = console::parse_idle(name).ok_or_else(|| anyhow!("unknown idle behaviour '{}'", name))?;
    }
    settings.validate()?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    let settings = load_settings(&args)?;
    info!(
        "figurine starting: tick={} Hz, idle={}, headless={}",
        settings.tick_hz,
        settings.idle.name(),
        args.headless
    );

    let event_bus = Arc::new(EventBus::new());
    let logger = spawn_telemetry_logger(&event_bus, 1024);

    let joints = virtual_joints(&settings, VirtualJointOptions::default());
    let controller = MotionController::new(settings, as_drivers(&joints), Arc::clone(&event_bus))?;
    if let Err(e) = controller.start().await {
        error!("controller failed to start: {}", e);
        event_bus.shutdown();
        let _ = logger.await;
        return Err(e.into());
    }

    let sampler = (args.pose_log_hz > 0.0).then(|| {
        spawn_pose_sampler(
            controller.subscribe_pose(),
            args.pose_log_hz,
            event_bus.shutdown_rx.clone(),
            |p| debug!(body = p.body, head = p.head, left = p.left_hand, right = p.right_hand, "pose"),
        )
    });

    // Ctrl-C => shut the bus down; everything else watches it
    let bus_for_ctrlc = Arc::clone(&event_bus);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl-C: {:?}", e);
            return;
        }
        info!("Ctrl-C detected; shutting down");
        bus_for_ctrlc.shutdown();
    });

    if args.headless {
        let mut shutdown_rx = event_bus.shutdown_rx.clone();
        while !*shutdown_rx.borrow() {
            if shutdown_rx.changed().await.is_err() {
                break;
            }
        }
    } else if let Err(e) = console::run_console(controller.clone(), event_bus.shutdown_rx.clone()).await {
        error!("console error: {}", e);
    }

    controller.stop().await;
    event_bus.shutdown();
    if let Some(handle) = sampler {
        let _ = handle.await;
    }
    match logger.await {
        Ok(count) => info!("shutdown complete ({} events logged)", count),
        Err(e) => error!("telemetry logger failed: {}", e),
    }
    Ok(())
}
