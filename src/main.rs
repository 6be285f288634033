//! Unicorn clock daemon.
//!
//! Drives an LED matrix clock: the brightness loop follows the ambient light
//! sensor (or a manual level), the display loop applies mode/effect changes
//! made with the buttons and persists them once they settle.

mod brightness;
mod calibration;
mod config;
mod debounce;
mod effects;
mod error;
mod hardware;
mod hysteresis;
mod input;
mod ipc_server;
mod light_sampler;
mod logging;
mod mode_machine;
mod ramp;
mod renderer;
mod settings;

use brightness::{BrightnessController, BrightnessIntent};
use config::{Config, ConfigManager};
use effects::EFFECT_COUNT;
use error::DaemonError;
use hardware::{
    BrightnessActuator, LightSensor, SimulatedBacklight, SimulatedLightSensor, SysfsBacklight,
    SysfsLightSensor,
};
use input::{edge_queue, InputRouter};
use ipc_server::DaemonState;
use mode_machine::{DisplayIntent, ModeEffectStateMachine};
use renderer::{ClockRenderer, TracingFrameSink};
use settings::{JsonSettingsStore, SettingsStore};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Graceful shutdown timeout in seconds
const SHUTDOWN_TIMEOUT_SECS: u64 = 2;

/// Delay before rebinding the control socket after a failure
const IPC_RETRY_SECS: u64 = 5;

type ClockStateMachine = ModeEffectStateMachine<ClockRenderer, JsonSettingsStore>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _log_guard = logging::init_logging().map_err(|e| {
        eprintln!("Failed to initialize logging: {}", e);
        DaemonError::from(e)
    })?;

    info!("Unicorn clock daemon starting...");

    let result = run_daemon().await;

    match &result {
        Ok(()) => info!("Unicorn clock daemon shut down gracefully"),
        Err(e) => error!("Unicorn clock daemon error: {}", e),
    }

    Ok(result?)
}

async fn run_daemon() -> Result<(), DaemonError> {
    let config_path = ConfigManager::default_path();
    let config_manager = Arc::new(ConfigManager::load_or_default(&config_path)?);
    info!("Configuration loaded from {:?}", config_manager.path());
    let config = config_manager.get();

    let store = JsonSettingsStore::new(config.settings_path());
    info!("Display settings at {:?}", store.path());
    let display = Arc::new(DisplayIntent::from_record(store.load(), EFFECT_COUNT));
    let brightness = Arc::new(BrightnessIntent::new(
        config.brightness_mode,
        config.manual_level,
    ));

    let (mut sensor, actuator) = open_hardware(&config);
    let initial_light = sensor.read_light();
    let controller = BrightnessController::new(
        config.tuning(),
        brightness.mode(),
        brightness.manual_level(),
        actuator.brightness(),
        initial_light,
    );
    info!(
        "Default brightness at launch: {:.2} ({} mode, light {:.2})",
        controller.current_brightness(),
        controller.mode().as_str(),
        initial_light
    );

    let (edge_tx, edge_rx) = edge_queue();
    let state = Arc::new(DaemonState::new(
        Arc::clone(&config_manager),
        Arc::clone(&display),
        Arc::clone(&brightness),
        controller.status(),
        edge_tx,
    ));
    state.publish_brightness(controller.status(), initial_light).await;

    // The startup selection is rendered before any task runs
    let sink = Arc::new(Mutex::new(TracingFrameSink::default()));
    let renderer = ClockRenderer::new(sink, config.frame_interval());
    let mut machine = ModeEffectStateMachine::new(renderer, store, config.quiet_period());
    machine.start(&display);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = setup_signal_handlers(signal_tx).await {
            error!("Signal handler error: {}", e);
        }
    });

    let ipc_state = Arc::clone(&state);
    let socket_path = config.socket_path.clone();
    let ipc_shutdown_rx = shutdown_rx.clone();
    let ipc_handle = tokio::spawn(async move {
        run_ipc_server(ipc_state, socket_path, ipc_shutdown_rx).await
    });

    let router = InputRouter::new(Arc::clone(&display), Arc::clone(&brightness), config.debounce());
    let router_handle = tokio::spawn(router.run(edge_rx, shutdown_rx.clone()));

    let brightness_state = Arc::clone(&state);
    let brightness_config = config.clone();
    let brightness_shutdown_rx = shutdown_rx.clone();
    let brightness_handle = tokio::spawn(async move {
        run_brightness_loop(
            controller,
            sensor,
            actuator,
            brightness_state,
            brightness_config,
            brightness_shutdown_rx,
        )
        .await
    });

    let display_shutdown_rx = shutdown_rx.clone();
    let poll = config.input_poll();
    let display_handle = tokio::spawn(async move {
        run_display_loop(machine, display, poll, display_shutdown_rx).await
    });

    info!("Unicorn clock daemon initialized and running");

    let mut shutdown_rx_main = shutdown_rx.clone();
    shutdown_rx_main.changed().await.ok();

    info!("Shutdown signal received, stopping tasks...");

    let shutdown_timeout = Duration::from_secs(SHUTDOWN_TIMEOUT_SECS);
    let _ = tokio::time::timeout(shutdown_timeout, async {
        let _ = tokio::join!(ipc_handle, router_handle, brightness_handle, display_handle);
    })
    .await;

    info!("All tasks stopped");
    Ok(())
}

/// Pick sysfs devices when configured, simulated ones otherwise.
fn open_hardware(config: &Config) -> (Box<dyn LightSensor>, Box<dyn BrightnessActuator>) {
    let hw = &config.hardware;

    let sensor: Box<dyn LightSensor> = match &hw.light_sensor_path {
        Some(path) => {
            let sensor = SysfsLightSensor::new(path);
            info!("Light sensor at {:?}", sensor.path());
            Box::new(sensor)
        }
        None => {
            info!("No light sensor configured, simulating {:.1}", hw.simulated_light);
            Box::new(SimulatedLightSensor::new(hw.simulated_light))
        }
    };

    let actuator: Box<dyn BrightnessActuator> = match &hw.backlight_path {
        Some(path) => match SysfsBacklight::open(path) {
            Ok(backlight) => Box::new(backlight),
            Err(e) => {
                warn!("Backlight unavailable: {}, using a simulated one", e);
                Box::new(SimulatedBacklight::default())
            }
        },
        None => Box::new(SimulatedBacklight::default()),
    };

    (sensor, actuator)
}

/// Set up signal handlers for graceful shutdown (SIGTERM and SIGINT).
#[cfg(unix)]
async fn setup_signal_handlers(
    shutdown_tx: watch::Sender<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT");
        }
    }

    let _ = shutdown_tx.send(true);
    Ok(())
}

#[cfg(not(unix))]
async fn setup_signal_handlers(
    shutdown_tx: watch::Sender<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C");
    let _ = shutdown_tx.send(true);
    Ok(())
}

/// Serve the control socket, rebinding after failures.
async fn run_ipc_server(
    state: Arc<DaemonState>,
    socket_path: String,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("IPC server shutting down");
                    break;
                }
            }
            result = run_ipc_server_inner(Arc::clone(&state), &socket_path) => {
                match result {
                    Ok(()) => break,
                    Err(e) => {
                        error!("IPC server error: {}, restarting in {} seconds", e, IPC_RETRY_SECS);
                        tokio::time::sleep(Duration::from_secs(IPC_RETRY_SECS)).await;
                    }
                }
            }
        }
    }
}

#[cfg(unix)]
async fn run_ipc_server_inner(state: Arc<DaemonState>, socket_path: &str) -> Result<(), error::IpcError> {
    let server = ipc_server::IpcServer::new(socket_path).await?;
    info!("IPC server listening on {:?}", server.socket_path());
    server.run(state).await
}

#[cfg(not(unix))]
async fn run_ipc_server_inner(_state: Arc<DaemonState>, _socket_path: &str) -> Result<(), error::IpcError> {
    warn!("IPC server not available on this platform");
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}

/// Brightness control loop: 500 ms in auto mode, 1 s in manual mode.
async fn run_brightness_loop(
    mut controller: BrightnessController,
    mut sensor: Box<dyn LightSensor>,
    mut actuator: Box<dyn BrightnessActuator>,
    state: Arc<DaemonState>,
    config: Config,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        controller.sync_intent(&state.brightness);
        let period = config.poll_interval(controller.mode());

        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("Brightness loop shutting down");
                    break;
                }
            }
            _ = tokio::time::sleep(period) => {
                controller.sync_intent(&state.brightness);
                let light = sensor.read_light();
                let level = controller.update(light);
                actuator.set_brightness(level);
                state.publish_brightness(controller.status(), light).await;
            }
        }
    }
}

/// Display loop: apply intent changes and persist them once quiet.
async fn run_display_loop(
    mut machine: ClockStateMachine,
    display: Arc<DisplayIntent>,
    poll: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("Display loop shutting down");
                    break;
                }
            }
            _ = tokio::time::sleep(poll) => {
                machine.tick(&display);
            }
        }
    }

    machine.shutdown();
}
