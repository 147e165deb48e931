use std::path::PathBuf;

use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;
use zone_engine::{load_world, resolve_app_paths, LoadedWorld, StartupError, WorldLoadError};

use super::config::{ConfigError, ServerConfig};

pub(crate) struct AppWiring {
    pub(crate) config: ServerConfig,
    pub(crate) world_dir: PathBuf,
    pub(crate) service: LoadedWorld,
}

#[derive(Debug, Error)]
pub(crate) enum BootError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to load world: {0}")]
    World(#[from] WorldLoadError),
}

pub(crate) fn build_app() -> Result<AppWiring, BootError> {
    init_tracing();
    info!("=== Zone server startup ===");

    let paths = resolve_app_paths()?;
    let config = ServerConfig::load(&paths.root)?;
    info!(
        root = %paths.root.display(),
        tick_ms = config.tick_ms,
        ticks_per_zone_pulse = config.ticks_per_zone_pulse,
        zone_pulses_per_minute = config.zone_pulses_per_minute,
        "config_loaded"
    );

    let service = load_world(&paths.world_dir, config.zone_pulses_per_minute)?;
    Ok(AppWiring {
        config,
        world_dir: paths.world_dir,
        service,
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
