use std::path::PathBuf;

use stage_engine::{ConfigError, EngineConfig};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use super::scenario::{collision_demo, Scenario, ScenarioError};

pub(crate) const SCENARIO_ENV_VAR: &str = "BLOCKSTAGE_SCENARIO";

pub(crate) struct ShowWiring {
    pub(crate) config: EngineConfig,
    pub(crate) scenario: Scenario,
    pub(crate) source: String,
}

#[derive(Debug, Error)]
pub(crate) enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
}

pub(crate) fn build_show() -> Result<ShowWiring, StartupError> {
    init_tracing();
    info!("=== Block Stage Startup ===");

    let mut config = EngineConfig::from_env()?;
    let (scenario, source) = match scenario_path_from_env() {
        Some(path) => {
            let scenario = Scenario::load(&path)?;
            (scenario, path.display().to_string())
        }
        None => (collision_demo(), "built-in collision demo".to_string()),
    };
    config.bounds = scenario.bounds(config.bounds);
    info!(
        scenario = %source,
        sprites = scenario.sprites.len(),
        width = config.bounds.width,
        height = config.bounds.height,
        "scenario_loaded"
    );

    Ok(ShowWiring {
        config,
        scenario,
        source,
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn scenario_path_from_env() -> Option<PathBuf> {
    std::env::var_os(SCENARIO_ENV_VAR)
        .filter(|raw| !raw.is_empty())
        .map(PathBuf::from)
}
