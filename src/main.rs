use std::env;
use std::path::PathBuf;

use anyhow::Result;
use log::*;

use engine::{Engine, EngineConfig};

const DEFAULT_CONFIG: &str = "textured-quad.toml";

fn main() -> Result<()> {
    pretty_env_logger::init();

    let path = env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let config = EngineConfig::load_or_default(&path)?;
    debug!("{:?}", config);

    let engine = Engine::new(&config)?;
    engine.run()
}
