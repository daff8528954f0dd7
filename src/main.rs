use std::path::Path;
use std::sync::Arc;

use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use js8d::control::server;
use js8d::{Config, ConfigSource, EngineBuilder, JsonFileSource};

const DEFAULT_CONFIG: &str = "js8d.json";

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    if let Err(e) = run(Path::new(&path)).await {
        error!("{e}");
        eprintln!("js8d: {e}");
        std::process::exit(1);
    }
}

async fn run(path: &Path) -> js8d::Result<()> {
    let source: Arc<dyn ConfigSource> = Arc::new(JsonFileSource::new(path));
    let builder = if path.exists() {
        EngineBuilder::from_source(source)?
    } else {
        warn!("{} not found, running with defaults", path.display());
        EngineBuilder::new(Config::default()).source(source)
    };
    let engine = Arc::new(builder.build()?);
    engine.start()?;

    let socket = engine.config().control.socket_path.clone();
    let listener = server::bind(&socket)?;
    info!("control socket at {}", socket.display());

    let cancel = CancellationToken::new();
    let control = tokio::spawn(server::serve(listener, Arc::clone(&engine), cancel.clone()));

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    cancel.cancel();
    if let Err(e) = control.await {
        warn!("control server task failed: {e}");
    }
    engine.stop().await?;
    if let Err(e) = std::fs::remove_file(&socket) {
        warn!("could not remove {}: {e}", socket.display());
    }
    Ok(())
}
