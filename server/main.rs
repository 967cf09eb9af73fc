/// digit-ocr HTTP server
///
/// Accepts JSON POST bodies from the drawing page and dispatches them to a
/// single shared engine:
///   { "train": true, "trainArray": [{ "y0": [400 floats], "label": 3 }, ...] }
///   { "predict": true, "image": [400 floats] }
///
/// Run with:
///   cargo run --bin ocr-server --release -- --port 8000

mod handlers;
mod reply;
mod request;
mod routes;
mod state;

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tiny_http::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

use digit_ocr::{EngineConfig, InitSource, Network, DEFAULT_HIDDEN_UNITS, DEFAULT_MODEL_PATH};

#[derive(Debug, Parser)]
#[command(name = "ocr-server", about = "Serve digit training and prediction over HTTP")]
struct Args {
    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    #[arg(long, default_value_t = 8000)]
    port: u16,

    /// Where learned parameters are loaded from and saved to.
    #[arg(long, default_value = DEFAULT_MODEL_PATH)]
    model_path: PathBuf,

    #[arg(long, default_value_t = DEFAULT_HIDDEN_UNITS)]
    hidden_units: usize,

    /// Keep the model in memory only.
    #[arg(long)]
    no_persist: bool,
}

impl Args {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            hidden_units: self.hidden_units,
            persist: !self.no_persist,
            model_path: self.model_path.clone(),
        }
    }
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let config = args.engine_config();

    let path = config.model_path.display();
    let network = Network::new(&config)
        .with_context(|| format!("failed to initialize engine from {path}"))?;
    match network.init_source() {
        InitSource::Loaded => info!(%path, "resuming from saved model"),
        InitSource::Random => {
            info!(hidden_units = config.hidden_units, "starting from random weights")
        }
    }

    let addr = format!("{}:{}", args.host, args.port);
    let server = Server::http(&addr).map_err(|e| anyhow!("failed to bind {addr}: {e}"))?;
    info!(%addr, persist = config.persist, "server running");

    let engine = state::shared(network);

    // One thread per request; the engine lock serializes training.
    for request in server.incoming_requests() {
        let engine = engine.clone();
        std::thread::spawn(move || {
            routes::dispatch(request, engine);
        });
    }

    Ok(())
}
