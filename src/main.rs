use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use plantmd::{
    config::{AppConfig, DEFAULT_CONFIG_PATH},
    model::TensorFlowModel,
    server,
    service::Predictor,
};

#[derive(Parser, Debug)]
#[command(name = "plantmd", about = "Crop disease detection API")]
struct Args {
    /// Path to the YAML configuration
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    tracing::info!("loading config from {}", args.config.display());
    let config = Arc::new(AppConfig::load(&args.config)?);

    tracing::info!(
        "loading model from {} ({} classes, {}px input)",
        config.model.path.display(),
        config.class_count(),
        config.model.image_size
    );
    let model = TensorFlowModel::load(&config.model)?;
    let predictor = Predictor::new(config.clone(), Arc::new(model))?;

    let addr = config.server.bind_addr();
    let app = server::router(predictor);

    tracing::info!("Listening on http://{}", addr);
    let socket: SocketAddr = addr
        .parse()
        .with_context(|| format!("invalid bind address {addr}"))?;
    axum::Server::bind(&socket)
        .serve(app.into_make_service())
        .await
        .context("server error")?;

    Ok(())
}
