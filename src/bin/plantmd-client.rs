use std::{io::IsTerminal, path::PathBuf, process::ExitCode, time::Duration};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use plantmd::client::{self, PredictClient, DEFAULT_TIMEOUT, DEFAULT_URL};

#[derive(Parser, Debug)]
#[command(name = "plantmd-client", about = "Upload a leaf image and show the diagnosis")]
struct Args {
    /// Leaf image (JPG, JPEG or PNG)
    image: PathBuf,

    /// Prediction endpoint
    #[arg(long, default_value = DEFAULT_URL)]
    url: String,

    /// Request timeout in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT.as_secs())]
    timeout: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let upload = match client::prepare_upload(&args.image) {
        Ok(upload) => upload,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let api = match PredictClient::new(args.url, Duration::from_secs(args.timeout)) {
        Ok(api) => api,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!("sending {} ({} bytes) to {}", upload.filename, upload.bytes.len(), api.url());
    match api.predict(upload).await {
        Ok(result) => {
            print!("{}", client::render(&result, std::io::stdout().is_terminal()));
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("API Error: {err}");
            ExitCode::FAILURE
        }
    }
}
