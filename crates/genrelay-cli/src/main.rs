//! `genrelay` entry point - the composition root.

use clap::Parser;
use tracing::info;

use genrelay_cli::{Cli, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before clap reads the environment
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.json_logs, cli.verbose);

    let config = cli.into_config();
    info!(
        port = config.listen_port,
        backend = %config.backend_url,
        model = %config.model,
        "Loaded configuration"
    );

    genrelay_proxy::start_server(config).await
}
