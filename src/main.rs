// Entrypoint for the CLI application.
// - Keeps `main` small: resolve credentials, build the client and hand it
//   to the UI loop.
// - Returns `anyhow::Result` so setup failures print with context.

use anyhow::Context;
use maestro_cli::config::MaestroConfig;
use maestro_cli::{ui::main_menu, AppCredentialResolver, MaestroApiClient, MaestroApiOptions};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // `MAESTRO_*` variables override the production defaults.
    let config = MaestroConfig::from_env();

    let credentials = AppCredentialResolver::new(config.credentials.clone())
        .resolve()
        .context("Failed to resolve Maestro credentials")?;
    let options = MaestroApiOptions::new(&config.base_uri, Some(credentials))
        .context("Invalid MAESTRO_BASE_URI")?;
    let api = MaestroApiClient::new(options).context("Failed to build HTTP client")?;

    main_menu(&api).await?;
    Ok(())
}
