use admission_server::{cli, config::Config, tracing::setup_tracing, AdmissionServer};
use anyhow::{anyhow, Result};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli::build_cli().get_matches();
    let config = Config::from_args(&matches)?;

    setup_tracing(&config.log_level, &config.log_fmt, config.log_no_color)?;

    // Starting from rustls 0.22, each application must set its default crypto provider.
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Cannot install the default crypto provider"))?;

    info!(
        kinds = ?config.policy.kinds.keys().collect::<Vec<_>>(),
        "admission rules loaded"
    );

    let server = AdmissionServer::new_from_config(config).await?;
    if let Err(e) = server.run().await {
        error!(error = %e, "admission server stopped");
        return Err(e);
    }

    Ok(())
}
