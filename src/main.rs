use beneficiary_import_hub::config::AppConfig;
use beneficiary_import_hub::database_sea::connect_database;
use beneficiary_import_hub::web_server;
use std::error::Error;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = AppConfig::from_env()?;
    info!(
        "Upload directory: {}, inline limit: {} rows, batch size: {}",
        config.upload_dir.display(),
        config.queue_threshold,
        config.batch_size
    );
    std::fs::create_dir_all(&config.upload_dir)?;

    let db = connect_database(&config.database_url).await?;

    info!("Starting web server on port {}", config.port);
    match web_server::start_server(db, config).await {
        Ok(_) => Ok(()),
        Err(e) => {
            error!("Web server failed: {:?}", e);
            error!("Details: {}", e);
            let mut source = e.source();
            while let Some(err) = source {
                error!("  caused by: {}", err);
                source = err.source();
            }
            Err(e)
        }
    }
}
