use dispatch_server::common::logger::init_logger;
use dispatch_server::core::{Config, Server};
use dispatch_server::print_banner;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    print_banner();

    let config = Config::from_env();
    let log_dir = format!("{}/logs", config.work_dir);
    init_logger("info", config.is_production(), Some(&log_dir))?;

    tracing::info!(
        environment = %config.environment,
        http_port = config.http_port,
        offer_timeout_secs = config.dispatch.offer_timeout.as_secs(),
        max_retries = config.dispatch.max_retries,
        "Starting dispatch server"
    );

    Server::new(config).run().await?;
    Ok(())
}
