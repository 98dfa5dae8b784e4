use fare_payment_service::{config::Config, services::init_metrics, Application};
use service_core::observability::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;

    init_tracing(
        &config.service_name,
        &config.server.log_level,
        config.server.otlp_endpoint.as_deref(),
    )?;
    init_metrics();

    let application = Application::build(config).await?;
    tracing::info!(port = application.port(), "fare-payment-service started");
    application.run_until_stopped().await?;

    Ok(())
}
