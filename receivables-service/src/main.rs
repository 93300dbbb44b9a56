use receivables_service::{config::Config, Application};
use service_core::observability::init_tracing;

fn json_logs_enabled() -> bool {
    std::env::var("RECEIVABLES_JSON_LOGS")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("info,receivables_service=debug", json_logs_enabled());

    receivables_service::services::init_metrics();

    let config = Config::from_env()?;
    let application = Application::build(config).await?;
    application.run_until_stopped().await?;

    Ok(())
}
