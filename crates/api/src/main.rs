use anyhow::Context;

use clinicore_api::config::ApiConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    clinicore_observability::init();

    let config = ApiConfig::from_env()?;
    let app = clinicore_api::app::build_app(&config).context("failed to start background workers")?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        role_policy = config.role_policy.name(),
        "listening"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
