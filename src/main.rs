use flatpost::{
    auth::AuthService,
    config::LogFormat,
    repo::JsonPostRepository,
    web::AppState,
    Config,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "flatpost=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }

    tracing::info!("Starting flatpost");
    tracing::info!("Posts stored in: {}", config.data_file.display());
    tracing::info!("Web server will listen on: {}", config.web_addr());

    let repo = Arc::new(JsonPostRepository::new(config.data_file.clone()));
    let app_state = AppState::new(
        repo,
        AuthService::new(&config.auth_secret),
        config.uploads_dir.clone(),
    );

    flatpost::web::serve(config.web_addr(), app_state).await?;

    Ok(())
}
