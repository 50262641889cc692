mod handlers;
mod pages;
mod routes;


use axum::Router;
use serde::Deserialize;
use std::{path::PathBuf, sync::Arc};
use tower_cookies::CookieManagerLayer;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::{auth::AuthService, repo::PostRepository};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn PostRepository>,
    pub auth: AuthService,
    pub uploads_dir: PathBuf,
}

impl AppState {
    pub fn new(
        repo: Arc<dyn PostRepository>,
        auth: AuthService,
        uploads_dir: impl Into<PathBuf>,
    ) -> Arc<Self> {
        Arc::new(Self {
            repo,
            auth,
            uploads_dir: uploads_dir.into(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostPayload {
    pub title: Option<String>,
    pub content: Option<String>,
    pub image_url: Option<String>,
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .nest_service("/uploads", ServeDir::new(&state.uploads_dir))
        .layer(CookieManagerLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(addr: String, state: Arc<AppState>) -> crate::Result<()> {
    let app = app(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Web server listening on {}", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| crate::Error::Internal(e.to_string()))?;

    Ok(())
}
