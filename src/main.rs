mod config;
mod connection;
mod db;
mod dispatch;
mod frame;
mod hub;
mod outbox;
mod routes;
mod services;
mod state;

use std::sync::Arc;

use crate::config::{Config, ConfigError};
use crate::services::board::PgBoardService;
use crate::services::post::PgPostService;
use crate::services::token::JwtTokenService;
use crate::services::user::PgUserService;

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("database: {0}")]
    Database(#[from] sqlx::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    let pool = db::init_pool(&config.database_url, config.db_max_connections).await?;

    let state = state::AppState::new(
        Arc::new(JwtTokenService::new(config.jwt_secret.as_bytes(), config.jwt_expiration_hours)),
        Arc::new(PgUserService::new(pool.clone())),
        Arc::new(PgBoardService::new(pool.clone())),
        Arc::new(PgPostService::new(pool)),
        config.ws,
    );

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;

    tracing::info!(port = config.port, "boards-realtime listening");
    axum::serve(listener, app).await?;
    Ok(())
}
