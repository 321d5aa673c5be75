use std::time::Duration;

mod app;
mod auth;
mod cart;
mod categories;
mod collections;
mod config;
mod coupons;
mod deals;
mod error;
mod jobs;
mod locations;
mod mailer;
mod orders;
mod state;
mod storage;
mod token;

use crate::state::AppState;

const FINALIZE_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "dealcart=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let app_state = AppState::init().await?;

    if let Err(e) = sqlx::migrate!("./migrations").run(&app_state.db).await {
        tracing::warn!(error = %e, "migration failed; continuing");
    }

    // Hourly sweep closing out deals that expired since the last pass.
    let sweeper_state = app_state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(FINALIZE_SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(e) = deals::services::finalize_expired(&sweeper_state).await {
                tracing::warn!(error = %e, "expired-deal finalization failed");
            }
        }
    });

    let app = app::build_app(app_state);
    app::serve(app).await
}
