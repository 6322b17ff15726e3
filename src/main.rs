use std::sync::Arc;

use axum::Router;
use log::info;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use mspserver::assets::configure_assets_routes;
use mspserver::config::AppConfig;
use mspserver::renewals::configure_renewals_routes;
use mspserver::shared::state::AppState;
use mspserver::shared::utils::create_conn;
use mspserver::tickets::configure_tickets_routes;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::load()?;
    let conn = create_conn(&config.database)?;
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let state = Arc::new(AppState::production(conn, config));

    let app = Router::new()
        .merge(configure_assets_routes())
        .merge(configure_renewals_routes())
        .merge(configure_tickets_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    info!("Listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
