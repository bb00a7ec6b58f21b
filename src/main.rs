use axum::Router;
use dotenvy::dotenv;
use log::info;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use helpdesk_server::admin::configure_admin_routes;
use helpdesk_server::auth::configure_auth_routes;
use helpdesk_server::config::AppConfig;
use helpdesk_server::directory::configure_directory_routes;
use helpdesk_server::lookup::configure_lookup_routes;
use helpdesk_server::reports::configure_reports_routes;
use helpdesk_server::shared::seed::seed;
use helpdesk_server::shared::state::AppState;
use helpdesk_server::shared::utils::{create_conn, run_migrations};
use helpdesk_server::tickets::configure_tickets_routes;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = AppConfig::from_env()?;
    let pool = create_conn(&config.database_url)?;

    {
        let mut conn = pool.get()?;
        run_migrations(&mut conn)?;
        seed(&mut conn, &config)?;
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState { conn: pool, config });

    let app = Router::new()
        .merge(configure_auth_routes())
        .merge(configure_tickets_routes())
        .merge(configure_directory_routes())
        .merge(configure_lookup_routes())
        .merge(configure_admin_routes())
        .merge(configure_reports_routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("helpdesk-server listening on {addr}");
    axum::serve(listener, app).await?;

    Ok(())
}
