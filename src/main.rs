use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use live_sync_service::{config::Config, error::AppError, logging, metrics, routes, state::AppState};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    logging::init_tracing();
    let cfg = Arc::new(Config::from_env()?);
    let state = AppState::new(cfg.clone());

    for key in &cfg.seed_event_keys {
        match state
            .sessions
            .create_session_with_key(key, live_sync_service::EventKey::new(key))
            .await
        {
            Ok(session) => {
                tracing::info!(event_key = %session.key, "seeded session");
            }
            Err(err) => {
                tracing::warn!(event_key = %key, error = %err, "skipping seed key");
            }
        }
    }

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(%bind_addr, "starting live-sync-service");

    let app_state = state.clone();
    HttpServer::new(move || {
        let cors = actix_cors::Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .app_data(web::Data::new(app_state.clone()))
            .configure(routes::register)
            .route("/health", web::get().to(|| async { "OK" }))
            .route("/metrics", web::get().to(metrics::serve_metrics))
    })
    .bind(&bind_addr)
    .map_err(|e| AppError::StartServer(format!("bind: {e}")))?
    .run()
    .await
    .map_err(|e| AppError::StartServer(format!("run: {e}")))
}
