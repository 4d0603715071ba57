use std::sync::Arc;

use axum::{http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;
use tracing::info;

use fleet_settle::config::AppConfig;
use fleet_settle::error::AppError;
use fleet_settle::settlement::{
    settlement_router, FeeConfig, MemoryFleetDirectory, MemorySettlementStore, RuleSet,
    SettlementService, StaticRuleProvider,
};
use fleet_settle::telemetry;

#[tokio::main]
async fn main() {
    if let Err(error) = run_server().await {
        eprintln!("fleet-settle failed to start: {error}");
        std::process::exit(1);
    }
}

async fn run_server() -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let rules = RuleSet {
        fees: FeeConfig {
            vat_rate: config.vat_rate,
            ..FeeConfig::default()
        },
        ..RuleSet::default()
    };

    let store = Arc::new(MemorySettlementStore::default());
    let directory = Arc::new(MemoryFleetDirectory::default());
    let provider = Arc::new(StaticRuleProvider::new(rules));
    let service = Arc::new(SettlementService::new(store, directory, provider));

    let app = Router::new()
        .route("/health", get(healthcheck))
        .merge(settlement_router(service));

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(?config.environment, %addr, "settlement engine ready");

    axum::serve(listener, app).await?;
    Ok(())
}

async fn healthcheck() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}
