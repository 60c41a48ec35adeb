use actix_web::{App, HttpServer};
use anyhow::Context;
use paperclip::actix::{web, OpenApiExt};
use tracing_actix_web::TracingLogger;

use doujinreview_service::app_config::config_app;
use doujinreview_service::settings::Settings;
use doujinreview_service::state::AppState;
use doujinreview_service::telemetry::init_telemetry;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    init_telemetry("doujinreview_service", settings.jaeger_enabled)?;

    let state = AppState::from_settings(&settings)
        .await
        .context("Failed to set up repositories")?;

    tracing::info!(
        "Starting HTTP server at http://{}:{}",
        settings.bind_address,
        settings.port
    );
    HttpServer::new(move || {
        App::new()
            .wrap_api()
            .app_data(web::Data::new(state.clone()))
            .wrap(TracingLogger::default())
            .configure(config_app)
            .with_json_spec_at("/apispec/v2")
            .build()
    })
    .bind((settings.bind_address.as_str(), settings.port))?
    .run()
    .await
    .context("HTTP server failed")
}
