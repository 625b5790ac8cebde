//! Service entry-point: loads settings, wires adapters, loads system data,
//! and serves the realtime channel, the action endpoint, and health probes.

mod server;

use actix_web::web;
use color_eyre::eyre::{Result, WrapErr};
use ortho_config::OrthoConfig;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use server::{HubComponents, ServerConfig, build_hub, create_server};
use sitehub::inbound::http::health::HealthState;
use sitehub::settings::HubSettings;

/// Application bootstrap.
#[actix_web::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let settings = HubSettings::load().wrap_err("failed to load settings")?;
    let config = ServerConfig::new(settings.bind_addr()?)
        .with_allowed_origins(settings.allowed_origins()?);
    let HubComponents {
        hub,
        system,
        loader,
    } = build_hub(&settings).await?;

    let health_state = web::Data::new(HealthState::new(system.clone()));
    actix_web::rt::spawn(async move {
        match system.reload(&loader).await {
            Ok(()) => info!("system data ready"),
            Err(err) => error!(error = %err, "failed to load system data"),
        }
    });

    let server = create_server(health_state, hub, config)?;
    info!("server listening");
    server.await.wrap_err("server terminated")
}
