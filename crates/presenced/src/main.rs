use anyhow::Result;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("presenced starting");

    let config = config::Config::from_env();
    tracing::info!(
        db = %config.db_path.display(),
        model_dir = %config.model_dir.display(),
        tolerance = config.match_tolerance,
        "configuration loaded"
    );

    let handle = engine::spawn_engine(&config)?;
    let service = dbus_interface::PresenceService::new(handle);

    let _connection = zbus::connection::Builder::session()?
        .name("org.freedesktop.Presence1")?
        .serve_at("/org/freedesktop/Presence1", service)?
        .build()
        .await?;

    tracing::info!("presenced ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("presenced shutting down");

    Ok(())
}
