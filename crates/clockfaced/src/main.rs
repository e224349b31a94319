use anyhow::Result;
use clockface_client::{FaceEngineClient, HttpTransport, VerificationClient};
use clockface_hw::{MediaStreamManager, StreamConstraints, V4lBackend};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod detection_loop;
mod kiosk;
#[cfg(test)]
mod testing;
mod view;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = config::Config::from_env();
    tracing::info!(
        camera = %config.camera_device,
        server = %config.server_url,
        auto_loop = config.auto_loop,
        "clockfaced starting"
    );

    let connection = zbus::Connection::system().await?;
    let engine = Arc::new(FaceEngineClient::connect(&connection).await?);

    let stream = MediaStreamManager::new(
        Arc::new(V4lBackend::new(config.camera_device.clone())),
        config.warmup_frames,
    );
    let verifier = VerificationClient::new(
        Arc::new(HttpTransport::new(config.http())),
        config.retry_policy(),
    );
    let kiosk_size = StreamConstraints::kiosk();
    let view = view::ConsoleView::new(
        (kiosk_size.width, kiosk_size.height),
        config.overlay_path.clone(),
    );

    let (handle, task) = kiosk::spawn_kiosk(
        config.kiosk_settings(),
        stream,
        engine,
        verifier,
        config.loop_config(),
        Box::new(view),
    );

    connection
        .object_server()
        .at(
            dbus_interface::OBJECT_PATH,
            dbus_interface::KioskService {
                kiosk: handle.clone(),
            },
        )
        .await?;
    connection.request_name(dbus_interface::BUS_NAME).await?;
    tracing::info!(bus_name = dbus_interface::BUS_NAME, "clockfaced ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("clockfaced shutting down");
    if let Err(e) = handle.shutdown().await {
        tracing::warn!(error = %e, "kiosk already stopped");
    }
    task.await?;

    Ok(())
}
