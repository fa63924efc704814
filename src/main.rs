use accessory::host::AccessoryHost;
use color_eyre::Result;
use lightify::{client::DeviceClient, sync::mk_accessories, token::TokenManager};
use log::info;
use protocols::https::mk_hyper_https_client;

use crate::settings::read_settings;

mod accessory;
mod color;
mod error;
mod lightify;
mod protocols;
mod settings;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    pretty_env_logger::init();

    let settings = read_settings()?;
    let token_refresh_interval = settings.lightify.token_refresh_interval()?;
    let https_client = mk_hyper_https_client(&settings.lightify)?;

    // Without a valid token pair there is nothing we can do
    let token_manager = TokenManager::init(&settings.lightify, &https_client).await?;
    let device_client = DeviceClient::new(&settings.lightify, &https_client, &token_manager);

    let devices = device_client.list_devices().await?;
    info!("Found {} Lightify devices", devices.len());

    token_manager.start_refresh_loop(token_refresh_interval);

    let accessory_host = AccessoryHost::new(&settings.accessory_host);
    for lightbulb in mk_accessories(
        devices,
        &device_client,
        &settings.accessory_host.manufacturer,
    ) {
        accessory_host.add_accessory(lightbulb).await;
    }

    let mqtt_client = accessory_host.start();

    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    mqtt_client.client.disconnect().await?;

    Ok(())
}
