use std::{future::Future, sync::Arc};

use log::{debug, error, warn};
use tokio::sync::RwLock;

use super::{
    client::DeviceClient,
    device::{Device, DeviceUpdateBuilder, PowerState},
};
use crate::{
    accessory::lightbulb::{ColorSource, Lightbulb},
    color::{hsv_to_rgbw, RgbwColor},
    error::Result,
};

/// Keeps the cached state of one Lightify device and turns accessory writes
/// into partial updates.
///
/// Updates are not serialized: every trigger results in its own request and
/// the cached field ends up with whichever response arrived last.
#[derive(Clone)]
pub struct DeviceSync {
    id: String,
    device: Arc<RwLock<Device>>,
    client: DeviceClient,
    color_source: ColorSource,
}

impl DeviceSync {
    pub fn new(device: Device, client: DeviceClient, color_source: ColorSource) -> Self {
        DeviceSync {
            id: device.id.clone(),
            device: Arc::new(RwLock::new(device)),
            client,
            color_source,
        }
    }

    pub async fn snapshot(&self) -> Device {
        self.device.read().await.clone()
    }

    pub async fn set_power(&self, on: bool) -> Result<()> {
        let update = DeviceUpdateBuilder::default()
            .on_off(PowerState::from(on))
            .build()?;

        let device = self.client.patch_device(&self.id, &update).await?;
        self.device.write().await.on_off = device.on_off;

        Ok(())
    }

    /// Recomputes RGBW from the live accessory hue, saturation and brightness.
    pub async fn update_color(&self) -> Result<()> {
        let (hue, saturation, brightness) = self.color_source.current();

        self.set_rgbw(hsv_to_rgbw(hue, saturation, brightness)).await
    }

    pub async fn set_rgbw(&self, rgbw: RgbwColor) -> Result<()> {
        let update = DeviceUpdateBuilder::default().color_rgbw(rgbw).build()?;

        let device = self.client.patch_device(&self.id, &update).await?;
        self.device.write().await.color_rgbw = device.color_rgbw;

        Ok(())
    }

    pub async fn set_brightness(&self, brightness: i32) -> Result<()> {
        let update = DeviceUpdateBuilder::default()
            .brightness(brightness)
            .build()?;

        let device = self.client.patch_device(&self.id, &update).await?;
        self.device.write().await.brightness = device.brightness;

        Ok(())
    }

    fn spawn_update<F>(&self, kind: &'static str, update: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let sync = self.clone();

        tokio::spawn(async move {
            match update.await {
                Ok(()) => {
                    let device = sync.snapshot().await;
                    debug!("Updated {} of Lightify device {}: {:?}", kind, sync.id, device);
                }
                Err(e) if e.is_retryable() => warn!(
                    "Transient failure updating {} of Lightify device {}, state stays stale until the next write: {}",
                    kind, sync.id, e
                ),
                Err(e) => error!("Failed to update {} of Lightify device {}: {}", kind, sync.id, e),
            }
        });
    }

    /// Hooks accessory writes up to remote updates. Each write is handled in
    /// its own task.
    pub fn bind(&self, lightbulb: &Lightbulb) {
        {
            let sync = self.clone();
            lightbulb.on.on_value_remote_update(move |on| {
                let task = sync.clone();
                sync.spawn_update("power", async move { task.set_power(on).await });
            });
        }

        {
            let sync = self.clone();
            lightbulb.hue.on_value_remote_update(move |_| {
                let task = sync.clone();
                sync.spawn_update("color", async move { task.update_color().await });
            });
        }

        {
            let sync = self.clone();
            lightbulb.saturation.on_value_remote_update(move |_| {
                let task = sync.clone();
                sync.spawn_update("color", async move { task.update_color().await });
            });
        }

        {
            let sync = self.clone();
            lightbulb.brightness.on_value_remote_update(move |brightness| {
                let task = sync.clone();
                sync.spawn_update("brightness", async move {
                    task.set_brightness(brightness).await
                });
            });
        }
    }
}

/// Creates a lightbulb accessory with a bound `DeviceSync` for every
/// controllable device. Gateways are skipped.
pub fn mk_accessories(
    devices: Vec<Device>,
    client: &DeviceClient,
    manufacturer: &str,
) -> Vec<Lightbulb> {
    devices
        .into_iter()
        .filter(Device::is_controllable)
        .map(|device| {
            let lightbulb = Lightbulb::from_device(&device, manufacturer);
            let sync = DeviceSync::new(device, client.clone(), lightbulb.color_source());
            sync.bind(&lightbulb);

            lightbulb
        })
        .collect()
}
