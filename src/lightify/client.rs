use serde::Deserialize;

use super::{
    device::{Device, DeviceUpdate},
    token::TokenManager,
};
use crate::{
    error::Result,
    protocols::https::{mk_get_request, mk_patch_request, HyperHttpsClient},
    settings::LightifySettings,
};

#[derive(Deserialize, Debug, Clone)]
struct DevicesResponse {
    devices: Vec<Device>,
}

/// Authenticated access to the Lightify device resources.
#[derive(Clone)]
pub struct DeviceClient {
    api_url: String,
    https_client: HyperHttpsClient,
    token_manager: TokenManager,
}

impl DeviceClient {
    pub fn new(
        settings: &LightifySettings,
        https_client: &HyperHttpsClient,
        token_manager: &TokenManager,
    ) -> DeviceClient {
        DeviceClient {
            api_url: settings.api_url.clone(),
            https_client: https_client.clone(),
            token_manager: token_manager.clone(),
        }
    }

    /// Lists every device of the account, gateways included.
    pub async fn list_devices(&self) -> Result<Vec<Device>> {
        let uri = format!("{}/v4/devices/", self.api_url).parse()?;
        let access_token = self.token_manager.current_access_token();

        let response: DevicesResponse =
            mk_get_request(&self.https_client, &uri, &access_token).await?;

        Ok(response.devices)
    }

    /// Sends a partial update and returns the device state reported back by
    /// the API, which may differ from what was requested.
    pub async fn patch_device(&self, id: &str, update: &DeviceUpdate) -> Result<Device> {
        let uri = format!("{}/v4/devices/{}", self.api_url, id).parse()?;
        let access_token = self.token_manager.current_access_token();

        let device: Device =
            mk_patch_request(&self.https_client, &uri, &access_token, update).await?;

        Ok(device)
    }
}
