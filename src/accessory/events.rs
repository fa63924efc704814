use color_eyre::Result;
use futures::future::try_join_all;
use log::{debug, warn};
use rumqttc::QoS;
use serde::{Deserialize, Serialize};

use super::{host::AccessoryHost, lightbulb::Lightbulb};
use crate::protocols::mqtt::MqttClient;

/// Characteristic writes requested by a remote controller.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct AccessoryCommand {
    pub on: Option<bool>,
    pub hue: Option<f32>,
    pub saturation: Option<f32>,
    pub brightness: Option<i32>,
}

impl AccessoryCommand {
    /// Writes each requested characteristic, clamped to its valid range.
    pub fn apply(&self, lightbulb: &Lightbulb) {
        if let Some(on) = self.on {
            lightbulb.on.remote_update(on);
        }

        if let Some(brightness) = self.brightness {
            lightbulb.brightness.remote_update(brightness.clamp(0, 100));
        }

        if let Some(hue) = self.hue.filter(|hue| hue.is_finite()) {
            lightbulb.hue.remote_update(hue.rem_euclid(360.0));
        }

        if let Some(saturation) = self.saturation.filter(|saturation| saturation.is_finite()) {
            lightbulb
                .saturation
                .remote_update(saturation.clamp(0.0, 100.0));
        }
    }
}

/// Accessory state as mirrored to the accessory host.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AccessoryState {
    pub id: String,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub firmware_revision: String,
    pub on: bool,
    pub hue: f32,
    pub saturation: f32,
    pub brightness: i32,
}

impl From<&Lightbulb> for AccessoryState {
    fn from(lightbulb: &Lightbulb) -> Self {
        AccessoryState {
            id: lightbulb.info.serial_number.clone(),
            name: lightbulb.info.name.clone(),
            manufacturer: lightbulb.info.manufacturer.clone(),
            model: lightbulb.info.model.clone(),
            firmware_revision: lightbulb.info.firmware_revision.clone(),
            on: lightbulb.on.get_value(),
            hue: lightbulb.hue.get_value(),
            saturation: lightbulb.saturation.get_value(),
            brightness: lightbulb.brightness.get_value(),
        }
    }
}

/// Extracts the `{id}` part of `topic` according to `template`.
pub fn topic_device_id<'a>(template: &str, topic: &'a str) -> Option<&'a str> {
    let (prefix, suffix) = template.split_once("{id}")?;
    let id = topic.strip_prefix(prefix)?.strip_suffix(suffix)?;

    if id.is_empty() || id.contains('/') {
        None
    } else {
        Some(id)
    }
}

pub async fn publish_accessory_state(
    mqtt_client: &MqttClient,
    accessory_host: &AccessoryHost,
    state: &AccessoryState,
) -> Result<()> {
    let topic = accessory_host.state_topic(&state.id);
    let json = serde_json::to_string(state)?;

    mqtt_client
        .client
        .publish(topic, QoS::AtLeastOnce, true, json)
        .await?;

    Ok(())
}

pub async fn handle_incoming_mqtt_event(
    event: rumqttc::Event,
    mqtt_client: &MqttClient,
    accessory_host: &AccessoryHost,
) -> Result<()> {
    match event {
        rumqttc::Event::Incoming(rumqttc::Packet::ConnAck(_)) => {
            mqtt_client
                .client
                .subscribe(accessory_host.set_topic_filter(), QoS::AtMostOnce)
                .await?;

            // Publish the current state of every accessory so that
            // controllers start out in sync
            let states = accessory_host.states().await;
            try_join_all(
                states
                    .iter()
                    .map(|state| publish_accessory_state(mqtt_client, accessory_host, state)),
            )
            .await?;
        }
        rumqttc::Event::Incoming(rumqttc::Packet::Publish(msg)) => {
            let Some(id) = topic_device_id(accessory_host.set_topic(), &msg.topic) else {
                debug!("Ignoring message on unrelated topic {}", msg.topic);
                return Ok(());
            };

            let command: AccessoryCommand = serde_json::from_slice(&msg.payload)?;

            match accessory_host.handle_command(id, &command).await {
                Some(state) => publish_accessory_state(mqtt_client, accessory_host, &state).await?,
                None => warn!("Received command for unknown accessory {}", id),
            }
        }
        _ => {}
    }

    Ok(())
}
