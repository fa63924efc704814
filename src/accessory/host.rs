use std::{collections::HashMap, sync::Arc};

use log::info;
use tokio::sync::RwLock;

use super::{
    events::{AccessoryCommand, AccessoryState},
    lightbulb::Lightbulb,
};
use crate::{
    protocols::mqtt::{mk_mqtt_client, start_mqtt_events_loop, MqttClient},
    settings::AccessoryHostSettings,
};

/// Registry of the accessories exposed to remote controllers.
#[derive(Clone)]
pub struct AccessoryHost {
    settings: AccessoryHostSettings,
    accessories: Arc<RwLock<HashMap<String, Lightbulb>>>,
}

impl AccessoryHost {
    pub fn new(settings: &AccessoryHostSettings) -> Self {
        AccessoryHost {
            settings: settings.clone(),
            accessories: Default::default(),
        }
    }

    pub async fn add_accessory(&self, lightbulb: Lightbulb) {
        info!(
            "Exposing accessory {} ({})",
            lightbulb.info.name,
            lightbulb.id()
        );

        let mut accessories = self.accessories.write().await;
        accessories.insert(lightbulb.id().to_string(), lightbulb);
    }

    pub async fn states(&self) -> Vec<AccessoryState> {
        let accessories = self.accessories.read().await;
        accessories.values().map(AccessoryState::from).collect()
    }

    /// Applies a command to the accessory with the given id and returns its
    /// resulting state, or `None` for unknown accessories.
    pub async fn handle_command(
        &self,
        id: &str,
        command: &AccessoryCommand,
    ) -> Option<AccessoryState> {
        let lightbulb = {
            let accessories = self.accessories.read().await;
            accessories.get(id)?.clone()
        };

        command.apply(&lightbulb);

        Some(AccessoryState::from(&lightbulb))
    }

    pub fn state_topic(&self, id: &str) -> String {
        self.settings.state_topic.replace("{id}", id)
    }

    pub fn set_topic(&self) -> &str {
        &self.settings.set_topic
    }

    pub fn set_topic_filter(&self) -> String {
        self.settings.set_topic.replace("{id}", "+")
    }

    /// Connects the host transport and starts serving accessory writes.
    pub fn start(&self) -> MqttClient {
        let (mqtt_client, eventloop) = mk_mqtt_client(&self.settings);
        start_mqtt_events_loop(eventloop, &mqtt_client, self);

        mqtt_client
    }
}
