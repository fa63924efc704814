use std::time::Duration;

use log::error;
use rumqttc::{AsyncClient, EventLoop, MqttOptions};

use crate::{
    accessory::{events::handle_incoming_mqtt_event, host::AccessoryHost},
    settings::AccessoryHostSettings,
};

#[derive(Clone)]
pub struct MqttClient {
    pub client: AsyncClient,
}

pub fn mk_mqtt_client(settings: &AccessoryHostSettings) -> (MqttClient, EventLoop) {
    let mut options = MqttOptions::new(settings.id.clone(), settings.host.clone(), settings.port);
    options.set_keep_alive(Duration::from_secs(5));

    if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
        options.set_credentials(username.clone(), password.clone());
    }

    let (client, eventloop) = AsyncClient::new(options, 10);

    (MqttClient { client }, eventloop)
}

pub fn start_mqtt_events_loop(
    mut eventloop: EventLoop,
    mqtt_client: &MqttClient,
    accessory_host: &AccessoryHost,
) {
    let mqtt_client = mqtt_client.clone();
    let accessory_host = accessory_host.clone();

    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(event) => {
                    // Handlers publish through the client, which only makes
                    // progress while this loop keeps polling
                    let mqtt_client = mqtt_client.clone();
                    let accessory_host = accessory_host.clone();

                    tokio::spawn(async move {
                        let result =
                            handle_incoming_mqtt_event(event, &mqtt_client, &accessory_host)
                                .await;

                        if let Err(e) = result {
                            error!("Error while processing MQTT event: {:?}", e);
                        }
                    });
                }
                Err(e) => {
                    // The event loop reconnects on the next poll
                    error!("MQTT connection error: {}. Reconnecting in 5 seconds...", e);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    });
}
